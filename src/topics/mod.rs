//! Topic extraction fallback and the topic co-occurrence graph.

use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Stop words excluded from keyword extraction, including meeting-domain
/// filler that would otherwise dominate every transcript.
const STOP_WORDS: &str = "a an the and or but if then else for of to in on at by with from is are \
    was were be been being i you he she it we they this that those these there here when where \
    how what which who whom why do does did done doing have has had having not no yes ok okay so \
    just very really into out up down about across after before during between among over under \
    again more most some any few many much can could should would shall will may might must \
    meeting client call project review brainstorm quarterly";

fn word_regex() -> &'static Regex {
    static WORD_RE: OnceLock<Regex> = OnceLock::new();
    WORD_RE.get_or_init(|| Regex::new(r"[A-Za-z][A-Za-z0-9_\-]+").expect("static word regex"))
}

/// Most frequent non-stop-words in the text, best first.
pub fn simple_keywords(text: &str, top_k: usize) -> Vec<String> {
    let word_re = word_regex();
    let stop: std::collections::HashSet<&str> = STOP_WORDS.split_whitespace().collect();

    let lowered = text.to_lowercase();
    let mut freq: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();

    for m in word_re.find_iter(&lowered) {
        let word = m.as_str();
        if word.len() <= 2 || stop.contains(word) {
            continue;
        }
        let count = freq.entry(word).or_insert(0);
        if *count == 0 {
            order.push(word);
        }
        *count += 1;
    }

    // Stable ranking: by frequency, then first appearance
    let mut ranked: Vec<&str> = order;
    ranked.sort_by(|a, b| freq[b].cmp(&freq[a]));
    ranked.into_iter().take(top_k).map(String::from).collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicEdge {
    pub source: String,
    pub target: String,
    pub weight: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicGraph {
    pub nodes: Vec<TopicNode>,
    pub links: Vec<TopicEdge>,
}

/// Co-occurrence graph: an edge between two topics for every pair that
/// appears together in at least one segment text, weighted by how many.
pub fn build_topic_graph(topics: &[String], segment_texts: &[String]) -> TopicGraph {
    let nodes = topics
        .iter()
        .map(|t| TopicNode {
            id: t.clone(),
            kind: "topic",
        })
        .collect();

    let lowered: Vec<String> = segment_texts.iter().map(|s| s.to_lowercase()).collect();

    let mut links = Vec::new();
    for (i, a) in topics.iter().enumerate() {
        for b in topics.iter().skip(i + 1) {
            let (a_lower, b_lower) = (a.to_lowercase(), b.to_lowercase());
            let weight = lowered
                .iter()
                .filter(|s| s.contains(&a_lower) && s.contains(&b_lower))
                .count();
            if weight > 0 {
                links.push(TopicEdge {
                    source: a.clone(),
                    target: b.clone(),
                    weight,
                });
            }
        }
    }

    TopicGraph { nodes, links }
}
