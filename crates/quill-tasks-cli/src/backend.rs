//! A deterministic, network-free generation backend.
//!
//! Good enough to exercise the worker pool end to end and to pre-screen
//! content when no model API is configured. Output quality is heuristic.

use quill_tasks::{BackendResult, GenerationBackend};
use std::collections::HashMap;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "have", "this", "that", "with", "from", "they", "will", "would",
    "there", "their", "what", "about", "which", "when", "your", "into", "than", "then", "them",
    "these", "those", "been", "were", "also", "just", "more", "some", "such", "only", "very",
    "over", "most", "each", "other", "its", "it's", "how", "why", "who", "where", "while",
];

/// Links above this count mark a text as spam regardless of keywords.
const MAX_LINKS: usize = 3;

#[derive(Debug, Clone)]
pub struct OfflineBackend {
    spam_keywords: Vec<String>,
}

impl OfflineBackend {
    /// `spam_keywords` are matched case-insensitively as substrings.
    pub fn new(spam_keywords: Vec<String>) -> Self {
        Self {
            spam_keywords: spam_keywords
                .into_iter()
                .map(|k| k.to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-'))
        .map(|w| w.trim_matches(|c: char| c == '\'' || c == '-'))
        .filter(|w| !w.is_empty())
}

impl GenerationBackend for OfflineBackend {
    /// Keeps whole words up to `max_length` characters, marking truncation
    /// with an ellipsis that counts toward the limit.
    fn summarize(&self, text: &str, max_length: usize) -> BackendResult<String> {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.chars().count() <= max_length {
            return Ok(collapsed);
        }

        let budget = max_length.saturating_sub(1);
        let mut summary = String::new();
        let mut used = 0;
        for word in collapsed.split(' ') {
            let len = word.chars().count();
            let sep = usize::from(!summary.is_empty());
            if used + sep + len > budget {
                break;
            }
            if sep == 1 {
                summary.push(' ');
            }
            summary.push_str(word);
            used += sep + len;
        }

        // A single over-long first word is cut mid-word.
        if summary.is_empty() {
            summary = collapsed.chars().take(budget).collect();
        }
        summary.push('…');
        Ok(summary)
    }

    /// Most frequent non-stopword words, ties broken by first appearance.
    fn generate_tags(&self, text: &str, count: usize) -> BackendResult<Vec<String>> {
        let mut freq: HashMap<String, (usize, usize)> = HashMap::new();
        for (pos, word) in words(text).enumerate() {
            let word = word.to_lowercase();
            if word.chars().count() < 3
                || STOPWORDS.contains(&word.as_str())
                || word.chars().all(|c| c.is_ascii_digit())
            {
                continue;
            }
            freq.entry(word).or_insert((0, pos)).0 += 1;
        }

        let mut ranked: Vec<_> = freq.into_iter().collect();
        ranked.sort_by(|(_, (a_count, a_pos)), (_, (b_count, b_pos))| {
            b_count.cmp(a_count).then(a_pos.cmp(b_pos))
        });

        Ok(ranked.into_iter().take(count).map(|(word, _)| word).collect())
    }

    fn detect_spam(&self, text: &str) -> BackendResult<bool> {
        let lower = text.to_lowercase();
        if self.spam_keywords.iter().any(|k| lower.contains(k.as_str())) {
            return Ok(true);
        }

        let links = lower.matches("http://").count() + lower.matches("https://").count();
        Ok(links > MAX_LINKS)
    }

    fn generate_content(&self, topic: &str) -> BackendResult<String> {
        let topic = topic.trim();
        Ok(format!(
            "# {topic}\n\n\
             ## Introduction\n\n\
             What {topic} is and why it is worth your time.\n\n\
             ## Core concepts\n\n\
             The ideas you need before working with {topic}.\n\n\
             ## Example\n\n\
             A small, complete walkthrough of {topic} in practice.\n\n\
             ## Pitfalls\n\n\
             Common mistakes and how to avoid them.\n\n\
             ## Conclusion\n\n\
             Where to go next with {topic}.\n"
        ))
    }
}
