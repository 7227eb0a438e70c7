use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

/// A stable question identifier derived from (topic_id, question_id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionKey {
    /// The numeric ID used as the key in the vector cache.
    pub numeric: u64,
    /// The short hex string for human display (e.g. "a1b2c3").
    pub short: String,
}

impl QuestionKey {
    /// Generate a stable key from topic id and question id.
    pub fn new(topic_id: &str, question_id: &str) -> Self {
        let numeric = Self::hash_pair(topic_id, question_id);
        let short = Self::short_hex(numeric, 6);
        Self { numeric, short }
    }

    fn hash_pair(topic_id: &str, question_id: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        topic_id.hash(&mut hasher);
        question_id.hash(&mut hasher);
        hasher.finish()
    }

    fn short_hex(value: u64, len: usize) -> String {
        let full = format!("{value:016x}");
        full[..len].to_string()
    }
}

impl std::fmt::Display for QuestionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.short)
    }
}
