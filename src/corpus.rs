use std::{collections::HashMap, io::Read, path::Path};

use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};

/// A stored, pre-authored question string used as a matching target.
#[derive(Debug, Clone, Deserialize)]
pub struct CanonicalQuestion {
    pub topic_id: String,
    pub question_id: String,
    #[serde(rename = "question_text", alias = "question")]
    pub text: String,
}

/// A stored excerpt of source text, the unit returned as answer material.
///
/// Passages are ordered within a topic; the order comes from the source
/// table and is significant (the first passage is the canonical answer for
/// Known topics).
#[derive(Debug, Clone, Deserialize)]
pub struct Passage {
    pub topic_id: String,
    pub passage_id: String,
    #[serde(rename = "passage_text", alias = "passage")]
    pub text: String,
    #[serde(rename = "relevance_tier", alias = "relevance_judgment")]
    pub relevance_tier: i64,
}

/// The full set of canonical questions, loaded once at startup.
#[derive(Debug, Clone)]
pub struct QuestionSet {
    questions: Vec<CanonicalQuestion>,
}

impl QuestionSet {
    /// Load the questions table from a CSV file.
    ///
    /// Expected columns: `topic_id, question_id, question_text` (the column
    /// name `question` is accepted as an alias).
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            Error::Config(format!(
                "cannot open questions table {}: {e}",
                path.display()
            ))
        })?;
        Self::from_reader(file)
    }

    /// Load the questions table from any CSV reader.
    ///
    /// An empty table is a fatal configuration error, not a per-query
    /// condition.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut questions = Vec::new();
        for row in csv_reader.deserialize() {
            let question: CanonicalQuestion = row?;
            questions.push(question);
        }

        if questions.is_empty() {
            return Err(Error::Config(
                "questions table is empty; the corpus must contain at least \
                 one canonical question"
                    .into(),
            ));
        }

        Ok(Self { questions })
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CanonicalQuestion> {
        self.questions.iter()
    }

    pub fn as_slice(&self) -> &[CanonicalQuestion] {
        &self.questions
    }
}

/// Read-only table mapping topic id to its ordered ground-truth passages.
///
/// A topic exists in the knowledge base only if at least one passage
/// references it. Topics with no passages are implicitly absent and resolve
/// to Out-of-KB regardless of any similarity score.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    passages_by_topic: HashMap<String, Vec<Passage>>,
    passage_count: usize,
}

impl KnowledgeBase {
    /// Load the passages table from a CSV file.
    ///
    /// Expected columns: `topic_id, passage_id, passage_text, relevance_tier`
    /// (`passage` and `relevance_judgment` are accepted as aliases).
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            Error::Config(format!(
                "cannot open passages table {}: {e}",
                path.display()
            ))
        })?;
        Self::from_reader(file)
    }

    /// Load the passages table from any CSV reader.
    ///
    /// Passages are grouped by topic in file order. The relevance tier is
    /// assumed uniform within a topic; rows that disagree with the topic's
    /// first row are logged at warn level, and the first row stays
    /// authoritative.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut passages_by_topic: HashMap<String, Vec<Passage>> =
            HashMap::new();
        let mut passage_count = 0usize;

        for row in csv_reader.deserialize() {
            let passage: Passage = row?;
            passage_count += 1;
            passages_by_topic
                .entry(passage.topic_id.clone())
                .or_default()
                .push(passage);
        }

        if passages_by_topic.is_empty() {
            return Err(Error::Config(
                "passages table is empty; the knowledge base must contain at \
                 least one passage"
                    .into(),
            ));
        }

        for (topic_id, passages) in &passages_by_topic {
            let first_tier = passages[0].relevance_tier;
            if passages.iter().any(|p| p.relevance_tier != first_tier) {
                warn!(
                    topic_id = %topic_id,
                    first_tier,
                    "relevance tier is not uniform across topic; the first \
                     row's tier is used"
                );
            }
        }

        Ok(Self {
            passages_by_topic,
            passage_count,
        })
    }

    /// All passages for a topic, in stored order. None if the topic has no
    /// passages (Out-of-KB).
    pub fn passages(&self, topic_id: &str) -> Option<&[Passage]> {
        self.passages_by_topic.get(topic_id).map(|v| v.as_slice())
    }

    /// Relevance tier of a topic, read from its first passage row.
    pub fn first_tier(&self, topic_id: &str) -> Option<i64> {
        self.passages_by_topic
            .get(topic_id)
            .map(|v| v[0].relevance_tier)
    }

    pub fn topic_count(&self) -> usize {
        self.passages_by_topic.len()
    }

    pub fn passage_count(&self) -> usize {
        self.passage_count
    }

    /// Iterate topic ids with the tier read from each topic's first row.
    pub fn topic_tiers(&self) -> impl Iterator<Item = (&str, i64)> {
        self.passages_by_topic
            .iter()
            .map(|(topic, passages)| (topic.as_str(), passages[0].relevance_tier))
    }
}
