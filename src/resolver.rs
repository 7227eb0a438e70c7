use serde::Serialize;

use crate::corpus::KnowledgeBase;

/// Default number of passages attached to a resolution.
pub const DEFAULT_PASSAGE_LIMIT: usize = 4;

/// Classification of a matched topic, driving the answer strategy.
///
/// `Unknown` covers relevance tiers other than 2 and 1; it is answered like
/// `Inferred` but reported distinctly for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Classification {
    Known,
    Inferred,
    Unknown,
    OutOfKb,
}

impl Classification {
    /// Map a relevance tier to its classification. Only meaningful for
    /// topics that have passages; absent topics are `OutOfKb` by lookup.
    pub fn from_tier(tier: i64) -> Self {
        match tier {
            2 => Self::Known,
            1 => Self::Inferred,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Known => "Known",
            Self::Inferred => "Inferred",
            Self::Unknown => "Unknown",
            Self::OutOfKb => "Out-of-KB",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved topic: classification plus its ordered passage evidence.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub classification: Classification,
    pub passages: Vec<String>,
    pub passage_ids: Vec<String>,
    /// Uniform 1.0 per passage: passages are curated ground truth, so the
    /// retrieval similarity picks the topic but never ranks passages.
    pub scores: Vec<f32>,
}

impl Resolution {
    fn out_of_kb() -> Self {
        Self {
            classification: Classification::OutOfKb,
            passages: Vec::new(),
            passage_ids: Vec::new(),
            scores: Vec::new(),
        }
    }
}

/// Turn a matched topic into a classification and an ordered passage list.
///
/// A topic absent from the passages table is always Out-of-KB, independent
/// of the similarity score that selected it. Otherwise the relevance tier is
/// read from the topic's first passage row and passages are returned in
/// stored order, truncated to `limit`.
pub fn resolve(
    knowledge_base: &KnowledgeBase,
    topic_id: &str,
    limit: usize,
) -> Resolution {
    let Some(passages) = knowledge_base.passages(topic_id) else {
        return Resolution::out_of_kb();
    };

    let classification =
        Classification::from_tier(passages[0].relevance_tier);

    let kept = &passages[..passages.len().min(limit)];
    Resolution {
        classification,
        passages: kept.iter().map(|p| p.text.clone()).collect(),
        passage_ids: kept.iter().map(|p| p.passage_id.clone()).collect(),
        scores: vec![1.0; kept.len()],
    }
}
