use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::{
    corpus::QuestionSet,
    encoder::{TextEncoder, l2_normalize},
    error::{Error, Result},
    question_key::QuestionKey,
    vector_cache::{VectorCache, corpus_fingerprint},
};

/// The best-matching canonical question for a query.
#[derive(Debug, Clone, Serialize)]
pub struct TopicMatch {
    pub topic_id: String,
    pub question_id: String,
    pub score: f32,
}

#[derive(Debug, Clone)]
struct IndexEntry {
    topic_id: String,
    question_id: String,
    vector: Vec<f32>,
}

/// The embedding index: one normalized vector per canonical question.
///
/// Built once at startup and read-only afterwards; concurrent queries need
/// no locking. Lookup always returns a best match: no minimum-similarity
/// threshold is applied, which is adequate for a closed, topic-bounded
/// corpus but will force genuinely unrelated queries into whichever topic
/// scores highest.
pub struct QuestionIndex {
    entries: Vec<IndexEntry>,
}

impl QuestionIndex {
    /// Encode every canonical question and build the index.
    ///
    /// An empty corpus is a fatal configuration error.
    pub fn build(
        questions: &QuestionSet,
        encoder: &dyn TextEncoder,
    ) -> Result<Self> {
        if questions.is_empty() {
            return Err(Error::Config(
                "cannot build an index over an empty question corpus".into(),
            ));
        }

        let texts: Vec<String> =
            questions.iter().map(|q| q.text.clone()).collect();
        let vectors = encoder.encode_batch(&texts)?;

        Ok(Self::assemble(questions, vectors))
    }

    /// Build the index, reusing cached vectors where the cache fingerprint
    /// matches the current corpus and encoder.
    ///
    /// Missing vectors are encoded and written back, so a warm cache makes
    /// startup a pure read.
    pub fn build_cached(
        questions: &QuestionSet,
        encoder: &dyn TextEncoder,
        cache: &VectorCache,
    ) -> Result<Self> {
        if questions.is_empty() {
            return Err(Error::Config(
                "cannot build an index over an empty question corpus".into(),
            ));
        }

        let fingerprint = corpus_fingerprint(&encoder.id(), questions);
        if cache.fingerprint()?.as_deref() != Some(fingerprint.as_str()) {
            debug!("vector cache fingerprint mismatch, clearing cache");
            cache.reset(&fingerprint)?;
        }

        let keys: Vec<QuestionKey> = questions
            .iter()
            .map(|q| QuestionKey::new(&q.topic_id, &q.question_id))
            .collect();

        let mut vectors: Vec<Option<Vec<f32>>> =
            Vec::with_capacity(questions.len());
        for key in &keys {
            vectors.push(cache.load(key.numeric)?);
        }

        let missing: Vec<usize> = vectors
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.is_none().then_some(i))
            .collect();

        if !missing.is_empty() {
            let texts: Vec<String> = missing
                .iter()
                .map(|&i| questions.as_slice()[i].text.clone())
                .collect();
            let encoded = encoder.encode_batch(&texts)?;

            let entries: Vec<(u64, Vec<f32>)> = missing
                .iter()
                .zip(encoded)
                .map(|(&i, vector)| (keys[i].numeric, vector))
                .collect();
            cache.batch_store(&entries)?;

            for (&i, (_, vector)) in missing.iter().zip(entries) {
                vectors[i] = Some(vector);
            }
        }

        debug!(
            total = questions.len(),
            encoded = missing.len(),
            "question index built"
        );

        let vectors: Vec<Vec<f32>> =
            vectors.into_iter().map(|v| v.unwrap_or_default()).collect();
        Ok(Self::assemble(questions, vectors))
    }

    fn assemble(questions: &QuestionSet, vectors: Vec<Vec<f32>>) -> Self {
        let entries = questions
            .iter()
            .zip(vectors)
            .map(|(question, mut vector)| {
                l2_normalize(&mut vector);
                IndexEntry {
                    topic_id: question.topic_id.clone(),
                    question_id: question.question_id.clone(),
                    vector,
                }
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the single best-matching canonical question for a query.
    ///
    /// Ties are broken by first-encountered corpus order, which is stable
    /// but not semantically meaningful.
    pub fn match_query(
        &self,
        encoder: &dyn TextEncoder,
        query: &str,
    ) -> Result<TopicMatch> {
        let scores = self.score_all(encoder, query)?;

        // Strictly-greater comparison keeps the first entry on ties.
        let mut best = 0usize;
        for (i, &score) in scores.iter().enumerate() {
            if score > scores[best] {
                best = i;
            }
        }

        Ok(self.to_match(best, scores[best]))
    }

    /// Ranked top-k matches for diagnostic use.
    pub fn match_top_k(
        &self,
        encoder: &dyn TextEncoder,
        query: &str,
        k: usize,
    ) -> Result<Vec<TopicMatch>> {
        let scores = self.score_all(encoder, query)?;

        let mut ranked: Vec<(usize, f32)> =
            scores.into_iter().enumerate().collect();
        // Stable sort preserves corpus order among equal scores.
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(k);

        Ok(ranked
            .into_iter()
            .map(|(i, score)| self.to_match(i, score))
            .collect())
    }

    /// Inner product of the normalized query vector against every entry,
    /// in corpus order.
    fn score_all(
        &self,
        encoder: &dyn TextEncoder,
        query: &str,
    ) -> Result<Vec<f32>> {
        if query.trim().is_empty() {
            return Err(Error::EmptyQuery);
        }

        let mut query_vector = encoder.encode(query)?;
        l2_normalize(&mut query_vector);

        Ok(self
            .entries
            .par_iter()
            .map(|entry| dot(&query_vector, &entry.vector))
            .collect())
    }

    fn to_match(&self, index: usize, score: f32) -> TopicMatch {
        let entry = &self.entries[index];
        TopicMatch {
            topic_id: entry.topic_id.clone(),
            question_id: entry.question_id.clone(),
            score,
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{corpus::QuestionSet, encoder::HashedTfEncoder};

    const QUESTIONS_CSV: &str = "\
topic_id,question_id,question_text
W01,Q001,What metaphor does Romeo use for Juliet at the window?
F01,Q002,Why does Friar Laurence agree to marry the lovers?
T01,Q003,How does Tybalt's attitude toward Romeo change across acts?
";

    fn fixture() -> (QuestionSet, HashedTfEncoder) {
        let questions =
            QuestionSet::from_reader(QUESTIONS_CSV.as_bytes()).unwrap();
        (questions, HashedTfEncoder::new(256))
    }

    #[test]
    fn self_match_returns_own_topic_at_max_score() {
        let (questions, encoder) = fixture();
        let index = QuestionIndex::build(&questions, &encoder).unwrap();

        for question in questions.iter() {
            let m = index.match_query(&encoder, &question.text).unwrap();
            assert_eq!(m.topic_id, question.topic_id);
            assert_eq!(m.question_id, question.question_id);
            assert!((m.score - 1.0).abs() < 1e-5, "score was {}", m.score);
        }
    }

    #[test]
    fn always_returns_a_best_match() {
        let (questions, encoder) = fixture();
        let index = QuestionIndex::build(&questions, &encoder).unwrap();

        // Nothing in the corpus resembles this, but a match still comes back.
        let m = index
            .match_query(&encoder, "quantum chromodynamics lattice gauge")
            .unwrap();
        assert!(["W01", "F01", "T01"].contains(&m.topic_id.as_str()));
    }

    #[test]
    fn blank_query_is_rejected() {
        let (questions, encoder) = fixture();
        let index = QuestionIndex::build(&questions, &encoder).unwrap();

        assert!(matches!(
            index.match_query(&encoder, "   "),
            Err(Error::EmptyQuery)
        ));
        assert!(matches!(
            index.match_top_k(&encoder, "", 3),
            Err(Error::EmptyQuery)
        ));
    }

    #[test]
    fn empty_corpus_is_rejected_at_load() {
        let csv = "topic_id,question_id,question_text\n";
        assert!(matches!(
            QuestionSet::from_reader(csv.as_bytes()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn top_k_is_ranked_and_capped() {
        let (questions, encoder) = fixture();
        let index = QuestionIndex::build(&questions, &encoder).unwrap();

        let ranked = index
            .match_top_k(&encoder, "How does Tybalt treat Romeo?", 2)
            .unwrap();
        assert_eq!(ranked.len(), 2);
        assert!(ranked[0].score >= ranked[1].score);
        assert_eq!(ranked[0].topic_id, "T01");
    }

    #[test]
    fn tie_breaks_by_corpus_order() {
        let csv = "\
topic_id,question_id,question_text
A01,Q001,identical question text
A02,Q002,identical question text
";
        let questions = QuestionSet::from_reader(csv.as_bytes()).unwrap();
        let encoder = HashedTfEncoder::new(128);
        let index = QuestionIndex::build(&questions, &encoder).unwrap();

        let m = index
            .match_query(&encoder, "identical question text")
            .unwrap();
        assert_eq!(m.topic_id, "A01");

        let ranked = index
            .match_top_k(&encoder, "identical question text", 2)
            .unwrap();
        assert_eq!(ranked[0].topic_id, "A01");
        assert_eq!(ranked[1].topic_id, "A02");
    }

    #[test]
    fn matching_is_deterministic() {
        let (questions, encoder) = fixture();
        let index = QuestionIndex::build(&questions, &encoder).unwrap();

        let a = index.match_query(&encoder, "the friar marries them").unwrap();
        let b = index.match_query(&encoder, "the friar marries them").unwrap();
        assert_eq!(a.topic_id, b.topic_id);
        assert_eq!(a.score, b.score);
    }

    #[test]
    fn cached_build_matches_uncached() {
        let (questions, encoder) = fixture();
        let tmp = tempfile::tempdir().unwrap();
        let cache =
            VectorCache::open(&tmp.path().join("vectors.redb")).unwrap();

        let cold =
            QuestionIndex::build_cached(&questions, &encoder, &cache).unwrap();
        assert_eq!(cache.len().unwrap(), questions.len());

        // Second build is served from the cache.
        let warm =
            QuestionIndex::build_cached(&questions, &encoder, &cache).unwrap();
        let plain = QuestionIndex::build(&questions, &encoder).unwrap();

        for query in ["Tybalt and Romeo", "Juliet at the window"] {
            let a = cold.match_query(&encoder, query).unwrap();
            let b = warm.match_query(&encoder, query).unwrap();
            let c = plain.match_query(&encoder, query).unwrap();
            assert_eq!(a.topic_id, b.topic_id);
            assert_eq!(b.topic_id, c.topic_id);
            assert!((a.score - c.score).abs() < 1e-6);
        }
    }

    #[test]
    fn encoder_change_invalidates_cache() {
        let (questions, _) = fixture();
        let tmp = tempfile::tempdir().unwrap();
        let cache =
            VectorCache::open(&tmp.path().join("vectors.redb")).unwrap();

        let small = HashedTfEncoder::new(64);
        let large = HashedTfEncoder::new(256);

        QuestionIndex::build_cached(&questions, &small, &cache).unwrap();
        let fp_small = cache.fingerprint().unwrap();

        QuestionIndex::build_cached(&questions, &large, &cache).unwrap();
        let fp_large = cache.fingerprint().unwrap();
        assert_ne!(fp_small, fp_large);

        // Cached vectors now have the large encoder's dimension.
        let key = QuestionKey::new("W01", "Q001");
        assert_eq!(cache.load(key.numeric).unwrap().unwrap().len(), 256);
    }
}
