use tracing::debug;

use crate::{
    answer::{Answer, StrategyOptions, dispatch},
    corpus::KnowledgeBase,
    encoder::TextEncoder,
    error::{Error, Result},
    generate::GenerationBackend,
    index::{QuestionIndex, TopicMatch},
    resolver::{self, DEFAULT_PASSAGE_LIMIT},
};

/// Engine construction-time tunables.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Maximum passages attached to a resolution.
    pub passage_limit: usize,
    pub strategy: StrategyOptions,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            passage_limit: DEFAULT_PASSAGE_LIMIT,
            strategy: StrategyOptions::default(),
        }
    }
}

/// The immutable query-answering context: embedding index, knowledge base,
/// encoder, and optional generation backend.
///
/// Constructed once at startup and passed by reference into every handler;
/// all state is read-only after construction, so concurrent `ask` calls
/// need no locking. Whether a backend is used is decided here, not per
/// query.
pub struct Engine {
    index: QuestionIndex,
    knowledge_base: KnowledgeBase,
    encoder: Box<dyn TextEncoder>,
    backend: Option<Box<dyn GenerationBackend>>,
    options: EngineOptions,
}

impl Engine {
    pub fn new(
        index: QuestionIndex,
        knowledge_base: KnowledgeBase,
        encoder: Box<dyn TextEncoder>,
        backend: Option<Box<dyn GenerationBackend>>,
        options: EngineOptions,
    ) -> Self {
        Self {
            index,
            knowledge_base,
            encoder,
            backend,
            options,
        }
    }

    /// Answer one free-text question: match, resolve, dispatch.
    ///
    /// Apart from blank-query rejection this always produces an answer and
    /// a classification; generation backend failures are downgraded inside
    /// the dispatcher and never surface here.
    pub fn ask(&self, query: &str) -> Result<Answer> {
        if query.trim().is_empty() {
            return Err(Error::EmptyQuery);
        }

        let matched = self.index.match_query(self.encoder.as_ref(), query)?;
        debug!(
            topic = %matched.topic_id,
            question = %matched.question_id,
            score = matched.score,
            "matched canonical question"
        );

        let resolution = resolver::resolve(
            &self.knowledge_base,
            &matched.topic_id,
            self.options.passage_limit,
        );
        debug!(
            classification = %resolution.classification,
            passages = resolution.passages.len(),
            "resolved topic"
        );

        Ok(dispatch(
            query,
            resolution,
            self.backend.as_deref(),
            &self.options.strategy,
        ))
    }

    /// Ranked top-k canonical question matches, for diagnostics.
    pub fn match_top_k(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<TopicMatch>> {
        self.index.match_top_k(self.encoder.as_ref(), query, k)
    }

    pub fn index(&self) -> &QuestionIndex {
        &self.index
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.knowledge_base
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        corpus::QuestionSet, encoder::HashedTfEncoder,
        resolver::Classification,
    };

    const QUESTIONS_CSV: &str = "\
topic_id,question_id,question_text
W01,Q001,What metaphor does Romeo use to describe Juliet at the window?
T01,Q002,How does Tybalt's attitude toward Romeo evolve through the acts?
S01,Q003,What would happen if Romeo and Juliet had smartphones?
";

    const PASSAGES_CSV: &str = "\
topic_id,passage_id,passage_text,relevance_tier
W01,P001,It is the east and Juliet is the sun.,2
W01,P002,Romeo calls Juliet the rising sun.,2
T01,P003,Tybalt rages when Romeo attends the feast.,1
T01,P004,Tybalt later sends Romeo a written challenge.,1
";

    fn engine() -> Engine {
        let questions =
            QuestionSet::from_reader(QUESTIONS_CSV.as_bytes()).unwrap();
        let kb = KnowledgeBase::from_reader(PASSAGES_CSV.as_bytes()).unwrap();
        let encoder = HashedTfEncoder::new(256);
        let index = QuestionIndex::build(&questions, &encoder).unwrap();
        Engine::new(index, kb, Box::new(encoder), None, EngineOptions::default())
    }

    #[test]
    fn known_query_returns_first_passage() {
        let engine = engine();
        let a = engine
            .ask("What metaphor does Romeo use to describe Juliet at the window?")
            .unwrap();
        assert_eq!(a.classification, Classification::Known);
        assert_eq!(a.answer, "It is the east and Juliet is the sun.");
    }

    #[test]
    fn topic_without_passages_is_out_of_kb() {
        let engine = engine();
        let a = engine
            .ask("What would happen if Romeo and Juliet had smartphones?")
            .unwrap();
        assert_eq!(a.classification, Classification::OutOfKb);
        assert!(a.passages.is_empty());
    }

    #[test]
    fn blank_query_is_an_input_error() {
        let engine = engine();
        assert!(matches!(engine.ask("  \t "), Err(Error::EmptyQuery)));
    }

    #[test]
    fn ask_is_idempotent_without_backend() {
        let engine = engine();
        let a = engine.ask("How does Tybalt treat Romeo?").unwrap();
        let b = engine.ask("How does Tybalt treat Romeo?").unwrap();
        assert_eq!(a.answer, b.answer);
        assert_eq!(a.classification, b.classification);
        assert_eq!(a.passage_ids, b.passage_ids);
    }

    #[test]
    fn concurrent_queries_share_the_engine() {
        let engine = engine();
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        engine
                            .ask("How does Tybalt's attitude evolve?")
                            .unwrap()
                    })
                })
                .collect();
            let answers: Vec<_> =
                handles.into_iter().map(|h| h.join().unwrap()).collect();
            for pair in answers.windows(2) {
                assert_eq!(pair[0].answer, pair[1].answer);
            }
        });
    }

    #[test]
    fn top_k_diagnostics_cover_the_corpus() {
        let engine = engine();
        let ranked = engine.match_top_k("Juliet at the window", 10).unwrap();
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].topic_id, "W01");
    }
}
