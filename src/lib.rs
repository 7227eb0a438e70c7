//! folioqa - a question answering engine for a fixed literary corpus.
//!
//! folioqa matches a free-text question against a pre-indexed set of
//! canonical questions via embeddings, resolves the matched topic to a
//! relevance classification (Known / Inferred / Out-of-KB), and routes to
//! one of three answer strategies: return a stored passage verbatim,
//! synthesize from multiple passages, or refuse.
//!
//! # Quick start
//!
//! ```no_run
//! use std::path::Path;
//!
//! use folioqa::{
//!     Engine, EngineOptions, HashedTfEncoder, KnowledgeBase, QuestionIndex,
//!     QuestionSet,
//! };
//!
//! let questions = QuestionSet::from_csv_path(Path::new("questions.csv")).unwrap();
//! let knowledge_base = KnowledgeBase::from_csv_path(Path::new("passages.csv")).unwrap();
//!
//! let encoder = HashedTfEncoder::default();
//! let index = QuestionIndex::build(&questions, &encoder).unwrap();
//!
//! let engine = Engine::new(
//!     index,
//!     knowledge_base,
//!     Box::new(encoder),
//!     None,
//!     EngineOptions::default(),
//! );
//!
//! let answer = engine
//!     .ask("What metaphor does Romeo use to describe Juliet?")
//!     .unwrap();
//! println!("[{}] {}", answer.classification, answer.answer);
//! ```

pub mod answer;
pub mod cli;
pub mod corpus;
pub mod data_dir;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod generate;
pub mod index;
pub mod question_key;
pub mod resolver;
pub mod vector_cache;

pub use answer::{Answer, StrategyOptions};
pub use corpus::{CanonicalQuestion, KnowledgeBase, Passage, QuestionSet};
pub use data_dir::DataDir;
pub use encoder::{HashedTfEncoder, HttpEncoder, TextEncoder};
pub use engine::{Engine, EngineOptions};
pub use error::{Error, Result};
pub use generate::{GenerationBackend, GenerationError, HttpGenerator, PromptContext};
pub use index::{QuestionIndex, TopicMatch};
pub use question_key::QuestionKey;
pub use resolver::{Classification, Resolution};
pub use vector_cache::VectorCache;
