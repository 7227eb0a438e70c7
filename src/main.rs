use clap::Parser;
use tracing_subscriber::EnvFilter;

use folioqa::{
    DataDir, Engine, EngineOptions, HashedTfEncoder, HttpEncoder,
    HttpGenerator, KnowledgeBase, QuestionIndex, QuestionSet, TextEncoder,
    cli::{AskArgs, Cli, Command, EncoderKind, MatchArgs, StatusArgs},
    error::{self, Error},
    generate,
    resolver::Classification,
    vector_cache::{VectorCache, corpus_fingerprint},
};

const ENCODER_URL_VAR: &str = "FOLIOQA_ENCODER_URL";
const ENCODER_MODEL_VAR: &str = "FOLIOQA_ENCODER_MODEL";
const GENERATOR_URL_VAR: &str = "FOLIOQA_GENERATOR_URL";
const GENERATOR_MODEL_VAR: &str = "FOLIOQA_GENERATOR_MODEL";
const API_KEY_VAR: &str = "FOLIOQA_API_KEY";

const DEFAULT_ENCODER_MODEL: &str = "text-embedding-3-small";
const DEFAULT_GENERATOR_MODEL: &str = "gpt-4o-mini";

fn init_tracing(verbose: u8) {
    let filter = if let Ok(env) = std::env::var("FOLIOQA_LOG") {
        EnvFilter::new(env)
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Ask(ref args) => cmd_ask(&cli, args),
        Command::Match(ref args) => cmd_match(&cli, args),
        Command::Status(ref args) => cmd_status(&cli, args),
        Command::Rebuild => cmd_rebuild(&cli),
        Command::Completions(ref args) => {
            folioqa::cli::generate_completions(args.shell);
            Ok(())
        }
    }
}

fn make_encoder(kind: EncoderKind) -> error::Result<Box<dyn TextEncoder>> {
    match kind {
        EncoderKind::Hashed => Ok(Box::new(HashedTfEncoder::default())),
        EncoderKind::Http => {
            let base_url = std::env::var(ENCODER_URL_VAR).map_err(|_| {
                Error::Config(format!(
                    "the http encoder requires {ENCODER_URL_VAR} to be set"
                ))
            })?;
            let model = std::env::var(ENCODER_MODEL_VAR)
                .unwrap_or_else(|_| DEFAULT_ENCODER_MODEL.to_string());
            let api_key = std::env::var(API_KEY_VAR).ok();
            Ok(Box::new(HttpEncoder::new(&base_url, &model, api_key)?))
        }
    }
}

fn make_backend() -> error::Result<Box<dyn folioqa::GenerationBackend>> {
    let base_url = std::env::var(GENERATOR_URL_VAR).map_err(|_| {
        Error::Config(format!(
            "--generate requires {GENERATOR_URL_VAR} to be set"
        ))
    })?;
    let model = std::env::var(GENERATOR_MODEL_VAR)
        .unwrap_or_else(|_| DEFAULT_GENERATOR_MODEL.to_string());
    let api_key = std::env::var(API_KEY_VAR).ok();

    let generator =
        HttpGenerator::new(&base_url, &model, api_key, generate::DEFAULT_TIMEOUT)
            .map_err(|e| {
                Error::Config(format!("cannot configure generator: {e}"))
            })?;
    Ok(Box::new(generator))
}

/// Load the corpus, build (or reuse) the vector index, and assemble the
/// engine context.
fn load_engine(cli: &Cli, with_backend: bool) -> error::Result<Engine> {
    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;

    let questions_path = cli
        .questions
        .clone()
        .unwrap_or_else(|| data_dir.questions_csv());
    let passages_path = cli
        .passages
        .clone()
        .unwrap_or_else(|| data_dir.passages_csv());

    let questions = QuestionSet::from_csv_path(&questions_path)?;
    let knowledge_base = KnowledgeBase::from_csv_path(&passages_path)?;

    let encoder = make_encoder(cli.encoder)?;
    let cache = VectorCache::open(&data_dir.vector_cache_db())?;
    let index =
        QuestionIndex::build_cached(&questions, encoder.as_ref(), &cache)?;

    let backend = if with_backend {
        Some(make_backend()?)
    } else {
        None
    };

    Ok(Engine::new(
        index,
        knowledge_base,
        encoder,
        backend,
        EngineOptions::default(),
    ))
}

fn cmd_ask(cli: &Cli, args: &AskArgs) -> error::Result<()> {
    let engine = load_engine(cli, args.generate)?;
    let answer = engine.ask(&args.question)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        println!("{}", answer.answer);
        println!();
        println!("classification: {}", answer.classification);
        if !answer.passage_ids.is_empty() {
            println!("passages: {}", answer.passage_ids.join(", "));
        }
    }
    Ok(())
}

fn cmd_match(cli: &Cli, args: &MatchArgs) -> error::Result<()> {
    let engine = load_engine(cli, false)?;
    let matches = engine.match_top_k(&args.question, args.top_k)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&matches)?);
    } else {
        for (i, m) in matches.iter().enumerate() {
            println!(
                "{:>3}. [{:.3}] {} {}",
                i + 1,
                m.score,
                m.topic_id,
                m.question_id
            );
        }
        println!("\n{} match(es)", matches.len());
    }
    Ok(())
}

fn cmd_status(cli: &Cli, args: &StatusArgs) -> error::Result<()> {
    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let engine = load_engine(cli, false)?;
    let cache = VectorCache::open(&data_dir.vector_cache_db())?;

    let kb = engine.knowledge_base();
    let mut known = 0usize;
    let mut inferred = 0usize;
    let mut unknown = 0usize;
    for (_, tier) in kb.topic_tiers() {
        match Classification::from_tier(tier) {
            Classification::Known => known += 1,
            Classification::Inferred => inferred += 1,
            _ => unknown += 1,
        }
    }

    if args.json {
        let status = serde_json::json!({
            "data_dir": data_dir.root().display().to_string(),
            "questions": engine.index().len(),
            "topics": kb.topic_count(),
            "passages": kb.passage_count(),
            "topics_by_tier": {
                "known": known,
                "inferred": inferred,
                "unknown": unknown,
            },
            "cached_vectors": cache.len()?,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("data dir: {}", data_dir.root().display());
        println!("canonical questions: {}", engine.index().len());
        println!(
            "topics: {} ({} known, {} inferred, {} unknown)",
            kb.topic_count(),
            known,
            inferred,
            unknown
        );
        println!("passages: {}", kb.passage_count());
        println!("cached vectors: {}", cache.len()?);
    }
    Ok(())
}

fn cmd_rebuild(cli: &Cli) -> error::Result<()> {
    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let questions_path = cli
        .questions
        .clone()
        .unwrap_or_else(|| data_dir.questions_csv());
    let questions = QuestionSet::from_csv_path(&questions_path)?;

    let encoder = make_encoder(cli.encoder)?;
    let cache = VectorCache::open(&data_dir.vector_cache_db())?;

    // Force a full re-encode by resetting the cache first.
    let fingerprint = corpus_fingerprint(&encoder.id(), &questions);
    cache.reset(&fingerprint)?;
    QuestionIndex::build_cached(&questions, encoder.as_ref(), &cache)?;

    println!("Re-encoded {} question vector(s)", questions.len());
    Ok(())
}
