//! # Local RAG CLI (`lrag`)
//!
//! ## Usage
//!
//! ```bash
//! lrag --config ./config/lrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lrag index` | Rebuild the index from the documents directory |
//! | `lrag ask "<query>"` | Answer one question using retrieved context |
//! | `lrag chat` | Interactive chat with retrieved context |
//! | `lrag assist` | Interactive chat without retrieval, with a prompt preview |
//! | `lrag completions <shell>` | Print shell completions |
//!
//! `ask` and `chat` load the persisted index, building it first when it does
//! not exist yet.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing::info;

use local_rag::chat::ChatSession;
use local_rag::config::{self, Config};
use local_rag::conversation_log::ConversationLog;
use local_rag::embedding::create_embedder;
use local_rag::index::VectorIndex;
use local_rag::ingest::Ingestor;
use local_rag::llm::{create_model, Sampling};
use local_rag::models::History;
use local_rag::progress::{IndexProgressReporter, NoProgress, ProgressMode};
use local_rag::prompt::Mode;
use local_rag::retriever::Retriever;

/// Local RAG: index local documents and chat with a language model about
/// them.
#[derive(Parser)]
#[command(
    name = "lrag",
    about = "Local RAG: document indexing, semantic retrieval, and token-budgeted chat",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lrag.toml")]
    config: PathBuf,

    /// Log at debug level (ignored when RUST_LOG is set).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the index from the documents directory.
    ///
    /// Always a full rebuild: every document is extracted, chunked, and
    /// embedded again, and both index files are overwritten.
    Index {
        /// Progress output: `off`, `human`, or `json` (stderr). Defaults to
        /// `human` on a terminal, `off` otherwise.
        #[arg(long)]
        progress: Option<ProgressMode>,
    },

    /// Answer a single question using retrieved context.
    Ask {
        query: String,

        #[command(flatten)]
        model: ModelArgs,

        /// Number of chunks to retrieve (defaults to retrieval.top_k).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Interactive chat with retrieved context. Type `exit` or `quit` to leave.
    Chat {
        #[command(flatten)]
        model: ModelArgs,

        /// Number of chunks to retrieve per turn (defaults to retrieval.top_k).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Interactive assistant without retrieval. Prints the assembled prompt
    /// before each generation.
    Assist {
        #[command(flatten)]
        model: ModelArgs,

        /// Override the configured system message.
        #[arg(long)]
        system: Option<String>,
    },

    /// Print shell completions to stdout.
    Completions { shell: Shell },
}

#[derive(clap::Args)]
struct ModelArgs {
    /// Model name from `[models]` (defaults to llm.default_model).
    #[arg(long)]
    model: Option<String>,

    /// Task mode: default, translate, summarize, or sentiment.
    #[arg(long, default_value = "default")]
    mode: String,

    #[arg(long)]
    temperature: Option<f32>,

    #[arg(long)]
    top_p: Option<f32>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "lrag", &mut std::io::stdout());
        return Ok(());
    }

    local_rag::logging::init(cli.verbose);
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Index { progress } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            let mut retriever = build_retriever(&cfg, mode.reporter())?;
            let chunks = retriever.index_documents(&cfg.documents.path, &cfg.index.path)?;
            println!(
                "Indexed {} chunks into {}",
                chunks,
                cfg.index.path.display()
            );
        }
        Commands::Ask {
            query,
            model,
            top_k,
        } => {
            let session = rag_session(&cfg, &model, top_k)?;
            match session.turn(&History::new(), &query)? {
                Some(outcome) => println!("{}", outcome.reply),
                None => anyhow::bail!("query is empty"),
            }
        }
        Commands::Chat { model, top_k } => {
            let session = rag_session(&cfg, &model, top_k)?;
            run_repl(&session, false)?;
        }
        Commands::Assist { model, system } => {
            let mut session = base_session(&cfg, &model)?;
            if let Some(system) = system {
                session = session.with_system_message(system);
            }
            run_repl(&session, true)?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn build_retriever(cfg: &Config, progress: Box<dyn IndexProgressReporter>) -> Result<Retriever> {
    let ingestor = Ingestor::new(cfg.chunking.params()?)
        .with_excludes(&cfg.documents.exclude_globs)?
        .follow_symlinks(cfg.documents.follow_symlinks)
        .with_progress(progress);
    let embedder = create_embedder(&cfg.embedding)?;
    Ok(Retriever::new(ingestor, embedder)
        .with_index(VectorIndex::new().with_batch_size(cfg.embedding.batch_size)))
}

fn base_session(cfg: &Config, args: &ModelArgs) -> Result<ChatSession> {
    let mode: Mode = args.mode.parse()?;
    let (name, model_cfg) = cfg.resolve_model(args.model.as_deref())?;
    let sampling = Sampling::from_config(model_cfg).with_overrides(args.temperature, args.top_p);
    let model = create_model(model_cfg, sampling)
        .with_context(|| format!("Failed to set up model '{}'", name))?;
    info!(model = name, format = %model_cfg.prompt_format, "Model ready");

    let mut session = ChatSession::new(model, model_cfg.prompt_format)
        .with_system_message(cfg.prompt.system_message.clone())
        .with_token_budget(cfg.prompt.token_budget)
        .with_mode(mode);
    if let Some(log) = &cfg.conversation_log {
        session = session.with_log(ConversationLog::new(&log.path));
    }
    Ok(session)
}

fn rag_session(cfg: &Config, args: &ModelArgs, top_k: Option<usize>) -> Result<ChatSession> {
    let session = base_session(cfg, args)?;
    let mut retriever = build_retriever(cfg, Box::new(NoProgress))?;
    retriever
        .prepare(&cfg.documents.path, &cfg.index.path)
        .with_context(|| {
            format!(
                "Failed to prepare index at {} from {}",
                cfg.index.path.display(),
                cfg.documents.path.display()
            )
        })?;
    let top_k = top_k.unwrap_or(cfg.retrieval.top_k).max(1);
    Ok(session.with_retriever(retriever, top_k))
}

fn run_repl(session: &ChatSession, preview: bool) -> Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let mut history = History::new();

    println!("Type 'exit' or 'quit' to leave.");
    loop {
        print!("You: ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if matches!(input.to_ascii_lowercase().as_str(), "exit" | "quit") {
            break;
        }
        if input.is_empty() {
            continue;
        }

        let prompt = match session.build_prompt(&history, input) {
            Ok(prompt) => prompt,
            Err(e) => {
                eprintln!("Error: {:#}", anyhow::Error::from(e));
                continue;
            }
        };
        if preview {
            eprintln!("--- prompt ---\n{}\n--------------", prompt);
        }
        match session.complete_turn(&history, input, &prompt) {
            Ok(outcome) => {
                println!("Assistant: {}", outcome.reply);
                history = outcome.history;
            }
            Err(e) => eprintln!("Error: {:#}", anyhow::Error::from(e)),
        }
    }
    Ok(())
}
