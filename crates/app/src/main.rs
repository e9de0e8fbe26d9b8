use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use pdf_chat_core::{
    discover_pdf_files, extract_text, load_documents, split_text, CharacterNgramEmbedder,
    ChatCoordinator, ChatMessage, ChatModel, ChatSession, ChunkingConfig, Embedder,
    LopdfExtractor, OpenAiChatModel, OpenAiEmbedder, PipelineOptions, ProviderConfig,
    ProviderError, RawDocument, RetrievalOptions, RetryPolicy, Role, SimilarityMetric,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-chat", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// API key for the embedding and chat provider
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, default_value = "")]
    api_key: String,

    /// Base URL of an OpenAI-compatible API
    #[arg(long, env = "OPENAI_BASE_URL", default_value = pdf_chat_core::DEFAULT_BASE_URL)]
    base_url: String,

    /// Chat completion model
    #[arg(long, env = "PDF_CHAT_CHAT_MODEL", default_value = pdf_chat_core::DEFAULT_CHAT_MODEL)]
    chat_model: String,

    /// Embedding model
    #[arg(long, env = "PDF_CHAT_EMBEDDING_MODEL", default_value = pdf_chat_core::DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Sampling temperature for answers
    #[arg(long, env = "PDF_CHAT_TEMPERATURE", default_value = "0.7")]
    temperature: f32,

    /// Per-request timeout in seconds
    #[arg(long, env = "PDF_CHAT_TIMEOUT_SECS", default_value = "60")]
    timeout_secs: u64,

    /// Attempts per provider request, including the first
    #[arg(long, env = "PDF_CHAT_MAX_ATTEMPTS", default_value = "4")]
    max_attempts: u32,

    /// Embed locally with hashed character trigrams instead of the provider
    #[arg(long, default_value_t = false)]
    local_embeddings: bool,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Args)]
struct PipelineArgs {
    /// Maximum chunk size in characters
    #[arg(long, default_value = "1000")]
    chunk_size: usize,

    /// Characters shared between consecutive chunks
    #[arg(long, default_value = "200")]
    chunk_overlap: usize,

    /// Number of chunks retrieved per question
    #[arg(long, default_value = "4")]
    top_k: usize,

    /// Rank by inner product instead of cosine similarity
    #[arg(long, default_value_t = false)]
    inner_product: bool,

    /// Chunks sent per embedding request
    #[arg(long, default_value = "64")]
    embedding_batch: usize,
}

#[derive(Args)]
struct Sources {
    /// PDF files, in upload order
    #[arg(long = "pdf")]
    pdfs: Vec<PathBuf>,

    /// Folder searched recursively for PDFs, appended after --pdf files
    #[arg(long)]
    folder: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Index the documents, then answer questions read from stdin.
    Chat {
        #[command(flatten)]
        sources: Sources,
    },
    /// Index the documents and answer a single question.
    Ask {
        #[command(flatten)]
        sources: Sources,
        /// Question about the documents
        #[arg(long)]
        question: String,
    },
    /// Index the documents and print the chunks retrieved for a query.
    Search {
        #[command(flatten)]
        sources: Sources,
        /// Search query
        #[arg(long)]
        query: String,
    },
    /// Extract and chunk the documents without calling any provider.
    Chunks {
        #[command(flatten)]
        sources: Sources,
    },
}

impl Sources {
    fn paths(&self) -> Vec<PathBuf> {
        let mut paths = self.pdfs.clone();
        if let Some(folder) = &self.folder {
            paths.extend(discover_pdf_files(folder));
        }
        paths
    }

    fn load(&self) -> anyhow::Result<Vec<RawDocument>> {
        load_paths(&self.paths())
    }
}

fn load_paths(paths: &[PathBuf]) -> anyhow::Result<Vec<RawDocument>> {
    load_documents(paths).context("failed to read documents")
}

impl Cli {
    fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            chat_model: self.chat_model.clone(),
            embedding_model: self.embedding_model.clone(),
            temperature: self.temperature,
            request_timeout: Duration::from_secs(self.timeout_secs),
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                ..RetryPolicy::default()
            },
            ..ProviderConfig::default()
        }
    }

    fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            chunk_max_chars: self.pipeline.chunk_size,
            chunk_overlap_chars: self.pipeline.chunk_overlap,
            embedding_batch_size: self.pipeline.embedding_batch,
            retrieval: RetrievalOptions {
                top_k: self.pipeline.top_k,
                metric: if self.pipeline.inner_product {
                    SimilarityMetric::InnerProduct
                } else {
                    SimilarityMetric::Cosine
                },
            },
            ..PipelineOptions::default()
        }
    }
}

/// Selects the embedding backend at runtime.
enum AnyEmbedder {
    Remote(OpenAiEmbedder),
    Local(CharacterNgramEmbedder),
}

#[async_trait::async_trait]
impl Embedder for AnyEmbedder {
    fn name(&self) -> &'static str {
        match self {
            Self::Remote(inner) => inner.name(),
            Self::Local(inner) => inner.name(),
        }
    }

    async fn embed_batch(
        &self,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        match self {
            Self::Remote(inner) => inner.embed_batch(texts).await,
            Self::Local(inner) => inner.embed_batch(texts).await,
        }
    }
}

/// Chat backend, absent for commands that never ask the model.
enum AnyChatModel {
    Remote(OpenAiChatModel),
    Disabled,
}

#[async_trait::async_trait]
impl ChatModel for AnyChatModel {
    fn name(&self) -> &'static str {
        match self {
            Self::Remote(inner) => inner.name(),
            Self::Disabled => "disabled",
        }
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        match self {
            Self::Remote(inner) => inner.complete(messages).await,
            Self::Disabled => Err(ProviderError::Config(
                "no chat model configured for this command".to_string(),
            )),
        }
    }
}

type Coordinator = ChatCoordinator<LopdfExtractor, AnyEmbedder, AnyChatModel>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "pdf-chat boot"
    );

    match &cli.command {
        Command::Chunks { sources } => {
            let documents = sources.load()?;
            let text = extract_text(&LopdfExtractor, &documents)?;
            let config = ChunkingConfig::from(&cli.pipeline_options());
            let chunks = split_text(&text, &config)?;

            println!(
                "{} document(s), {} characters, {} chunk(s)",
                documents.len(),
                text.chars().count(),
                chunks.len()
            );
            for chunk in &chunks {
                println!(
                    "[{}] chars={} overlap={} id={}",
                    chunk.chunk_index,
                    chunk.char_len(),
                    chunk.overlap_chars,
                    &chunk.chunk_id[..12]
                );
            }
        }
        Command::Search { sources, query } => {
            let coordinator = coordinator(&cli, false)?;
            let mut session = ChatSession::new();
            build(&coordinator, &mut session, &sources.load()?).await?;

            let hits = coordinator
                .search(&session, query)
                .await?
                .unwrap_or_default();
            println!("query: {query}");
            for hit in hits {
                println!("[chunk {}] score={:.4}", hit.chunk.chunk_index, hit.score);
                println!("{}\n", hit.chunk.text);
            }
        }
        Command::Ask { sources, question } => {
            let coordinator = coordinator(&cli, true)?;
            let mut session = ChatSession::new();
            build(&coordinator, &mut session, &sources.load()?).await?;

            if let Some(turns) = coordinator.ask(&mut session, question).await? {
                render(turns);
            }
        }
        Command::Chat { sources } => {
            let coordinator = coordinator(&cli, true)?;
            let mut session = ChatSession::new();
            let paths = sources.paths();
            if !paths.is_empty() {
                if let Err(error) = rebuild(&coordinator, &mut session, &paths).await {
                    eprintln!("build failed: {error:#}");
                }
            }
            repl(&coordinator, &mut session).await?;
        }
    }

    Ok(())
}

/// Provider credentials are only checked for the backends the command uses.
fn coordinator(cli: &Cli, with_chat: bool) -> anyhow::Result<Coordinator> {
    let provider = cli.provider_config();
    let embedder = if cli.local_embeddings {
        AnyEmbedder::Local(CharacterNgramEmbedder::default())
    } else {
        AnyEmbedder::Remote(OpenAiEmbedder::new(provider.clone())?)
    };
    let model = if with_chat {
        AnyChatModel::Remote(OpenAiChatModel::new(provider)?)
    } else {
        AnyChatModel::Disabled
    };

    Ok(ChatCoordinator::new(
        LopdfExtractor,
        embedder,
        model,
        cli.pipeline_options(),
    ))
}

async fn build(
    coordinator: &Coordinator,
    session: &mut ChatSession,
    documents: &[RawDocument],
) -> anyhow::Result<()> {
    eprintln!("building index over {} document(s)...", documents.len());
    let report = coordinator.build(session, documents).await?;
    eprintln!(
        "ready: {} chunk(s) from {} characters at {}",
        report.chunks,
        report.extracted_chars,
        report.built_at.to_rfc3339()
    );
    Ok(())
}

async fn rebuild(
    coordinator: &Coordinator,
    session: &mut ChatSession,
    paths: &[PathBuf],
) -> anyhow::Result<()> {
    let documents = load_paths(paths)?;
    build(coordinator, session, &documents).await
}

async fn repl(coordinator: &Coordinator, session: &mut ChatSession) -> anyhow::Result<()> {
    eprintln!("ask a question, or use :build <pdf>..., :history, :quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix(':') {
            let mut parts = command.split_whitespace();
            match parts.next() {
                Some("quit") | Some("q") => break,
                Some("history") => render(session.turns()),
                Some("build") => {
                    let paths: Vec<PathBuf> = parts.map(PathBuf::from).collect();
                    if let Err(error) = rebuild(coordinator, session, &paths).await {
                        eprintln!("build failed: {error:#}");
                    }
                }
                _ => eprintln!("unknown command: {line}"),
            }
            continue;
        }

        match coordinator.ask(session, line).await {
            Ok(Some(turns)) => render(turns),
            Ok(None) => eprintln!("no documents indexed yet; use :build <pdf>..."),
            Err(error) => {
                warn!(%error, "question failed");
                eprintln!("could not answer: {error}");
            }
        }
    }

    Ok(())
}

fn render(turns: &[ChatMessage]) {
    for turn in turns {
        let label = match turn.role {
            Role::User => "you",
            Role::Assistant => "bot",
            Role::System => "system",
        };
        println!("{label}> {}", turn.content);
    }
    println!();
}
