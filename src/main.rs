use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use mechanic_rag::api::{self, ApiContext};
use mechanic_rag::config::{Config, Credentials, IndexBackend};
use mechanic_rag::db::Db;
use mechanic_rag::embedder::Embedder;
use mechanic_rag::embedder::openai::OpenAiEmbedder;
use mechanic_rag::index::local::LocalStore;
use mechanic_rag::index::pinecone::PineconeStore;
use mechanic_rag::index::{ManualIndex, VectorStore};
use mechanic_rag::ingest::{self, Ingestor};
use mechanic_rag::llm::LanguageModel;
use mechanic_rag::llm::openai::OpenAiChat;
use mechanic_rag::pipeline::{Pipeline, PromptSet};
use mechanic_rag::tools::{ManualQaTool, ManualSqlTool, PartsSearchTool, ToolBox};

#[derive(Parser)]
#[command(name = "mechanic-rag", version, about)]
struct Cli {
    /// JSON configuration file
    #[arg(
        long,
        short,
        global = true,
        default_value = "config.json",
        env = "MECHANIC_RAG_CONFIG"
    )]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve POST /api/query and the web UI
    Serve {
        /// Address to listen on (overrides `bind`)
        #[arg(long)]
        bind: Option<String>,
        /// Directory with the built UI (overrides `static_dir`)
        #[arg(long)]
        static_dir: Option<String>,
    },
    /// Chunk, embed and upsert the repair manuals
    Ingest {
        /// Manuals directory (overrides `manuals_dir`)
        #[arg(long)]
        manuals_dir: Option<String>,
        /// Stop after writing the chunk cache
        #[arg(long)]
        chunk_only: bool,
    },
    /// Load the manual manifest CSV into the database
    SetupDb {
        #[arg(default_value = "charm_manifest.csv")]
        csv: PathBuf,
    },
    /// Ask from the terminal; reads one query per line when QUERY is omitted
    Ask {
        query: Option<String>,
        /// Print every stage's output
        #[arg(long, short)]
        verbose: bool,
    },
    /// Invoke a single tool by name
    Tool { name: String, input: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    config.validate()?;

    match cli.command {
        Command::Serve { bind, static_dir } => {
            let creds = Credentials::from_env(config.index.backend)?;
            let pipeline = Arc::new(build_pipeline(&config, &creds)?);
            let bind = bind.unwrap_or_else(|| config.bind.clone());
            let static_dir = PathBuf::from(static_dir.unwrap_or_else(|| config.static_dir.clone()));

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?;
            runtime.block_on(api::serve(
                ApiContext::new(pipeline.clone()),
                &bind,
                &static_dir,
            ))?;
            // The pipeline owns blocking HTTP clients; drop it outside the runtime
            drop(runtime);
            drop(pipeline);
        }
        Command::Ingest {
            manuals_dir,
            chunk_only,
        } => {
            let dir = PathBuf::from(manuals_dir.unwrap_or_else(|| config.manuals_dir.clone()));
            if chunk_only {
                let set = ingest::prepare_chunks(&dir, &config.ingest)?;
                println!(
                    "{} chunks from {} documents ({} failed){}",
                    set.chunks.len(),
                    set.documents,
                    set.failed_documents,
                    if set.from_cache { ", from cache" } else { "" }
                );
                return Ok(());
            }

            let creds = Credentials::from_env(config.index.backend)?;
            let embedder = build_embedder(&config, &creds)?;
            let store = build_store(&config, &creds, true)?;
            let report = Ingestor::new(embedder.as_ref(), store.as_ref(), &config.ingest)
                .with_progress(true)
                .run(&dir)?;
            println!(
                "Done: {} documents ({} failed), {} chunks, {} upserted, {} already processed, {} total in checkpoint",
                report.documents,
                report.failed_documents,
                report.chunks,
                report.upserted,
                report.skipped,
                report.processed_total
            );
        }
        Command::SetupDb { csv } => {
            let file = fs::File::open(&csv)
                .with_context(|| format!("failed to open manifest CSV: {}", csv.display()))?;
            let mut db = open_db(&config)?;
            let import = db
                .load_manifest_csv(file)
                .context("failed to load manifest")?;
            println!(
                "Inserted {} rows into manifest ({} skipped)",
                import.inserted, import.skipped
            );
        }
        Command::Ask { query, verbose } => {
            let creds = Credentials::from_env(config.index.backend)?;
            let pipeline = build_pipeline(&config, &creds)?;
            match query {
                Some(q) => ask(&pipeline, &q, verbose),
                None => {
                    let stdin = io::stdin();
                    prompt()?;
                    for line in stdin.lock().lines() {
                        let line = line.context("failed to read stdin")?;
                        if !line.trim().is_empty() {
                            ask(&pipeline, &line, verbose);
                        }
                        prompt()?;
                    }
                }
            }
        }
        Command::Tool { name, input } => {
            let tools = build_toolbox(&config, &name)?;
            if tools.get(&name).is_none() {
                eprintln!("Available tools:");
                for (tool, description) in tools.describe() {
                    eprintln!("  {tool:<14} {description}");
                }
            }
            println!("{}", tools.call(&name, &input)?);
        }
    }

    Ok(())
}

fn prompt() -> Result<()> {
    print!("> ");
    io::stdout().flush().context("failed to flush stdout")
}

/// Runs one query and prints the result JSON or an `Error:` line.
fn ask(pipeline: &Pipeline, query: &str, verbose: bool) {
    let outcome = if verbose {
        pipeline.run_stages(query).and_then(|transcript| {
            for stage in &transcript {
                println!("── {} ──\n{}\n", stage.stage, stage.output);
            }
            Pipeline::result_from(&transcript)
        })
    } else {
        pipeline.run(query)
    };

    match outcome.map(|r| serde_json::to_string_pretty(&r)) {
        Ok(Ok(json)) => println!("{json}"),
        Ok(Err(e)) => println!("Error: {e}"),
        Err(e) => println!("Error: {e}"),
    }
}

// ── Service construction ─────────────────────────────────────────────

fn open_db(config: &Config) -> Result<Db> {
    let path = Path::new(&config.db_path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Db::open(path, config.model.dimensions).context("failed to open database")
}

fn build_embedder(config: &Config, creds: &Credentials) -> Result<Arc<dyn Embedder>> {
    let embedder = OpenAiEmbedder::new(
        &creds.openai_api_key,
        &config.model.base_url,
        &config.model.embedding_model,
        config.model.dimensions,
        config.model.request_timeout(),
    )?;
    Ok(Arc::new(embedder))
}

fn build_llm(config: &Config, creds: &Credentials) -> Result<Arc<dyn LanguageModel>> {
    let llm = OpenAiChat::new(
        &creds.openai_api_key,
        &config.model.base_url,
        &config.model.chat_model,
        config.model.request_timeout(),
    )?;
    Ok(Arc::new(llm))
}

fn build_store(
    config: &Config,
    creds: &Credentials,
    create_if_missing: bool,
) -> Result<Arc<dyn VectorStore>> {
    match config.index.backend {
        IndexBackend::Local => {
            let store = LocalStore::new(open_db(config)?);
            if !create_if_missing && store.is_empty()? {
                warn!("Local index at {} is empty; run `mechanic-rag ingest` first", config.db_path);
            }
            Ok(Arc::new(store))
        }
        IndexBackend::Pinecone => {
            let pinecone = creds
                .pinecone
                .as_ref()
                .context("Pinecone credentials are not configured")?;
            let store = PineconeStore::connect(
                pinecone,
                &config.index,
                config.model.dimensions,
                create_if_missing,
                config.model.request_timeout(),
            )?;
            info!("Using Pinecone index at {}", store.host());
            Ok(Arc::new(store))
        }
    }
}

fn load_prompts(config: &Config) -> Result<PromptSet> {
    match &config.pipeline.prompts_path {
        Some(path) => PromptSet::load(Path::new(path)),
        None => Ok(PromptSet::default()),
    }
}

fn build_manual_qa(
    config: &Config,
    creds: &Credentials,
    llm: Arc<dyn LanguageModel>,
    prompts: &PromptSet,
) -> Result<ManualQaTool> {
    let index = Arc::new(ManualIndex::new(
        build_embedder(config, creds)?,
        build_store(config, creds, false)?,
    ));
    Ok(ManualQaTool::new(index, llm, config.index.top_k)
        .with_temperature(config.model.temperature)
        .with_template(prompts.manual_qa.clone()))
}

fn open_manual_sql(config: &Config) -> Result<ManualSqlTool> {
    let db = Db::open_read_only(&config.db_path)
        .with_context(|| format!("failed to open {} read-only", config.db_path))?;
    Ok(ManualSqlTool::new(db))
}

fn build_pipeline(config: &Config, creds: &Credentials) -> Result<Pipeline> {
    let prompts = load_prompts(config)?;
    let llm = build_llm(config, creds)?;
    let manual_qa = Arc::new(build_manual_qa(config, creds, llm.clone(), &prompts)?);

    let mut pipeline = Pipeline::new(llm, manual_qa)
        .with_prompts(prompts)
        .with_temperature(config.model.temperature);
    if config.pipeline.sql_lookup {
        pipeline = pipeline.with_sql_lookup(Arc::new(open_manual_sql(config)?));
    }
    Ok(pipeline)
}

/// Tools for the `tool` command; only `manual_qa` needs credentials.
///
/// For an unknown name every tool that can be built here is registered, so the
/// caller can list them.
fn build_toolbox(config: &Config, requested: &str) -> Result<ToolBox> {
    let mut tools = ToolBox::new();
    tools.register(Arc::new(PartsSearchTool));
    match requested {
        "parts_search" => {}
        "manual_sql" => {
            tools.register(Arc::new(open_manual_sql(config)?));
        }
        "manual_qa" => {
            tools.register(Arc::new(manual_qa_from_env(config)?));
        }
        _ => {
            match open_manual_sql(config) {
                Ok(sql) => {
                    tools.register(Arc::new(sql));
                }
                Err(e) => debug!("manual_sql unavailable: {e:#}"),
            }
            match manual_qa_from_env(config) {
                Ok(qa) => {
                    tools.register(Arc::new(qa));
                }
                Err(e) => debug!("manual_qa unavailable: {e:#}"),
            }
        }
    }
    Ok(tools)
}

fn manual_qa_from_env(config: &Config) -> Result<ManualQaTool> {
    let creds = Credentials::from_env(config.index.backend)?;
    let prompts = load_prompts(config)?;
    let llm = build_llm(config, &creds)?;
    build_manual_qa(config, &creds, llm, &prompts)
}
