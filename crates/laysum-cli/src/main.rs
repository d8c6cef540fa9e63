mod display;
mod repl;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use laysum_core::{Annotation, AnnotationSession, SessionConfig, render};
use laysum_store::{
    AdminStore, AnnotationStore, DuckStore, MemoryStore, annotations_to_batch, load_documents,
};
use laysum_sync::HttpStore;

const DEFAULT_FILTER: &str = "laysum=info";

#[derive(Parser, Debug)]
#[command(
    name = "laysum",
    version,
    about = "Rate lay summaries and label the errors in them"
)]
struct Cli {
    /// DuckDB database file
    #[arg(long, global = true, env = "LAYSUM_DB")]
    db: Option<PathBuf>,

    /// Base URL of a remote annotation service
    #[arg(long, global = true, env = "LAYSUM_REMOTE", conflicts_with = "db")]
    remote: Option<String>,

    /// Bearer token for the remote service
    #[arg(long, global = true, env = "LAYSUM_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// JSON file of `{id, text, summary}` documents
    #[arg(long, global = true, env = "LAYSUM_DOCUMENTS")]
    documents: Option<PathBuf>,

    /// Annotating user
    #[arg(long, global = true, env = "LAYSUM_USER", default_value = "local")]
    user: String,

    /// Session settings as JSON
    #[arg(long, global = true, env = "LAYSUM_CONFIG")]
    config: Option<PathBuf>,

    /// Save after every change instead of only on submit
    #[arg(long, global = true)]
    autosave: bool,

    /// Draw highlights with brackets instead of colours
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Annotate your assigned summaries interactively
    Annotate,
    /// Print one summary with its saved ratings and labels
    Render {
        /// Summary id
        id: String,
    },
    /// User settings and annotation export
    #[command(subcommand)]
    Admin(AdminCommand),
}

#[derive(Subcommand, Debug)]
enum AdminCommand {
    /// List users and their summary windows
    Users,
    /// Set how many days of completed work a user keeps seeing
    SetWindow {
        user: String,
        #[arg(allow_negative_numbers = true)]
        days: i32,
    },
    /// Show saved annotations as a table
    Annotations {
        /// Whose annotations (admins only; defaults to --user)
        #[arg(long)]
        of: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Import the --documents file into --db and assign it to --user
    Import,
}

enum Backend {
    Remote(HttpStore),
    Database(DuckStore),
    Memory(MemoryStore),
}

impl Backend {
    fn open(cli: &Cli, config: &SessionConfig) -> Result<Self> {
        if let Some(url) = &cli.remote {
            info!(url = %url, "using remote annotation service");
            return Ok(Self::Remote(HttpStore::new(url.as_str(), cli.token.clone())));
        }
        if let Some(path) = &cli.db {
            let store = DuckStore::open_persistent(path)
                .with_context(|| format!("opening database {}", path.display()))?
                .with_default_window(config.default_window_days);
            return Ok(Self::Database(store));
        }
        if let Some(path) = &cli.documents {
            let documents = read_documents(path)?;
            let store = MemoryStore::seeded(&cli.user, documents, Utc::now())?
                .with_default_window(config.default_window_days);
            info!("annotations are kept in memory only; pass --db to keep them");
            return Ok(Self::Memory(store));
        }
        bail!("no data source: pass --remote, --db or --documents")
    }

    fn store(&self) -> &dyn AnnotationStore {
        match self {
            Self::Remote(s) => s,
            Self::Database(s) => s,
            Self::Memory(s) => s,
        }
    }

    fn admin(&self) -> &dyn AdminStore {
        match self {
            Self::Remote(s) => s,
            Self::Database(s) => s,
            Self::Memory(s) => s,
        }
    }
}

fn read_documents(path: &Path) -> Result<Vec<laysum_core::DocumentItem>> {
    load_documents(path).with_context(|| format!("reading documents from {}", path.display()))
}

fn load_config(cli: &Cli) -> Result<SessionConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            SessionConfig::from_json(&json)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => SessionConfig::default(),
    };
    config.autosave |= cli.autosave;
    debug!(?config, "session config");
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();
    debug!("laysum v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;
    let backend = Backend::open(&cli, &config)?;
    let color = !cli.no_color && std::io::stdout().is_terminal();

    match &cli.command {
        Commands::Annotate => annotate(&cli, &backend, config, color).await,
        Commands::Render { id } => render_one(&cli, &backend, id, color).await,
        Commands::Admin(command) => admin(&cli, &backend, command).await,
    }
}

async fn annotate(cli: &Cli, backend: &Backend, config: SessionConfig, color: bool) -> Result<()> {
    let documents = backend
        .store()
        .assigned_documents(&cli.user)
        .await
        .context("loading assigned summaries")?;
    if documents.is_empty() {
        println!("No summaries are assigned to {}.", cli.user);
        return Ok(());
    }
    let session = AnnotationSession::new(documents, config);
    repl::Repl::new(backend.store(), &cli.user, session, color)
        .run()
        .await
}

async fn render_one(cli: &Cli, backend: &Backend, id: &str, color: bool) -> Result<()> {
    let documents = backend
        .store()
        .assigned_documents(&cli.user)
        .await
        .context("loading assigned summaries")?;
    let index = documents
        .iter()
        .position(|d| d.id == id)
        .with_context(|| format!("summary {id} is not assigned to {}", cli.user))?;
    let item = &documents[index];

    let mut annotation = Annotation::new();
    if let Some(record) = backend.store().load_annotation(&cli.user, id).await? {
        annotation.restore(record);
    }
    let document = item.document();
    let segments = render(&document, &annotation.labels, None);
    print!(
        "{}",
        display::format_card(
            index,
            documents.len(),
            item,
            &annotation,
            &document,
            &segments,
            color,
        )
    );
    Ok(())
}

async fn admin(cli: &Cli, backend: &Backend, command: &AdminCommand) -> Result<()> {
    match command {
        AdminCommand::Users => {
            let users = backend.admin().list_users().await?;
            println!("{:<20} {:<24} {:<32} {:>6}  admin", "id", "name", "email", "window");
            for user in users {
                println!(
                    "{:<20} {:<24} {:<32} {:>6}  {}",
                    user.id,
                    user.name,
                    user.email.as_deref().unwrap_or("-"),
                    user.summary_window_days,
                    if user.is_admin { "yes" } else { "" }
                );
            }
        }
        AdminCommand::SetWindow { user, days } => {
            backend.admin().set_summary_window(user, *days).await?;
            println!("Summary window for {user} set to {days} days.");
        }
        AdminCommand::Annotations { of, json } => {
            let records = backend
                .admin()
                .annotations_for_user(&cli.user, of.as_deref())
                .await?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                let batch = annotations_to_batch(&records)?;
                println!("{}", arrow::util::pretty::pretty_format_batches(&[batch])?);
            }
        }
        AdminCommand::Import => {
            let Backend::Database(store) = backend else {
                bail!("import needs a --db database");
            };
            let path = cli
                .documents
                .as_deref()
                .context("import needs --documents")?;
            let documents = read_documents(path)?;
            let count = store.import_documents(&documents)?;
            let now = Utc::now();
            for document in &documents {
                store.assign(&cli.user, &document.id, now)?;
            }
            println!("Imported {count} summaries and assigned them to {}.", cli.user);
        }
    }
    Ok(())
}
