//! ragbot CLI - Chat with your documents from the command line.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use ragbot_agent::{Agent, Answer};
use ragbot_core::{AppConfig, RagError, Result, SourceFilter};

/// ragbot - Retrieval-augmented chat over a pluggable vector store
#[derive(Parser)]
#[command(name = "ragbot")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Namespace to use instead of the configured default
    #[arg(short, long, global = true)]
    namespace: Option<String>,

    /// Do not reset the namespace when an interactive session starts
    #[arg(long, global = true)]
    keep_data: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split, embed and store a file or directory
    Ingest {
        /// File or directory to ingest
        path: PathBuf,

        /// Source tag (defaults to the file name)
        #[arg(short, long)]
        source: Option<String>,

        /// Recursively process directories
        #[arg(short, long)]
        recursive: bool,
    },

    /// Answer a question from stored documents
    Ask {
        /// Question
        query: String,

        /// Restrict references to these sources (repeatable)
        #[arg(short, long = "source")]
        sources: Vec<String>,

        /// Number of references to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Print the answer and references as JSON
        #[arg(long)]
        json: bool,
    },

    /// Chat with the model without retrieval
    Chat {
        /// Single message (interactive when omitted)
        message: Option<String>,
    },

    /// Interactive session with ingest, ask and namespace commands
    Session,

    /// Drop every record in the namespace
    Reset,

    /// Remove every record with the given source
    Delete {
        /// Source tag
        source: String,
    },

    /// Show backend and namespace status
    Status,
}

impl Commands {
    fn is_interactive(&self) -> bool {
        matches!(self, Commands::Session | Commands::Chat { message: None })
    }
}

/// A line typed into `ragbot session`.
#[derive(Debug, PartialEq)]
enum SessionCommand {
    Ingest { path: PathBuf, source: Option<String> },
    Ask(String),
    Table(String),
    Reset,
    Delete(String),
    Status,
    Help,
    Quit,
    Chat(String),
    Empty,
}

fn parse_command(line: &str) -> std::result::Result<SessionCommand, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(SessionCommand::Empty);
    }

    let Some(rest) = line.strip_prefix(':') else {
        return Ok(SessionCommand::Chat(line.to_string()));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    let require = |what: &str| {
        if arg.is_empty() {
            Err(format!(":{} needs {}", name, what))
        } else {
            Ok(arg.to_string())
        }
    };

    match name {
        "ingest" => {
            let arg = require("a path")?;
            let mut parts = arg.splitn(2, char::is_whitespace);
            let path = PathBuf::from(parts.next().unwrap_or_default());
            let source = parts.next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
            Ok(SessionCommand::Ingest { path, source })
        }
        "ask" => Ok(SessionCommand::Ask(require("a question")?)),
        "table" => Ok(SessionCommand::Table(require("a namespace")?)),
        "reset" => Ok(SessionCommand::Reset),
        "delete" => Ok(SessionCommand::Delete(require("a source")?)),
        "status" => Ok(SessionCommand::Status),
        "help" => Ok(SessionCommand::Help),
        "quit" | "exit" | "q" => Ok(SessionCommand::Quit),
        other => Err(format!("unknown command :{} (try :help)", other)),
    }
}

const SESSION_HELP: &str = "\
Commands:
  :ingest <path> [source]  split, embed and store a file
  :ask <question>          answer from stored documents
  :table <name>            switch namespace (default_table_name for the default)
  :reset                   drop every record in the namespace
  :delete <source>         remove records with this source
  :status                  show backend status
  :quit                    leave the session
Anything else is sent to the chat model.";

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::load_default()?,
    };

    if let Some(namespace) = &cli.namespace {
        config.store.default_namespace = namespace.clone();
    }

    // One-shot commands operate on existing data; only interactive
    // sessions honour reset_on_start.
    config.store.reset_on_start =
        config.store.reset_on_start && !cli.keep_data && cli.command.is_interactive();

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error [{}]: {}", e.error_code(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let mut agent = Agent::from_config(&config).await?;

    match cli.command {
        Commands::Ingest {
            path,
            source,
            recursive,
        } => ingest(&mut agent, &path, source.as_deref(), recursive).await,
        Commands::Ask {
            query,
            sources,
            top_k,
            json,
        } => {
            let filter = SourceFilter::from_sources(sources);
            let answer = agent.ask(&query, &filter, top_k).await?;
            print_answer(&answer, json)
        }
        Commands::Chat { message: Some(message) } => {
            let answer = agent.chat(&message).await?;
            println!("{}", answer.text);
            Ok(())
        }
        Commands::Chat { message: None } => chat_loop(&mut agent).await,
        Commands::Session => session(&mut agent).await,
        Commands::Reset => {
            agent.reset_table().await?;
            println!("Reset namespace '{}'", agent.store().namespace());
            Ok(())
        }
        Commands::Delete { source } => {
            let deleted = agent.delete_by_source(&source).await?;
            println!("Deleted {} record(s) with source '{}'", deleted, source);
            Ok(())
        }
        Commands::Status => status(&agent).await,
    }
}

async fn ingest(agent: &mut Agent, path: &Path, source: Option<&str>, recursive: bool) -> Result<()> {
    let files = collect_files(path, recursive)?;

    if files.is_empty() {
        println!("No supported files found at: {}", path.display());
        return Ok(());
    }

    println!(
        "Ingesting {} file(s) into namespace '{}'...",
        files.len(),
        agent.store().namespace()
    );

    let mut total = 0;
    for file_path in files {
        let content = fs::read_to_string(&file_path)?;
        let tag = match source {
            Some(s) => s.to_string(),
            None => file_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };

        let chunks = agent.ingest(&content, &tag).await?;
        println!("  {} - {} chunk(s) as '{}'", file_path.display(), chunks, tag);
        total += chunks;
    }

    println!("\nComplete: {} chunk(s) stored", total);
    Ok(())
}

fn collect_files(path: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if path.is_file() {
        files.push(path.to_path_buf());
    } else if path.is_dir() {
        for entry in fs::read_dir(path)? {
            let entry_path = entry?.path();

            if entry_path.is_file() && is_text_file(&entry_path) {
                files.push(entry_path);
            } else if entry_path.is_dir() && recursive {
                files.extend(collect_files(&entry_path, recursive)?);
            }
        }
        files.sort();
    } else {
        return Err(RagError::invalid_argument(format!(
            "{} is neither a file nor a directory",
            path.display()
        )));
    }

    Ok(files)
}

fn is_text_file(path: &Path) -> bool {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    matches!(
        ext,
        "txt" | "md" | "markdown" | "rst" | "html" | "htm" | "csv" | "json" | "yaml" | "yml" | "toml"
    )
}

fn print_answer(answer: &Answer, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(answer)?);
        return Ok(());
    }

    println!("{}", answer.text);
    if !answer.references.is_empty() {
        println!("\nReferences:");
        for (i, hit) in answer.references.iter().enumerate() {
            let preview: String = hit.content.chars().take(80).collect();
            println!("  [{}] {:.3} {} - {}", i + 1, hit.score, hit.source, preview);
        }
    }
    Ok(())
}

async fn status(agent: &Agent) -> Result<()> {
    let store = agent.store();
    let caps = store.capabilities();

    println!("Backend:        {}", store.kind());
    println!("Namespace:      {}", store.namespace());
    match store.dimension() {
        Some(d) => println!("Dimension:      {}", d),
        None => println!("Dimension:      (empty)"),
    }
    println!("Index:          {}", agent.index_status().await?);
    println!(
        "Capabilities:   delete_by_source={} exact_search={} synchronous_writes={}",
        caps.delete_by_source, caps.exact_search, caps.synchronous_writes
    );
    Ok(())
}

fn prompt(label: &str) {
    print!("{}> ", label);
    std::io::stdout().flush().ok();
}

async fn chat_loop(agent: &mut Agent) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt("you");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, ":quit" | ":exit" | ":q") {
            break;
        }

        let answer = agent.chat(line).await?;
        println!("{}\n", answer.text);
    }

    Ok(())
}

async fn session(agent: &mut Agent) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{}\n", SESSION_HELP);

    loop {
        prompt(agent.store().namespace());
        let Some(line) = lines.next_line().await? else {
            break;
        };

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(message) => {
                eprintln!("{}", message);
                continue;
            }
        };

        if command == SessionCommand::Quit {
            break;
        }

        // A failed turn is reported and the session continues.
        if let Err(e) = session_turn(agent, command).await {
            eprintln!("Error [{}]: {}", e.error_code(), e);
        }
    }

    Ok(())
}

async fn session_turn(agent: &mut Agent, command: SessionCommand) -> Result<()> {
    match command {
        SessionCommand::Ingest { path, source } => {
            ingest(agent, &path, source.as_deref(), false).await?;
        }
        SessionCommand::Ask(query) => {
            let answer = agent.ask(&query, &SourceFilter::all(), None).await?;
            print_answer(&answer, false)?;
        }
        SessionCommand::Table(name) => {
            agent.set_table(&name).await?;
            println!("Using namespace '{}'", agent.store().namespace());
        }
        SessionCommand::Reset => {
            agent.reset_table().await?;
            println!("Reset namespace '{}'", agent.store().namespace());
        }
        SessionCommand::Delete(source) => {
            let deleted = agent.delete_by_source(&source).await?;
            println!("Deleted {} record(s) with source '{}'", deleted, source);
        }
        SessionCommand::Status => status(agent).await?,
        SessionCommand::Help => println!("{}", SESSION_HELP),
        SessionCommand::Chat(text) => {
            let answer = agent.chat(&text).await?;
            println!("{}", answer.text);
        }
        SessionCommand::Quit | SessionCommand::Empty => {}
    }
    println!();
    Ok(())
}
