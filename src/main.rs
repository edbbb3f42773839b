use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;

use booktrack::{AddOptions, BookTracker, Config, EnrichmentMode, NewBook};

#[derive(Parser, Debug)]
#[command(
    name = "booktrack",
    version,
    about = "Track purchased books and fill in their catalog metadata"
)]
struct Cli {
    /// TOML configuration file
    #[arg(long, env = "BOOKTRACK_CONFIG")]
    config: Option<PathBuf>,

    /// Database file (overrides the configuration)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Log every provider request
    #[arg(long, action = ArgAction::SetTrue)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Look up a title or ISBN
    Search { query: String },

    /// Add one book, enriched from the best search result unless --title-only
    Add {
        query: String,
        #[arg(long)]
        price: Option<f64>,
        #[arg(long, default_value = "")]
        notes: String,
        #[arg(long, action = ArgAction::SetTrue)]
        title_only: bool,
        /// Store even if the book is already in the catalog
        #[arg(long, action = ArgAction::SetTrue)]
        force: bool,
    },

    List,

    Delete { id: i64 },

    /// Bulk add titles from a text file, one per line
    Import {
        file: PathBuf,
        #[arg(long, action = ArgAction::SetTrue)]
        enriched: bool,
        #[arg(long, action = ArgAction::SetTrue)]
        batched: bool,
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Background enrichment of title-only books
    #[command(subcommand)]
    Update(UpdateCommand),
}

#[derive(Subcommand, Debug)]
enum UpdateCommand {
    /// Start a job over every title-only book
    Start {
        /// Print the final job status once the run has finished
        #[arg(long, action = ArgAction::SetTrue)]
        wait: bool,
    },
    Status { job_id: String },
    Logs {
        job_id: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Enrich a few books right away, within a time budget
    Now {
        #[arg(long, default_value_t = 10)]
        count: usize,
        #[arg(long, default_value_t = 25)]
        max_seconds: u64,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        log::error!("{}", err);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> booktrack::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database.path = db;
    }
    config.providers.debug |= cli.debug;
    let tracker = BookTracker::open(config)?;

    match cli.command {
        Command::Search { query } => print_json(&tracker.search(&query)?),
        Command::Add {
            query,
            price,
            notes,
            title_only,
            force,
        } => {
            let book = if title_only {
                NewBook::title_only(query.trim())
            } else {
                let found = tracker.resolve(&tracker.classify(&query));
                match found.first() {
                    Some(top) => NewBook::from_candidate(top),
                    None => {
                        log::warn!("no search result for \"{}\", storing title only", query);
                        NewBook::title_only(query.trim())
                    }
                }
            };
            let book = tracker.add_book(
                book.with_price(price).with_notes(notes),
                AddOptions {
                    allow_duplicate: force,
                },
            )?;
            print_json(&book)
        }
        Command::List => print_json(&tracker.list_books()?),
        Command::Delete { id } => {
            let title = tracker.delete_book(id)?;
            print_json(&serde_json::json!({ "deleted": id, "title": title }))
        }
        Command::Import {
            file,
            enriched,
            batched,
            batch_size,
        } => {
            let text = std::fs::read_to_string(&file)?;
            let titles: Vec<&str> = text.lines().collect();
            let mode = if enriched {
                EnrichmentMode::Enriched
            } else {
                EnrichmentMode::Safe
            };
            let result = if batched || batch_size.is_some() {
                tracker.ingest_batched(&titles, mode, batch_size)
            } else {
                tracker.ingest(&titles, mode)?
            };
            print_json(&result)
        }
        Command::Update(command) => run_update(&tracker, command),
    }
}

fn run_update(tracker: &BookTracker, command: UpdateCommand) -> booktrack::Result<()> {
    match command {
        UpdateCommand::Start { wait } => {
            let outcome = tracker.start_run()?;
            log::info!("{}", outcome.message());
            print_json(&outcome)?;
            // The worker dies with the process, so the CLI always joins it.
            if let booktrack::StartOutcome::Started { job_id, .. } = &outcome {
                tracker.wait_for_run(job_id);
                if wait {
                    print_json(&tracker.status(job_id)?)?;
                }
            }
            Ok(())
        }
        UpdateCommand::Status { job_id } => print_json(&tracker.status(&job_id)?),
        UpdateCommand::Logs { job_id, limit } => print_json(&tracker.logs(&job_id, limit)?),
        UpdateCommand::Now { count, max_seconds } => {
            print_json(&tracker.run_now(count, Duration::from_secs(max_seconds))?)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> booktrack::Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| booktrack::Error::Validation(err.to_string()))?;
    println!("{}", text);
    Ok(())
}
