//! SealNotes maintenance CLI
//!
//! Inspects a data directory, runs the legacy layout migration, checks a
//! recovery key, imports backups and moves single notes in and out as
//! markdown. Secrets are read from stdin, one per line.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use sealnotes::app::{resolve_data_dir, App};
use sealnotes::services::Session;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zeroize::Zeroizing;

/// SealNotes - offline encrypted notes
#[derive(Parser)]
#[command(name = "sealnotes", version, about, long_about = None)]
struct Cli {
    /// Data directory (defaults to ~/.sealnotes)
    #[arg(long, global = true, env = "SEALNOTES_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the state of the data directory
    Status,

    /// Move notes into the sharded layout and rebuild list caches
    Migrate,

    /// Check a recovery key against this store
    VerifyKey,

    /// Import the notes of a backup archive made by another installation
    Import {
        /// Zip archive of the other data directory
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,
    },

    /// Write a note to a markdown file
    Export {
        /// Note id
        id: String,
        /// Output file
        #[arg(value_name = "FILE")]
        output: PathBuf,
    },

    /// Create a note from a markdown file
    ImportMarkdown {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Move notes to the trash
    Trash {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Put notes into a notebook, or take them out of any with no --notebook
    Move {
        #[arg(long)]
        notebook: Option<String>,
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sealnotes=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => resolve_data_dir().context("Failed to locate the data directory")?,
    };

    let app = App::open(data_dir)
        .await
        .context("Failed to open the data directory")?;

    let result = run(&app, cli.command.unwrap_or(Commands::Status)).await;
    app.close().await;
    result
}

async fn run(app: &App, command: Commands) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Status => {
            let initialized = !app.session().is_first_run().await?;
            let notes = app.repository().list_notes(false).await?.len();
            let trashed = app.repository().list_deleted_notes().await?.len();
            let settings = app.settings().get().await?;

            println!("Data directory: {}", app.data_dir().display());
            println!("Initialized:    {}", if initialized { "yes" } else { "no" });
            println!("Notes:          {} ({} in trash)", notes, trashed);
            println!(
                "Auto-lock:      {}",
                match settings.auto_lock_minutes {
                    0 => "disabled".to_string(),
                    m => format!("{} min", m),
                }
            );
            Ok(ExitCode::SUCCESS)
        }

        Commands::Migrate => {
            unlock(app.session()).await?;
            let report = app.notes().migrate_old_notes(app.session()).await?;
            println!("Migrated {} notes, skipped {}", report.migrated, report.skipped);
            Ok(ExitCode::SUCCESS)
        }

        Commands::VerifyKey => {
            let key = read_secret("Recovery key")?;
            if app.session().verify_data_key(&key).await? {
                println!("Recovery key is valid");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("Recovery key does not match this store");
                Ok(ExitCode::FAILURE)
            }
        }

        Commands::Import { archive } => {
            unlock(app.session()).await?;
            let key = read_secret("Recovery key of the backup")?;
            let report = app
                .notes()
                .import_from_backup(app.session(), &archive, &key)
                .await?;
            println!("Imported {} notes, skipped {}", report.imported, report.skipped);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Export { id, output } => {
            unlock(app.session()).await?;
            app.notes().export_markdown(app.session(), &id, &output).await?;
            println!("Exported {} to {}", id, output.display());
            Ok(ExitCode::SUCCESS)
        }

        Commands::ImportMarkdown { file } => {
            unlock(app.session()).await?;
            let note = app.notes().import_markdown(app.session(), &file).await?;
            println!("Created note {} ({})", note.id, note.title);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Trash { ids } => {
            unlock(app.session()).await?;
            app.notes().soft_delete_many(app.session(), &ids).await?;
            println!("Moved {} notes to trash", ids.len());
            Ok(ExitCode::SUCCESS)
        }

        Commands::Move { notebook, ids } => {
            unlock(app.session()).await?;
            app.notes()
                .set_notebook_many(app.session(), &ids, notebook.as_deref())
                .await?;
            println!("Moved {} notes", ids.len());
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn unlock(session: &Session) -> anyhow::Result<()> {
    if session.is_first_run().await? {
        bail!("No master password has been set up in this data directory");
    }

    let password = read_secret("Master password")?;
    if !session.unlock(&password).await? {
        bail!("Wrong password");
    }
    Ok(())
}

/// Read one line from stdin, prompting on stderr when interactive
fn read_secret(prompt: &str) -> anyhow::Result<Zeroizing<String>> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        eprint!("{}: ", prompt);
        io::stderr().flush()?;
    }

    let mut line = Zeroizing::new(String::new());
    stdin
        .lock()
        .read_line(&mut line)
        .context("Failed to read stdin")?;

    let trimmed = Zeroizing::new(line.trim_end_matches(['\r', '\n']).to_string());
    if trimmed.is_empty() {
        bail!("No {} provided on stdin", prompt.to_lowercase());
    }
    Ok(trimmed)
}
