//! Administrative CLI for a tagbase tag store.

mod service;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::io::Read;
use std::path::PathBuf;
use tagbase_core::config::AppConfig;
use tagbase_core::{ContentHash, ServiceKey, ServiceUpdates, Tag};
use tagbase_store::{AutocompleteRequest, TagStoreHandle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Alias accepted wherever a tag service key is expected.
const ALL_TAGS: &str = "all-tags";
/// Alias accepted wherever a file service key is expected.
const ALL_FILES: &str = "all-files";

#[derive(Parser)]
#[command(name = "tagbasectl")]
#[command(about = "Administrative CLI for a tagbase tag store")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct GlobalArgs {
    /// Configuration file (TOML). Optional; TAGBASE_* variables also apply
    #[arg(long, global = true, env = "TAGBASE_CONFIG")]
    config: Option<PathBuf>,

    /// Database path (overrides configuration)
    #[arg(long, global = true)]
    database: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Service registry commands
    Service {
        #[command(subcommand)]
        command: service::ServiceCommands,
    },
    /// Tag service precedence commands
    Precedence {
        #[command(subcommand)]
        command: PrecedenceCommands,
    },
    /// Apply a JSON batch of content updates
    Apply {
        /// Batch file, or `-` for stdin
        file: String,
    },
    /// Show the status of one mapping
    Status {
        /// Tag service key (or `all-tags`)
        #[arg(long)]
        service: String,
        /// Tag text, e.g. `series:metroid`
        #[arg(long)]
        tag: String,
        /// Content hash (hex)
        #[arg(long)]
        hash: String,
    },
    /// Search tags by partial text
    Autocomplete {
        /// Partial tag text; `*` is a wildcard
        text: String,
        /// Tag service key (or `all-tags`)
        #[arg(long, default_value = ALL_TAGS)]
        tag_service: String,
        /// File service key (or `all-files`)
        #[arg(long, default_value = ALL_FILES)]
        file_service: String,
        /// Leave CURRENT mappings out of the counts
        #[arg(long, default_value_t = false)]
        no_current: bool,
        /// Count PENDING mappings too
        #[arg(long, default_value_t = false)]
        pending: bool,
    },
    /// Count files tagged under a tag service
    Tagged {
        /// Tag service key (or `all-tags`)
        #[arg(long, default_value = ALL_TAGS)]
        tag_service: String,
        /// File service key (or `all-files`)
        #[arg(long, default_value = ALL_FILES)]
        file_service: String,
    },
    /// List outstanding petitions on a tag service
    Petitions {
        /// Tag service key
        service: String,
    },
    /// Rebuild derived data
    Rebuild {
        #[command(subcommand)]
        command: RebuildCommands,
    },
}

#[derive(Subcommand)]
enum PrecedenceCommands {
    /// Show real tag services, most trusted first
    Show,
    /// Replace the order; list every real tag service, most trusted first
    Set {
        #[arg(required = true, num_args = 1..)]
        keys: Vec<String>,
    },
}

#[derive(Subcommand)]
enum RebuildCommands {
    /// Rebuild the combined tag service from every real tag service
    Combined {
        /// File domain to rebuild (or `all-files`)
        #[arg(long, default_value = ALL_FILES)]
        file_service: String,
    },
    /// Drop and recompute the autocomplete cache
    Autocomplete,
}

/// Parse a service key or one of the combined service aliases.
pub(crate) fn parse_service_key(text: &str) -> Result<ServiceKey> {
    match text {
        ALL_TAGS => Ok(ServiceKey::combined_tags()),
        ALL_FILES => Ok(ServiceKey::combined_files()),
        _ => ServiceKey::parse(text).with_context(|| format!("invalid service key: {text}")),
    }
}

fn load_config(global: &GlobalArgs) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if let Some(path) = &global.config {
        if !path.exists() {
            anyhow::bail!("config file not found: {}", path.display());
        }
        figment = figment.merge(Toml::file(path));
    }

    let mut config: AppConfig = figment
        .merge(Env::prefixed("TAGBASE_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    if let Some(database) = &global.database {
        config.store.path = database.clone();
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli { global, command } = Cli::parse();
    let config = load_config(&global)?;

    // Logs go to stderr so command output stays parseable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    tracing::debug!(
        config_file = ?global.config,
        database = %config.store.path.display(),
        "configuration loaded"
    );

    let (handle, writer) = tagbase_store::from_config(&config.store)
        .await
        .with_context(|| format!("failed to open tag store at {}", config.store.path.display()))?;

    let result = run(command, &handle).await;

    // let queued work drain before exiting
    drop(handle);
    writer.await.context("writer task panicked")?;
    result
}

async fn run(command: Commands, handle: &TagStoreHandle) -> Result<()> {
    match command {
        Commands::Service { command } => service::handle_service_command(command, handle).await,
        Commands::Precedence { command } => handle_precedence_command(command, handle).await,
        Commands::Apply { file } => handle_apply_command(&file, handle).await,
        Commands::Status { service, tag, hash } => {
            handle_status_command(&service, &tag, &hash, handle).await
        }
        Commands::Autocomplete {
            text,
            tag_service,
            file_service,
            no_current,
            pending,
        } => {
            let request = AutocompleteRequest {
                tag_service_key: parse_service_key(&tag_service)?,
                file_service_key: parse_service_key(&file_service)?,
                partial_text: text,
                include_current: !no_current,
                include_pending: pending,
            };
            let matches = handle.get_autocomplete_matches(request).await?;
            if matches.is_empty() {
                println!("No matching tags.");
            }
            for m in matches {
                println!("{:>8}  {}", m.count, m.tag);
            }
            Ok(())
        }
        Commands::Tagged {
            tag_service,
            file_service,
        } => {
            let count = handle
                .count_tagged_hashes(
                    parse_service_key(&tag_service)?,
                    parse_service_key(&file_service)?,
                )
                .await?;
            println!("{count}");
            Ok(())
        }
        Commands::Petitions { service } => {
            let petitions = handle.get_petitions(parse_service_key(&service)?).await?;
            if petitions.is_empty() {
                println!("No petitions.");
                return Ok(());
            }
            println!("{:<66} {:<30} Reason", "Hash", "Tag");
            println!("{}", "-".repeat(120));
            for petition in petitions {
                println!(
                    "{:<66} {:<30} {}",
                    petition.hash.to_hex(),
                    petition.tag.to_string(),
                    petition.reason
                );
            }
            Ok(())
        }
        Commands::Rebuild { command } => match command {
            RebuildCommands::Combined { file_service } => {
                handle
                    .rebuild_combined_view(parse_service_key(&file_service)?)
                    .await?;
                println!("Combined view rebuilt");
                Ok(())
            }
            RebuildCommands::Autocomplete => {
                handle.rebuild_autocomplete_cache().await?;
                println!("Autocomplete cache rebuilt");
                Ok(())
            }
        },
    }
}

async fn handle_precedence_command(command: PrecedenceCommands, handle: &TagStoreHandle) -> Result<()> {
    match command {
        PrecedenceCommands::Show => {
            let keys = handle.get_tag_service_precedence().await?;
            if keys.is_empty() {
                println!("No tag services registered.");
            }
            for (rank, key) in keys.iter().enumerate() {
                println!("{:>3}  {key}", rank + 1);
            }
        }
        PrecedenceCommands::Set { keys } => {
            let keys = keys
                .iter()
                .map(|key| parse_service_key(key))
                .collect::<Result<Vec<_>>>()?;
            handle
                .set_tag_service_precedence(keys)
                .await
                .context("failed to set precedence")?;
            println!("Precedence updated");
        }
    }
    Ok(())
}

async fn handle_apply_command(file: &str, handle: &TagStoreHandle) -> Result<()> {
    let json = if file == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read batch from stdin")?;
        buf
    } else {
        tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("failed to read batch file: {file}"))?
    };
    let updates: ServiceUpdates = serde_json::from_str(&json).context("invalid batch JSON")?;

    let changes = handle
        .apply_content_updates(updates)
        .await
        .context("failed to apply batch")?;
    if changes.is_empty() {
        println!("No changes.");
    }
    for change in changes {
        println!(
            "{}: {} mappings, {} petitions, {} files changed",
            change.service_key, change.mappings_changed, change.petitions_changed, change.files_changed
        );
    }
    Ok(())
}

async fn handle_status_command(
    service: &str,
    tag: &str,
    hash: &str,
    handle: &TagStoreHandle,
) -> Result<()> {
    let service_key = parse_service_key(service)?;
    let tag = Tag::parse(tag).context("tag is blank")?;
    let hash = ContentHash::from_hex(hash).context("invalid hash")?;
    match handle.get_mapping_status(service_key, &tag, &hash).await? {
        Some(status) => println!("{status}"),
        None => println!("absent"),
    }
    Ok(())
}
