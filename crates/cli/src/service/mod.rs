//! Service registry commands.

use crate::parse_service_key;
use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use tagbase_core::{ServiceKey, ServiceType};
use tagbase_store::{ServiceLookup, TagStoreHandle};

/// Service kinds a user can register. Combined services are built in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ServiceKind {
    /// Tags kept only on this machine
    LocalTag,
    /// Tags synchronized from a remote repository
    TagRepository,
    /// Files kept on this machine
    LocalFile,
    /// Files held by a remote repository
    FileRepository,
}

impl From<ServiceKind> for ServiceType {
    fn from(kind: ServiceKind) -> Self {
        match kind {
            ServiceKind::LocalTag => ServiceType::LocalTag,
            ServiceKind::TagRepository => ServiceType::TagRepository,
            ServiceKind::LocalFile => ServiceType::LocalFile,
            ServiceKind::FileRepository => ServiceType::FileRepository,
        }
    }
}

/// Service management commands.
#[derive(Subcommand)]
pub enum ServiceCommands {
    /// Register a new service
    Register {
        /// Kind of service
        #[arg(long = "type", value_enum)]
        kind: ServiceKind,
        /// Display name
        #[arg(long)]
        name: String,
        /// Service key (UUID); generated when omitted
        #[arg(long)]
        key: Option<String>,
    },
    /// List every service, combined ones included
    List,
    /// Remove a service and everything recorded under it
    Remove {
        /// Service key (UUID)
        key: String,
    },
}

pub async fn handle_service_command(command: ServiceCommands, handle: &TagStoreHandle) -> Result<()> {
    match command {
        ServiceCommands::Register { kind, name, key } => {
            let service_key = match key {
                Some(key) => ServiceKey::parse(&key).context("invalid service key")?,
                None => ServiceKey::new(),
            };
            let record = handle
                .register_service(service_key, kind.into(), name)
                .await
                .context("failed to register service")?;
            println!("Service registered");
            println!("\nKey: {}", record.service_key);
            println!("Type: {}", record.service_type);
            println!("Name: {}", record.name);
        }
        ServiceCommands::List => {
            let services = handle.list_services().await?;
            println!("{:<38} {:<16} {:<24} Created", "Key", "Type", "Name");
            println!("{}", "-".repeat(100));
            for service in services {
                println!(
                    "{:<38} {:<16} {:<24} {}",
                    service.service_key.to_string(),
                    service.service_type.as_str(),
                    service.name,
                    service.created_at
                );
            }
        }
        ServiceCommands::Remove { key } => {
            let service_key = parse_service_key(&key)?;
            handle
                .deregister_service(ServiceLookup::Key(service_key))
                .await
                .with_context(|| format!("failed to remove service {key}"))?;
            println!("Service removed: {service_key}");
        }
    }
    Ok(())
}
