//! DocVault CLI - operator interface to a local vault.
//!
//! Drives the vault service over on-disk adapters rooted at `--data-dir`:
//! ciphertext blobs under `blobs/`, metadata in `metadata.sqlite`, the audit
//! trail in `audit.jsonl` and undelivered audit events in `audit-outbox.json`.
//! The master key comes from `DOCVAULT_MASTER_KEY`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use docvault_audit::{AuditLogger, FileOutbox, JsonLinesAuditSink};
use docvault_common::{Error, ObjectId};
use docvault_crypto::MasterKey;
use docvault_storage::{AccessLevel, LocalObjectStore, SqliteMetadataRepository};
use docvault_vault::{Intent, Principal, StoreRequest, VaultConfig, VaultService};

const BLOB_DIR: &str = "blobs";
const METADATA_DB: &str = "metadata.sqlite";
const AUDIT_LOG: &str = "audit.jsonl";
const AUDIT_OUTBOX: &str = "audit-outbox.json";

#[derive(Parser)]
#[command(name = "docvault")]
#[command(about = "DocVault - Encrypted document vault")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding blobs, metadata and the audit trail.
    #[arg(long, env = "DOCVAULT_DATA_DIR", default_value = "docvault-data", global = true)]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new master key and print it as base64.
    Keygen,

    /// Encrypt a file into the vault and print its object id.
    Store {
        /// File to store.
        #[arg(short, long)]
        file: PathBuf,

        /// Name to record (default: the file name).
        #[arg(short, long)]
        name: Option<String>,

        /// MIME type of the content.
        #[arg(short, long, default_value = "application/octet-stream")]
        mime: String,

        /// Owning user id; omit for an anonymous upload.
        #[arg(short, long)]
        owner: Option<String>,

        /// Access level: "private", "internal" or "admin".
        #[arg(short, long, default_value = "private")]
        access: AccessLevel,

        /// Lifetime in seconds (default: DOCVAULT_DEFAULT_TTL_SECS, if set).
        #[arg(short, long)]
        ttl: Option<i64>,

        /// Analysis this upload belongs to.
        #[arg(long)]
        analysis_id: Option<String>,
    },

    /// Decrypt an object to a file.
    Retrieve {
        /// Object id.
        id: String,

        /// Destination file path.
        #[arg(short, long)]
        out: PathBuf,

        #[command(flatten)]
        principal: PrincipalArgs,

        /// Record the read as an analysis rather than a download.
        #[arg(long)]
        analyze: bool,
    },

    /// Delete an object.
    Delete {
        /// Object id.
        id: String,

        #[command(flatten)]
        principal: PrincipalArgs,
    },

    /// Run the expiry and orphan sweeps and flush pending audit events.
    Sweep,

    /// Print audit events as JSON lines.
    Audit {
        /// Only events for this object id.
        #[arg(short, long)]
        id: Option<String>,
    },
}

#[derive(clap::Args)]
struct PrincipalArgs {
    /// Acting user id; omit to act anonymously.
    #[arg(short, long)]
    user: Option<String>,

    /// Act with the admin capability.
    #[arg(long)]
    admin: bool,
}

impl PrincipalArgs {
    fn principal(&self) -> Principal {
        match (&self.user, self.admin) {
            (Some(user), true) => Principal::admin(user.clone()),
            (None, true) => Principal::admin("operator"),
            (Some(user), false) => Principal::user(user.clone()),
            (None, false) => Principal::anonymous(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Keygen => cmd_keygen(),

        Commands::Store {
            file,
            name,
            mime,
            owner,
            access,
            ttl,
            analysis_id,
        } => {
            let vault = open_vault(&cli.data_dir).await?;
            let options = StoreOptions {
                name,
                mime,
                owner,
                access,
                ttl,
                analysis_id,
            };
            cmd_store(&vault, &file, options).await
        }

        Commands::Retrieve {
            id,
            out,
            principal,
            analyze,
        } => {
            let vault = open_vault(&cli.data_dir).await?;
            let intent = if analyze {
                Intent::Analyze
            } else {
                Intent::Download
            };
            cmd_retrieve(&vault, &id, &out, &principal.principal(), intent).await
        }

        Commands::Delete { id, principal } => {
            let vault = open_vault(&cli.data_dir).await?;
            cmd_delete(&vault, &id, &principal.principal()).await
        }

        Commands::Sweep => {
            let vault = open_vault(&cli.data_dir).await?;
            cmd_sweep(&vault).await
        }

        Commands::Audit { id } => cmd_audit(&cli.data_dir, id.as_deref()).await,
    }
}

/// Build the service over the on-disk adapters in `data_dir`.
async fn open_vault(data_dir: &Path) -> Result<VaultService> {
    let config = VaultConfig::from_env().context("Failed to load vault configuration")?;

    tokio::fs::create_dir_all(data_dir)
        .await
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

    let objects = LocalObjectStore::new(data_dir.join(BLOB_DIR))
        .context("Failed to open blob directory")?;
    let metadata = SqliteMetadataRepository::open(data_dir.join(METADATA_DB))
        .context("Failed to open metadata database")?;
    let outbox = FileOutbox::open(data_dir.join(AUDIT_OUTBOX))
        .await
        .context("Failed to open audit outbox")?;
    let audit = AuditLogger::new(
        Arc::new(JsonLinesAuditSink::new(data_dir.join(AUDIT_LOG))),
        Arc::new(outbox),
    );

    debug!(data_dir = %data_dir.display(), "Vault opened");
    Ok(VaultService::new(
        config,
        Arc::new(objects),
        Arc::new(metadata),
        Arc::new(audit),
    ))
}

/// Render a vault error the way an end user may see it.
fn user_error(err: Error) -> anyhow::Error {
    debug!(error = %err, "Operation failed");
    anyhow::anyhow!(err.public_message())
}

fn parse_id(id: &str) -> Result<ObjectId> {
    ObjectId::parse(id).map_err(user_error)
}

/// Generate a master key.
fn cmd_keygen() -> Result<()> {
    let key = MasterKey::generate();
    println!("{}", key.to_base64().as_str());
    eprintln!("Store this value in DOCVAULT_MASTER_KEY. It cannot be recovered.");
    Ok(())
}

struct StoreOptions {
    name: Option<String>,
    mime: String,
    owner: Option<String>,
    access: AccessLevel,
    ttl: Option<i64>,
    analysis_id: Option<String>,
}

fn ttl_from_secs(secs: i64) -> Result<chrono::Duration> {
    chrono::Duration::try_seconds(secs).context("--ttl is out of range")
}

/// Store a file.
async fn cmd_store(vault: &VaultService, file: &Path, options: StoreOptions) -> Result<()> {
    let plaintext = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let name = match options.name {
        Some(name) => name,
        None => file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("Source path has no file name")?,
    };

    let mut request = StoreRequest::new(plaintext, name, options.mime).access_level(options.access);
    if let Some(owner) = options.owner {
        request = request.owner(owner);
    }
    if let Some(secs) = options.ttl {
        request = request.ttl(ttl_from_secs(secs)?);
    }
    if let Some(analysis_id) = options.analysis_id {
        request = request.analysis_id(analysis_id);
    }

    let id = vault.store(request).await.map_err(user_error)?;
    info!(object_id = %id, "Object stored");
    println!("{}", id);
    Ok(())
}

/// Retrieve an object into a file.
async fn cmd_retrieve(
    vault: &VaultService,
    id: &str,
    out: &Path,
    principal: &Principal,
    intent: Intent,
) -> Result<()> {
    let id = parse_id(id)?;
    let retrieved = vault
        .retrieve(&id, principal, intent)
        .await
        .map_err(user_error)?;

    tokio::fs::write(out, &retrieved.bytes)
        .await
        .with_context(|| format!("Failed to write {}", out.display()))?;

    info!(
        object_id = %id,
        name = %retrieved.info.original_name,
        size = retrieved.info.size,
        "Object retrieved"
    );
    Ok(())
}

/// Delete an object.
async fn cmd_delete(vault: &VaultService, id: &str, principal: &Principal) -> Result<()> {
    let id = parse_id(id)?;
    vault.delete(&id, principal).await.map_err(user_error)?;
    info!(object_id = %id, "Object deleted");
    Ok(())
}

/// Run one maintenance pass.
async fn cmd_sweep(vault: &VaultService) -> Result<()> {
    let report = vault
        .maintenance_pass()
        .await
        .context("Maintenance pass failed")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Print the audit trail.
async fn cmd_audit(data_dir: &Path, id: Option<&str>) -> Result<()> {
    let filter = id.map(parse_id).transpose()?;
    let sink = JsonLinesAuditSink::new(data_dir.join(AUDIT_LOG));
    let events = sink.read_events().await.context("Failed to read audit log")?;

    for event in events
        .iter()
        .filter(|event| filter.map_or(true, |id| event.object_id == id))
    {
        println!("{}", serde_json::to_string(event)?);
    }
    Ok(())
}
