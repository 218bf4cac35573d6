//! jumpbox bastion daemon
//!
//! Accepts SSH logins from bastion users, shows the asset menu and relays
//! each selected asset's shell while auditing every command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jb_core::config::{self, BastionConfig};
use jb_core::StaticDirectory;
use jb_relay::{AuditLogger, FileAuditSink, PsProbe, RelayServices};
use jb_server::auth::{hash_password, AuthorizedKeys};
use jb_server::server::{load_or_generate_host_key, SshServer};
use jb_server::target::SshTargetConnector;
use jb_server::BastionState;

/// How long shutdown waits for queued audit records
const AUDIT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "jumpbox")]
#[command(about = "SSH bastion with an asset menu and command audit")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "JUMPBOX_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print the password_sha256 value for a password and exit
    #[arg(long, value_name = "PASSWORD")]
    hash_password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(password) = &args.hash_password {
        println!("{}", hash_password(password));
        return Ok(());
    }

    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("jumpbox starting...");

    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let config: BastionConfig = config::load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    config.validate().context("Invalid configuration")?;

    let bind_addr = args.bind.clone().unwrap_or_else(|| config.bind_address.clone());

    let host_key = load_or_generate_host_key(&config.host_key_path).await?;
    tracing::info!(
        "Host key fingerprint: {}",
        host_key
            .clone_public_key()
            .context("Host key has no public half")?
            .fingerprint()
    );

    let auth_keys = if config.authorized_keys.is_empty() {
        AuthorizedKeys::new()
    } else {
        AuthorizedKeys::load_from_files(&config.authorized_keys)?
    };
    tracing::info!(
        "{} password users, {} authorized keys",
        config.users.len(),
        auth_keys.len()
    );

    let directory = StaticDirectory::new(config.assets.clone()).context("Invalid asset table")?;
    if directory.is_empty() {
        tracing::warn!("Asset table is empty - users will only see the menu");
    } else {
        tracing::info!("Loaded {} assets", directory.len());
    }

    let audit_sink = FileAuditSink::new(config.audit.path.clone());
    tracing::info!("Auditing commands to {:?}", audit_sink.path());
    let (audit, audit_workers) = AuditLogger::spawn(
        Arc::new(audit_sink),
        config.audit.workers,
        config.audit.queue_capacity,
    );

    let settings = config.relay.clone();
    let services = RelayServices {
        directory: Arc::new(directory),
        connector: Arc::new(SshTargetConnector::new(
            settings.connect_timeout,
            settings.connect_timeout,
        )),
        probe: Arc::new(PsProbe),
        audit,
        settings,
    };

    let state = Arc::new(BastionState::new(config, services, auth_keys));

    let cancel = CancellationToken::new();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel_clone.cancel();
    });

    let server = SshServer::new(host_key, Arc::clone(&state), cancel.clone());

    tracing::info!("Starting SSH server on {}", bind_addr);
    let result = server.run(&bind_addr).await;

    tracing::info!("Terminating {} active sessions", state.sessions.len());
    state.sessions.terminate_all();
    drop(server);
    // the audit queue closes once the last logger clone is gone
    drop(state);
    if tokio::time::timeout(AUDIT_DRAIN_TIMEOUT, audit_workers.join())
        .await
        .is_err()
    {
        tracing::warn!("Audit queue not drained within {:?}", AUDIT_DRAIN_TIMEOUT);
    }

    result?;
    tracing::info!("jumpbox shutdown complete");
    Ok(())
}
