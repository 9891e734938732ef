// src/main.rs

use clap::Parser;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod cache;
mod config;
mod error;
mod orchestrator;
mod select;
mod session;
mod sys;

use crate::config::{AccessConfig, LogFormat};
use crate::error::AccessError;
use crate::orchestrator::{SessionOrchestrator, SessionOutcome, SessionRequest};
use crate::select::{TerminalPrompter, DEFAULT_MAX_ATTEMPTS};
use crate::sys::azure::AzCliControlPlane;
use crate::sys::signals::{install_listener, InterruptSignal};

/// Temporary, least-privilege access to a Key Vault secret.
/// Every change made to reach the vault is reverted before exit.
#[derive(Parser, Debug)]
#[command(name = "kari-vault-access", version, about, long_about = None)]
struct Args {
    /// Key Vault name (prompted when omitted)
    #[arg(long)]
    vault: Option<String>,

    /// Secret name (prompted when omitted)
    #[arg(long)]
    secret: Option<String>,

    /// Subscription to switch to; remembered for later runs
    #[arg(long)]
    subscription: Option<String>,

    /// Role to grant for the session (also: KARI_VAULT_ROLE)
    #[arg(long)]
    role: Option<String>,

    /// Ignore the cached vault listing
    #[arg(long)]
    refresh_cache: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(format: LogFormat, verbose: bool) {
    // stdout carries the secret value only; all diagnostics go to stderr.
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn exit_with(err: &AccessError) -> ExitCode {
    ExitCode::from(u8::try_from(err.exit_code()).unwrap_or(1))
}

fn main() -> ExitCode {
    let args = Args::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("❌ Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let code = runtime.block_on(run(args));

    // A prompt abandoned on interrupt may still be parked on stdin.
    runtime.shutdown_background();
    code
}

async fn run(args: Args) -> ExitCode {
    // ==============================================================================
    // 1. Configuration & Logging
    // ==============================================================================

    let mut config = match AccessConfig::load() {
        Ok(config) => config,
        Err(e) => {
            let err = AccessError::Config(e);
            eprintln!("❌ {}", err);
            return exit_with(&err);
        }
    };
    init_tracing(config.log_format, args.verbose);

    if let Some(role) = args.role {
        config.role_name = role;
    }

    // 🛡️ Rollback must survive Ctrl-C: refuse to start without the listener.
    let interrupt = InterruptSignal::new();
    if let Err(e) = install_listener(interrupt.clone()) {
        let err = AccessError::Config(e);
        error!("❌ {}", err);
        return exit_with(&err);
    }

    // ==============================================================================
    // 2. Dependency Injection & Session
    // ==============================================================================

    let plane = Arc::new(AzCliControlPlane::new());
    let orchestrator = SessionOrchestrator::new(
        plane.clone(),
        plane,
        Box::new(TerminalPrompter::new(DEFAULT_MAX_ATTEMPTS)),
        config,
        interrupt,
    );

    let request = SessionRequest {
        vault: args.vault,
        secret: args.secret,
        subscription: args.subscription,
        refresh_cache: args.refresh_cache,
    };

    match orchestrator.run(&request).await {
        Ok(SessionOutcome::SecretRead { name, value }) => {
            let written = value.use_secret(|plaintext| {
                let mut stdout = std::io::stdout().lock();
                writeln!(stdout, "{}", plaintext).and_then(|_| stdout.flush())
            });
            if let Err(e) = written {
                error!("❌ Failed to write secret '{}' to stdout: {}", name, e);
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Ok(SessionOutcome::NoSecrets) => {
            info!("No secrets to read. Access has been reverted.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("❌ Session failed ({:?}): {}", e.kind(), e);
            exit_with(&e)
        }
    }
}
