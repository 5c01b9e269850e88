//! Subcommand handling for recproxy.
//!
//! Every command runs on a current-thread runtime: the session exports
//! environment variables and must stay on one thread.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::{Cli, Commands};
use crate::client::ProxyClient;
use crate::config::{ConfigLoader, SessionEnv};
use crate::repo::find_repo_root;
use crate::session::{self, ProxySession, SessionContext};
use crate::supervisor::{PID_ENV_VAR, ProxyExecutable, ProxyProcessHandle, STOP_GRACE};
use crate::trust::ensure_trust;

/// Run the selected subcommand and return the process exit code.
pub fn handle_command(cli: &Cli) -> Result<i32> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    rt.block_on(async {
        match &cli.command {
            Commands::Ensure => ensure(cli).await,
            Commands::Trust => trust(cli),
            Commands::Start => start(cli).await,
            Commands::Stop { pid } => stop(*pid).await,
            Commands::Status => status(cli).await,
            Commands::Run { command } => run(cli, command).await,
        }
    })
}

fn start_dir(cli: &Cli) -> Result<PathBuf> {
    match &cli.repo {
        Some(path) => Ok(path.clone()),
        None => std::env::current_dir().context("Failed to read current directory"),
    }
}

fn load_context(cli: &Cli) -> Result<SessionContext> {
    let start = start_dir(cli)?;
    SessionContext::discover(&start, cli.config.as_deref())
        .context("Failed to prepare session context")
}

async fn ensure(cli: &Cli) -> Result<i32> {
    let context = load_context(cli)?;
    match context.resolve_executable().await? {
        ProxyExecutable::Binary(path) => println!("{}", path.display()),
        ProxyExecutable::SystemTool(name) => println!("{name}"),
    }
    Ok(0)
}

fn trust(cli: &Cli) -> Result<i32> {
    let context = load_context(cli)?;
    let bundle = context.certificate_bundle();
    let env = ensure_trust(&bundle).context("Failed to prepare trust bundle")?;
    for (key, value) in env.vars() {
        println!("export {key}=\"{value}\"");
    }
    Ok(0)
}

async fn start(cli: &Cli) -> Result<i32> {
    let context = load_context(cli)?;
    let session = ProxySession::start(context)
        .await
        .context("Failed to start proxy session")?;

    if !session.is_active() {
        info!("No proxy needed for this run");
        return Ok(0);
    }
    match session.detach() {
        Some(pid) => println!("export {PID_ENV_VAR}={pid}"),
        None => info!("Proxy was already running or is managed externally"),
    }
    Ok(0)
}

async fn stop(pid: Option<u32>) -> Result<i32> {
    let env = SessionEnv::from_env();
    if env.manual_start {
        info!("Proxy is externally managed, not stopping it");
        return Ok(0);
    }
    match pid.or(env.proxy_pid) {
        Some(pid) => {
            ProxyProcessHandle::from_pid(pid).terminate(STOP_GRACE).await;
        }
        None => warn!("No PID given and {PID_ENV_VAR} is not set, nothing to stop"),
    }
    Ok(0)
}

async fn status(cli: &Cli) -> Result<i32> {
    let start = start_dir(cli)?;
    let repo_root = find_repo_root(&start).ok();
    let env = SessionEnv::from_env();
    let config = ConfigLoader::new()
        .load(repo_root.as_deref(), cli.config.as_deref(), &env)
        .context("Failed to load configuration")?;

    // Trust the merged bundle if an earlier step already built it.
    let bundle = repo_root
        .map(|root| {
            SessionContext::new(root, config.clone(), env)
                .certificate_bundle()
                .bundle_path()
                .to_path_buf()
        })
        .filter(|path| path.exists());

    let client = ProxyClient::new(
        config.proxy.url(),
        config.proxy.request_timeout(),
        bundle.as_deref(),
    )?;

    if client.is_available().await {
        println!("available at {}", client.base_url());
        Ok(0)
    } else {
        println!("not available at {}", client.base_url());
        Ok(1)
    }
}

async fn run(cli: &Cli, command: &[String]) -> Result<i32> {
    let context = load_context(cli)?;
    let (program, args) = command
        .split_first()
        .context("No command given to run")?;

    let status = session::run(context, async |_session: &ProxySession| {
        spawn_wrapped(program, args).await
    })
    .await
    .context("Proxy session failed")?
    .with_context(|| format!("Failed to run {program}"))?;

    Ok(status.code().unwrap_or(1))
}

async fn spawn_wrapped(program: &str, args: &[String]) -> std::io::Result<std::process::ExitStatus> {
    info!(%program, ?args, "Running command inside proxy session");
    tokio::process::Command::new(Path::new(program))
        .args(args)
        .status()
        .await
}
