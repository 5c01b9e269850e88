//! One recording session, from trust bootstrap to proxy teardown.
//!
//! [`ProxySession::start`] runs the whole bring-up in order:
//!
//! ```text
//! trust bundle ─► probe ─┬─ answering ───────────────────────────┐
//!                        └─ acquire build ─► spawn ─► poll ready ─┴─► sanitizers
//! ```
//!
//! [`run`] wraps a unit of work between start and stop.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::acquire::{AcquireError, BinaryAcquirer, VersionResolver, prepare_local_tool};
use crate::client::{ClientError, ProxyClient};
use crate::config::{ASSETS_FOLDER_ENV, Config, ConfigError, ConfigLoader, SessionEnv};
use crate::repo::{RepoError, find_repo_root};
use crate::sanitize::{SanitizerBatch, SanitizerConfigurator, SanitizerRule, common_rules};
use crate::supervisor::{
    LaunchSpec, ProcessSupervisor, ProxyExecutable, ProxyState, SupervisorError,
};
use crate::trust::{CertificateBundle, TrustEnv, TrustError, ensure_trust};

/// Errors that abort a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No repository around the start path.
    #[error(transparent)]
    Repo(#[from] RepoError),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The trust bundle could not be prepared.
    #[error(transparent)]
    Trust(#[from] TrustError),

    /// The proxy build could not be acquired.
    #[error(transparent)]
    Acquire(#[from] AcquireError),

    /// A request to the proxy failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The proxy could not be started or never became ready.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    /// The per-environment assets folder could not be created.
    #[error("Failed to create assets folder {path}: {source}")]
    AssetsFolder {
        /// Folder location.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Everything a session needs to know before it starts.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Discovered repository root.
    pub repo_root: PathBuf,
    /// Merged configuration.
    pub config: Config,
    /// Environment snapshot.
    pub env: SessionEnv,
}

impl SessionContext {
    /// Context from explicit parts.
    pub fn new(repo_root: PathBuf, config: Config, env: SessionEnv) -> Self {
        Self {
            repo_root,
            config,
            env,
        }
    }

    /// Find the repository around `start` and load its configuration.
    pub fn discover(start: &Path, extra_config: Option<&Path>) -> Result<Self, SessionError> {
        let repo_root = find_repo_root(start)?;
        let env = SessionEnv::from_env();
        let config = ConfigLoader::new().load(Some(&repo_root), extra_config, &env)?;
        debug!(repo_root = %repo_root.display(), "Session context ready");
        Ok(Self::new(repo_root, config, env))
    }

    /// Root for recordings, downloads and logs. The CI checkout root wins
    /// over the discovered repository.
    pub fn storage_root(&self) -> &Path {
        self.env
            .build_sources_dir
            .as_deref()
            .unwrap_or(&self.repo_root)
    }

    /// Proxy output log, only kept under CI.
    pub fn log_file(&self) -> Option<PathBuf> {
        self.env.in_ci.then(|| {
            self.storage_root()
                .join(format!("_proxy_log_{}.log", self.env.env_name()))
        })
    }

    /// Per-environment assets folder, only used under CI.
    pub fn assets_folder(&self) -> Option<PathBuf> {
        self.env
            .in_ci
            .then(|| self.storage_root().join("l").join(self.env.env_name()))
    }

    /// The merged trust bundle for this repository.
    pub fn certificate_bundle(&self) -> CertificateBundle {
        let paths = &self.config.paths;
        CertificateBundle::for_repo(
            &self.repo_root,
            paths.dev_certificate(),
            paths.certificate_dir(),
            paths.system_ca_bundle.clone(),
        )
    }

    /// Resolver for the required and cached versions.
    pub fn version_resolver(&self) -> VersionResolver {
        let paths = &self.config.paths;
        VersionResolver::new(paths.version_manifest(), paths.cache_dir())
    }

    /// Acquirer for the proxy build.
    pub fn binary_acquirer(&self) -> Result<BinaryAcquirer, AcquireError> {
        BinaryAcquirer::new(self.config.proxy.release_url(), self.config.paths.cache_dir())
    }

    /// Client for the configured proxy URL, trusting `ca_bundle` if given.
    pub fn client(&self, ca_bundle: Option<&Path>) -> Result<ProxyClient, ClientError> {
        ProxyClient::new(
            self.config.proxy.url(),
            self.config.proxy.request_timeout(),
            ca_bundle,
        )
    }

    /// Rules submitted once the proxy is ready.
    pub fn rules(&self) -> Vec<SanitizerRule> {
        let sanitizers = &self.config.sanitizers;
        let mut rules = if sanitizers.use_defaults() {
            common_rules()
        } else {
            Vec::new()
        };
        rules.extend(sanitizers.rules.iter().cloned());
        rules
    }

    /// The pre-installed tool on CI agents, otherwise a downloaded build.
    pub async fn resolve_executable(&self) -> Result<ProxyExecutable, SessionError> {
        if self.env.use_system_tool() {
            let tool = self.config.proxy.system_tool();
            info!(%tool, "Using pre-installed proxy tool");
            return Ok(ProxyExecutable::SystemTool(tool.to_string()));
        }

        info!("Using standalone proxy build");
        let path = prepare_local_tool(
            self.storage_root(),
            &self.version_resolver(),
            &self.binary_acquirer()?,
        )
        .await?;
        Ok(ProxyExecutable::Binary(path))
    }

    /// Create and export the assets folder when running under CI.
    pub(crate) fn prepare_assets_folder(&self) -> Result<Option<PathBuf>, SessionError> {
        let Some(folder) = self.assets_folder() else {
            return Ok(None);
        };
        fs::create_dir_all(&folder).map_err(|source| SessionError::AssetsFolder {
            path: folder.clone(),
            source,
        })?;
        // SAFETY: the session runs on a single control thread; see `TrustEnv::export`.
        unsafe { std::env::set_var(ASSETS_FOLDER_ENV, &folder) };
        info!(folder = %folder.display(), "Exported {ASSETS_FOLDER_ENV}");
        Ok(Some(folder))
    }

    /// Everything needed to spawn the proxy, acquiring it first if needed.
    ///
    /// Under CI this also exports `PROXY_ASSETS_FOLDER`; the threading rules of
    /// [`ProxySession::start`] apply.
    pub async fn prepare_launch(&self) -> Result<LaunchSpec, SessionError> {
        let root = self.storage_root();
        info!(root = %root.display(), "Preparing proxy launch");

        self.prepare_assets_folder()?;
        let executable = self.resolve_executable().await?;

        let spec = LaunchSpec::new(
            executable,
            root,
            self.config.proxy.url(),
            &root.join(self.config.paths.dev_certificate_pfx()),
            |key| std::env::var(key).ok(),
        );
        Ok(match self.log_file() {
            Some(log) => spec.with_log_file(log),
            None => spec,
        })
    }
}

/// A running (or deliberately skipped) proxy session.
#[derive(Debug)]
pub struct ProxySession {
    context: SessionContext,
    supervisor: Option<ProcessSupervisor>,
    trust: Option<TrustEnv>,
    sanitizers: Option<SanitizerBatch>,
}

impl ProxySession {
    /// Bring the proxy up and configure it.
    ///
    /// Live runs that record nothing skip every step. On failure anything
    /// already started is stopped before the error is returned.
    ///
    /// # Environment
    ///
    /// Writes process-wide variables: the trust variables, `PROXY_PID`, and
    /// `PROXY_ASSETS_FOLDER` under CI. Drive it from a single-threaded runtime
    /// and do not read or write the environment from other threads while it
    /// runs.
    pub async fn start(context: SessionContext) -> Result<Self, SessionError> {
        if context.env.live_and_not_recording() {
            info!("Live run without recording, proxy not needed");
            return Ok(Self {
                context,
                supervisor: None,
                trust: None,
                sanitizers: None,
            });
        }

        let bundle = context.certificate_bundle();
        let trust = ensure_trust(&bundle)?;
        trust.export();

        let client = context.client(Some(bundle.bundle_path()))?;
        let policy = context.config.proxy.poll_policy();
        let supervisor = if context.env.manual_start {
            ProcessSupervisor::externally_managed(client, policy)
        } else {
            ProcessSupervisor::new(client, policy)
        };

        let mut session = Self {
            context,
            supervisor: Some(supervisor),
            trust: Some(trust),
            sanitizers: None,
        };

        match session.bring_up().await {
            Ok(()) => Ok(session),
            Err(e) => {
                session.stop().await;
                Err(e)
            }
        }
    }

    async fn bring_up(&mut self) -> Result<(), SessionError> {
        let context = &self.context;
        let Some(supervisor) = self.supervisor.as_mut() else {
            return Ok(());
        };

        supervisor
            .start_with(|| context.prepare_launch())
            .await?;

        match supervisor.wait_ready().await {
            Ok(()) => {}
            Err(e @ SupervisorError::ProxyNotReady { .. })
                if !context.config.proxy.strict_readiness() =>
            {
                warn!(error = %e, "Continuing with a proxy that never reported ready");
            }
            Err(e) => return Err(e.into()),
        }

        let rules = context.rules();
        let batch = SanitizerConfigurator::new(supervisor.client())
            .apply(&rules)
            .await?;
        self.sanitizers = Some(batch);
        Ok(())
    }

    /// Whether a proxy is part of this session.
    pub fn is_active(&self) -> bool {
        self.supervisor.is_some()
    }

    /// Supervisor state, `None` when the proxy was skipped.
    pub fn state(&self) -> Option<ProxyState> {
        self.supervisor.as_ref().map(ProcessSupervisor::state)
    }

    /// PID of the proxy this session spawned.
    pub fn pid(&self) -> Option<u32> {
        self.supervisor
            .as_ref()
            .and_then(ProcessSupervisor::handle)
            .map(|handle| handle.pid)
    }

    /// Trust variables exported for this session.
    pub fn trust(&self) -> Option<&TrustEnv> {
        self.trust.as_ref()
    }

    /// Sanitizers submitted to the proxy.
    pub fn sanitizers(&self) -> Option<&SanitizerBatch> {
        self.sanitizers.as_ref()
    }

    /// Session inputs.
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Release the proxy without stopping it, leaving its PID exported for a
    /// later `stop`.
    pub fn detach(mut self) -> Option<u32> {
        let pid = self.pid();
        self.supervisor = None;
        pid
    }

    /// Tear the session down. Never fails.
    pub async fn stop(&mut self) {
        if let Some(supervisor) = self.supervisor.as_mut() {
            supervisor.stop().await;
        }
    }
}

/// Run `body` inside a proxy session.
///
/// The proxy is stopped after `body` finishes, whatever it returned. Environment
/// writes follow the rules of [`ProxySession::start`].
pub async fn run<F, T>(context: SessionContext, body: F) -> Result<T, SessionError>
where
    F: AsyncFnOnce(&ProxySession) -> T,
{
    let mut session = ProxySession::start(context).await?;
    let output = body(&session).await;
    session.stop().await;
    Ok(output)
}
