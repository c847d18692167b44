//! Opt-in diagnostic logging of the runtime environment.
//!
//! Helps when debugging a deployment: what the process was started with,
//! where it runs, what got deployed next to it, and which agent settings it
//! picked up. None of it affects the response.

use std::{
    env::VarError,
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
    task::{Context, Poll},
};

use common::IncomingRequest;
use tower::{Layer, Service};
use tracing::{info, warn};

use crate::agent::{Agent, APP_NAME_KEY, LICENSE_KEY_KEY};

pub const DEFAULT_EXPLORE_PATH: &str = "/home/site/wwwroot";

#[derive(Debug, Clone)]
pub struct Diagnostics {
    agent: Arc<dyn Agent>,
    explore_path: PathBuf,
    env_vars: Vec<String>,
}

impl Diagnostics {
    pub fn new(
        agent: Arc<dyn Agent>,
        explore_path: impl Into<PathBuf>,
        env_vars: Vec<String>,
    ) -> Self {
        Self {
            agent,
            explore_path: explore_path.into(),
            env_vars,
        }
    }

    pub fn log(&self) {
        self.log_process_arguments();
        self.log_runtime_environment();
        self.log_env_vars();
        self.log_agent_settings();
    }

    fn log_process_arguments(&self) {
        info!("Process arguments");
        for argument in std::env::args() {
            info!("Argument: {argument}");
        }
    }

    fn log_runtime_environment(&self) {
        match std::env::current_dir() {
            Ok(path) => info!("Execution path: {}", path.display()),
            Err(err) => warn!("Failed to read execution path: {err}"),
        }

        if !self.explore_path.exists() {
            return;
        }

        info!("Exploration path: {}", self.explore_path.display());
        match explore(&self.explore_path) {
            Ok(paths) => {
                for path in paths {
                    info!("File path: {}", path.display());
                }
            }
            Err(err) => warn!("Failed to explore {}: {err}", self.explore_path.display()),
        }
    }

    fn log_env_vars(&self) {
        for name in &self.env_vars {
            info!("{name}: {}", env_var_display(name));
        }
    }

    fn log_agent_settings(&self) {
        let settings = AgentSettings::read(self.agent.as_ref());
        info!("Agent settings");
        info!("App Name: {}", settings.app_name.as_deref().unwrap_or("<unset>"));
        info!(
            "License Key: {}",
            settings
                .license_key
                .as_deref()
                .map_or_else(|| "<unset>".to_owned(), mask_secret)
        );
    }
}

/// A variable set to something other than Unicode is shown lossily, so it is
/// not mistaken for an unset one.
pub fn env_var_display(name: &str) -> String {
    match std::env::var(name) {
        Ok(value) => value,
        Err(VarError::NotPresent) => "<unset>".to_owned(),
        Err(VarError::NotUnicode(raw)) => format!("{} (not unicode)", raw.to_string_lossy()),
    }
}

/// The agent settings worth checking on a misbehaving deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentSettings {
    pub app_name: Option<String>,
    pub license_key: Option<String>,
}

impl AgentSettings {
    pub fn read(agent: &dyn Agent) -> Self {
        Self {
            app_name: agent.config_value(APP_NAME_KEY),
            license_key: agent.config_value(LICENSE_KEY_KEY),
        }
    }
}

/// Keeps the last 4 characters, stars out the rest.
pub fn mask_secret(secret: &str) -> String {
    let len = secret.chars().count();
    let visible = if len > 4 { 4 } else { 0 };
    secret
        .chars()
        .enumerate()
        .map(|(i, c)| if i + visible < len { '*' } else { c })
        .collect()
}

/// Every path below `root` (root included), depth first, sorted per directory.
/// Symlinked directories are listed but not followed.
pub fn explore(root: &Path) -> io::Result<Vec<PathBuf>> {
    let metadata = fs::symlink_metadata(root)?;
    let mut paths = vec![root.to_path_buf()];
    if metadata.is_dir() {
        let mut entries = fs::read_dir(root)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<io::Result<Vec<_>>>()?;
        entries.sort();
        for entry in entries {
            paths.extend(explore(&entry)?);
        }
    }
    Ok(paths)
}

/// Logs diagnostics before each invocation when enabled.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsLayer {
    diagnostics: Option<Arc<Diagnostics>>,
}

impl DiagnosticsLayer {
    pub fn new(diagnostics: Option<Diagnostics>) -> Self {
        Self {
            diagnostics: diagnostics.map(Arc::new),
        }
    }
}

impl<S> Layer<S> for DiagnosticsLayer {
    type Service = DiagnosticsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DiagnosticsService {
            inner,
            diagnostics: self.diagnostics.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiagnosticsService<S> {
    inner: S,
    diagnostics: Option<Arc<Diagnostics>>,
}

impl<S> Service<IncomingRequest> for DiagnosticsService<S>
where
    S: Service<IncomingRequest>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: IncomingRequest) -> Self::Future {
        if let Some(diagnostics) = &self.diagnostics {
            info!("Invocation for url \"{}\"", request.uri);
            diagnostics.log();
        }
        self.inner.call(request)
    }
}
