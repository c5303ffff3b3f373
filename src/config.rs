use crate::models::RunMode;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MODE_ENV_KEY: &str = "TRADING_MODE";
pub const CREDENTIALS_ENV_KEY: &str = "CREDENTIALS_FILE";
pub const CREDENTIALS_FILE_NAME: &str = ".env";

const DEFAULT_DASHBOARD_URL: &str = "http://127.0.0.1:5000";
const DEFAULT_STOP_GRACE_MS: u64 = 1_500;

/// Shell-held configuration. Resolved once at startup; individual runs
/// derive an immutable [`LaunchConfig`] from it.
#[derive(Debug, Clone)]
pub struct ShellConfig {
    pub worker_program: PathBuf,
    pub worker_entry: PathBuf,
    pub worker_dir: PathBuf,
    pub dashboard_url: String,
    pub stop_grace: Duration,
}

impl ShellConfig {
    pub fn resolve(resource_dir: &Path) -> Self {
        let worker_dir = std::env::var_os("TRADING_DESK_WORKER_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| resource_dir.join("backend"));
        let worker_program = std::env::var_os("TRADING_DESK_WORKER_PROGRAM")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(default_interpreter()));
        let worker_entry = std::env::var_os("TRADING_DESK_WORKER_ENTRY")
            .map(PathBuf::from)
            .unwrap_or_else(|| worker_dir.join("main.py"));

        Self {
            worker_program,
            worker_entry,
            worker_dir,
            dashboard_url: std::env::var("TRADING_DESK_DASHBOARD_URL")
                .unwrap_or_else(|_| DEFAULT_DASHBOARD_URL.to_string()),
            stop_grace: Duration::from_millis(DEFAULT_STOP_GRACE_MS),
        }
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.worker_dir.join(CREDENTIALS_FILE_NAME)
    }
}

fn default_interpreter() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

/// Everything one worker run is launched with. Recomputed on every start;
/// never mutated while the run is in progress.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
}

impl LaunchConfig {
    pub fn for_mode(config: &ShellConfig, mode: RunMode) -> Self {
        let mut env = BTreeMap::new();
        env.insert(MODE_ENV_KEY.to_string(), mode.as_str().to_string());
        let credentials_path = config.credentials_path();
        if credentials_path.exists() {
            env.insert(
                CREDENTIALS_ENV_KEY.to_string(),
                credentials_path.to_string_lossy().to_string(),
            );
        }

        Self {
            program: config.worker_program.clone(),
            args: vec![config.worker_entry.to_string_lossy().to_string()],
            cwd: config.worker_dir.clone(),
            env,
        }
    }
}
