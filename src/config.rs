//! Configuration for callbridge.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (CALLBRIDGE_HOME, CALL_FLOWS_DID_MAP, CALLBRIDGE_LOG_LEVEL)
//! 2. Config file (.callbridge/config.yaml)
//! 3. Defaults (~/.callbridge, no call flows, 18s receive wait, 20s visibility)
//!
//! Config file discovery:
//! - Searches current directory and parents for .callbridge/config.yaml
//! - `home` in the config file is relative to the .callbridge/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::{QueueAttributes, DEFAULT_RECEIVE_WAIT, DEFAULT_VISIBILITY_TIMEOUT};
use crate::core::{CallFlowEntry, CallFlowTable};

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Longest receive wait a queue accepts
pub const MAX_RECEIVE_WAIT: Duration = Duration::from_secs(20);

pub const ENV_HOME: &str = "CALLBRIDGE_HOME";
pub const ENV_CALL_FLOWS: &str = "CALL_FLOWS_DID_MAP";
pub const ENV_LOG_LEVEL: &str = "CALLBRIDGE_LOG_LEVEL";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    /// State directory (relative to the .callbridge/ directory)
    pub home: Option<String>,
    pub log_level: Option<String>,
    #[serde(default)]
    pub queue: Option<QueueConfig>,
    #[serde(default)]
    pub call_flows: Vec<CallFlowEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    pub receive_wait_seconds: Option<u64>,
    pub visibility_timeout_seconds: Option<u64>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to callbridge home (queues and execution journals)
    pub home: PathBuf,
    /// Number → call flow mappings
    pub call_flows: Vec<CallFlowEntry>,
    /// Attributes for new session queues
    pub queue: QueueAttributes,
    /// "INFO" or "DEBUG"
    pub log_level: &'static str,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Directory holding the session queues
    pub fn queues_dir(&self) -> PathBuf {
        self.home.join("queues")
    }

    /// Directory holding the workflow execution journals
    pub fn executions_dir(&self) -> PathBuf {
        self.home.join("executions")
    }

    /// Build the lookup table from the configured mappings
    pub fn call_flow_table(&self) -> Result<CallFlowTable> {
        CallFlowTable::from_entries(self.call_flows.iter().cloned())
    }
}

/// Only INFO and DEBUG are honoured; anything else logs at INFO
pub fn normalize_log_level(level: Option<&str>) -> &'static str {
    match level.map(|l| l.trim().to_ascii_uppercase()) {
        Some(ref l) if l == "DEBUG" => "DEBUG",
        _ => "INFO",
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".callbridge").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Parse the `[{"DID": ..., "ARN": ...}]` environment format
fn parse_call_flow_map(json: &str) -> Result<Vec<CallFlowEntry>> {
    serde_json::from_str(json).with_context(|| format!("Failed to parse {}", ENV_CALL_FLOWS))
}

fn queue_attributes(queue: Option<&QueueConfig>) -> Result<QueueAttributes> {
    let receive_wait = queue
        .and_then(|q| q.receive_wait_seconds)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RECEIVE_WAIT);
    let visibility_timeout = queue
        .and_then(|q| q.visibility_timeout_seconds)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_VISIBILITY_TIMEOUT);

    if receive_wait > MAX_RECEIVE_WAIT {
        anyhow::bail!(
            "queue.receive_wait_seconds must be at most {}s, got {}s",
            MAX_RECEIVE_WAIT.as_secs(),
            receive_wait.as_secs()
        );
    }
    if receive_wait >= visibility_timeout {
        anyhow::bail!(
            "queue.receive_wait_seconds ({}s) must be shorter than queue.visibility_timeout_seconds ({}s)",
            receive_wait.as_secs(),
            visibility_timeout.as_secs()
        );
    }

    Ok(QueueAttributes {
        receive_wait,
        visibility_timeout,
    })
}

/// Load configuration from all sources, reading variables through `env`
fn load_config_with<F>(config_file: Option<PathBuf>, env: F) -> Result<ResolvedConfig>
where
    F: Fn(&str) -> Option<String>,
{
    // Default home directory
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".callbridge");

    let file = match config_file {
        Some(ref path) => Some(load_config_file(path)?),
        None => None,
    };

    let home = if let Some(env_home) = env(ENV_HOME) {
        PathBuf::from(env_home)
    } else if let (Some(path), Some(home)) = (
        config_file.as_ref(),
        file.as_ref().and_then(|f| f.home.as_ref()),
    ) {
        let callbridge_dir = path.parent().unwrap_or(Path::new("."));
        resolve_path(callbridge_dir, home)
    } else {
        default_home
    };

    let call_flows = match env(ENV_CALL_FLOWS) {
        Some(json) => parse_call_flow_map(&json)?,
        None => file
            .as_ref()
            .map(|f| f.call_flows.clone())
            .unwrap_or_default(),
    };

    let queue = queue_attributes(file.as_ref().and_then(|f| f.queue.as_ref()))?;

    let log_level = normalize_log_level(
        env(ENV_LOG_LEVEL)
            .as_deref()
            .or_else(|| file.as_ref().and_then(|f| f.log_level.as_deref())),
    );

    let resolved = ResolvedConfig {
        home,
        call_flows,
        queue,
        log_level,
        config_file,
    };

    // Fail at load time rather than on the first call
    resolved.call_flow_table()?;

    Ok(resolved)
}

fn load_config() -> Result<ResolvedConfig> {
    load_config_with(find_config_file(), |key| std::env::var(key).ok())
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn env_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn write_config(temp: &TempDir, content: &str) -> PathBuf {
        let dir = temp.path().join(".callbridge");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{}", content).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_file() {
        let config = load_config_with(None, env_from(&[])).unwrap();

        let expected_home = dirs::home_dir().unwrap().join(".callbridge");
        assert_eq!(config.home, expected_home);
        assert_eq!(config.queues_dir(), expected_home.join("queues"));
        assert!(config.call_flows.is_empty());
        assert_eq!(config.queue, QueueAttributes::default());
        assert_eq!(config.log_level, "INFO");
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let path = write_config(
            &temp,
            r#"
version: "1.0"
home: ./state
log_level: debug
queue:
  receive_wait_seconds: 10
  visibility_timeout_seconds: 15
call_flows:
  - number: "+15551234567"
    call_flow: flow-A
"#,
        );

        let config = load_config_with(Some(path.clone()), env_from(&[])).unwrap();

        assert_eq!(config.home, temp.path().join(".callbridge").join("state"));
        assert_eq!(config.log_level, "DEBUG");
        assert_eq!(config.queue.receive_wait, Duration::from_secs(10));
        assert_eq!(config.queue.visibility_timeout, Duration::from_secs(15));
        assert_eq!(config.call_flows.len(), 1);
        assert_eq!(config.call_flows[0].call_flow.as_str(), "flow-A");
        assert_eq!(config.config_file, Some(path));
    }

    #[test]
    fn test_environment_overrides_file() {
        let temp = TempDir::new().unwrap();
        let path = write_config(
            &temp,
            r#"
version: "1.0"
call_flows:
  - number: "+15551234567"
    call_flow: flow-A
"#,
        );

        let config = load_config_with(
            Some(path),
            env_from(&[
                (ENV_HOME, "/srv/callbridge"),
                (ENV_CALL_FLOWS, r#"[{"DID":"+15550000000","ARN":"flow-Z"}]"#),
                (ENV_LOG_LEVEL, "TRACE"),
            ]),
        )
        .unwrap();

        assert_eq!(config.home, PathBuf::from("/srv/callbridge"));
        assert_eq!(config.call_flows[0].number, "+15550000000");
        assert_eq!(config.log_level, "INFO");
    }

    #[test]
    fn test_receive_wait_must_fit_visibility() {
        let temp = TempDir::new().unwrap();
        let path = write_config(
            &temp,
            r#"
version: "1.0"
queue:
  receive_wait_seconds: 20
  visibility_timeout_seconds: 20
"#,
        );

        assert!(load_config_with(Some(path), env_from(&[])).is_err());
    }

    #[test]
    fn test_duplicate_numbers_fail_load() {
        let result = load_config_with(
            None,
            env_from(&[(
                ENV_CALL_FLOWS,
                r#"[{"DID":"+1","ARN":"a"},{"DID":"+1","ARN":"b"}]"#,
            )]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
