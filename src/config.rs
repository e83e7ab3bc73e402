//! Agent configuration: defaults, an optional JSON settings file, and environment
//! overrides layered on top.

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use session_manager::{
    ExpiryPolicy, RegistryConfig, SessionOptions, DEFAULT_IDLE_TIMEOUT, DEFAULT_KILL_GRACE,
    DEFAULT_MAX_LIFETIME, DEFAULT_MAX_SESSIONS, DEFAULT_OUTPUT_BUFFER_CAP, DEFAULT_READ_CHUNK_CAP,
    DEFAULT_READ_TIMEOUT, DEFAULT_REAPER_INTERVAL,
};
use thiserror::Error;

use crate::schema::{BUILTIN_TOOLS, PLAN};

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

pub const BYPASS_APPROVAL_ENV: &str = "TRICODE_BYPASS_APPROVAL";
pub const MAX_SESSIONS_ENV: &str = "TRICODE_MAX_SESSIONS";
pub const SESSION_IDLE_ENV: &str = "TRICODE_SESSION_IDLE_SECS";
pub const SESSION_MAX_ENV: &str = "TRICODE_SESSION_MAX_SECS";
pub const OUTPUT_BUFFER_ENV: &str = "TRICODE_OUTPUT_BUFFER_BYTES";
pub const TOOLS_ENV: &str = "TRICODE_TOOLS";
pub const WORKSPACE_ENV: &str = "TRICODE_WORKSPACE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Skip operator approval for destructive tools.
    pub bypass_destructive_approval: bool,
    pub max_sessions: usize,
    #[serde(with = "duration_secs")]
    pub session_idle_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub session_max_lifetime: Duration,
    pub output_buffer_cap: usize,
    pub read_chunk_cap: usize,
    #[serde(with = "duration_secs")]
    pub default_read_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub reaper_interval: Duration,
    #[serde(with = "duration_secs")]
    pub command_timeout: Duration,
    pub tool_whitelist: BTreeSet<String>,
    /// Boundary for every path argument.
    pub workspace_root: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            bypass_destructive_approval: false,
            max_sessions: DEFAULT_MAX_SESSIONS,
            session_idle_timeout: DEFAULT_IDLE_TIMEOUT,
            session_max_lifetime: DEFAULT_MAX_LIFETIME,
            output_buffer_cap: DEFAULT_OUTPUT_BUFFER_CAP,
            read_chunk_cap: DEFAULT_READ_CHUNK_CAP,
            default_read_timeout: DEFAULT_READ_TIMEOUT,
            reaper_interval: DEFAULT_REAPER_INTERVAL,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            tool_whitelist: BUILTIN_TOOLS.iter().map(|name| name.to_string()).collect(),
            workspace_root: PathBuf::from("."),
        }
    }
}

impl AgentConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Reads a JSON settings file, then applies environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if env_flag(BYPASS_APPROVAL_ENV) {
            self.bypass_destructive_approval = true;
        }
        if let Some(max_sessions) = env_parse::<usize>(MAX_SESSIONS_ENV)? {
            if max_sessions == 0 {
                return Err(ConfigError::InvalidValue {
                    key: MAX_SESSIONS_ENV.to_string(),
                    value: "0".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            self.max_sessions = max_sessions;
        }
        if let Some(secs) = env_parse::<u64>(SESSION_IDLE_ENV)? {
            self.session_idle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>(SESSION_MAX_ENV)? {
            self.session_max_lifetime = Duration::from_secs(secs);
        }
        if let Some(bytes) = env_parse::<usize>(OUTPUT_BUFFER_ENV)? {
            self.output_buffer_cap = bytes;
        }
        if let Some(tools) = env_string_opt(TOOLS_ENV) {
            self.tool_whitelist = tools
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(root) = env_string_opt(WORKSPACE_ENV) {
            self.workspace_root = PathBuf::from(root);
        }
        Ok(())
    }

    #[must_use]
    pub fn with_bypass_destructive_approval(mut self, bypass: bool) -> Self {
        self.bypass_destructive_approval = bypass;
        self
    }

    #[must_use]
    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    #[must_use]
    pub fn with_session_expiry(mut self, idle_timeout: Duration, max_lifetime: Duration) -> Self {
        self.session_idle_timeout = idle_timeout;
        self.session_max_lifetime = max_lifetime;
        self
    }

    #[must_use]
    pub fn with_output_buffer_cap(mut self, bytes: usize) -> Self {
        self.output_buffer_cap = bytes;
        self
    }

    #[must_use]
    pub fn with_default_read_timeout(mut self, timeout: Duration) -> Self {
        self.default_read_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval = interval;
        self
    }

    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_tool_whitelist<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tool_whitelist = tools.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    /// The planning tool is always available.
    #[must_use]
    pub fn is_whitelisted(&self, tool: &str) -> bool {
        tool == PLAN || self.tool_whitelist.contains(tool)
    }

    /// Effective whitelist, including the planning tool.
    #[must_use]
    pub fn effective_whitelist(&self) -> BTreeSet<String> {
        let mut tools = self.tool_whitelist.clone();
        tools.insert(PLAN.to_string());
        tools
    }

    /// Session registry settings; sessions start in `cwd`.
    #[must_use]
    pub fn registry_config(&self, cwd: Option<PathBuf>) -> RegistryConfig {
        RegistryConfig {
            max_sessions: self.max_sessions,
            reaper_interval: self.reaper_interval,
            session: SessionOptions {
                expiry: ExpiryPolicy {
                    idle_timeout: self.session_idle_timeout,
                    max_lifetime: self.session_max_lifetime,
                },
                output_buffer_cap: self.output_buffer_cap,
                read_chunk_cap: self.read_chunk_cap,
                default_read_timeout: self.default_read_timeout,
                kill_grace: DEFAULT_KILL_GRACE,
                cwd,
            },
        }
    }
}

pub(crate) fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

pub(crate) fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = env_string_opt(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|error| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.clone(),
            reason: error.to_string(),
        })
}

/// Durations are whole seconds in settings files.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    const ALL_KEYS: [&str; 7] = [
        BYPASS_APPROVAL_ENV,
        MAX_SESSIONS_ENV,
        SESSION_IDLE_ENV,
        SESSION_MAX_ENV,
        OUTPUT_BUFFER_ENV,
        TOOLS_ENV,
        WORKSPACE_ENV,
    ];

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.previous {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock poisoned")
    }

    fn set_env_guard(key: &'static str, value: Option<&str>) -> EnvGuard {
        let previous = env::var(key).ok();
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
        EnvGuard { key, previous }
    }

    fn clear_all() -> Vec<EnvGuard> {
        ALL_KEYS
            .into_iter()
            .map(|key| set_env_guard(key, None))
            .collect()
    }

    #[test]
    fn env_defaults_match_documented_values() {
        let _lock = env_lock();
        let _guards = clear_all();

        let config = AgentConfig::from_env().expect("config");
        assert!(!config.bypass_destructive_approval);
        assert_eq!(config.max_sessions, 3);
        assert_eq!(config.session_idle_timeout, Duration::from_secs(30));
        assert_eq!(config.session_max_lifetime, Duration::from_secs(300));
        assert_eq!(config.output_buffer_cap, 256 * 1024);
        assert_eq!(config.read_chunk_cap, 4 * 1024);
        assert_eq!(config.tool_whitelist.len(), BUILTIN_TOOLS.len());
    }

    #[test]
    fn env_overrides_apply() {
        let _lock = env_lock();
        let _guards = clear_all();
        let _g1 = set_env_guard(BYPASS_APPROVAL_ENV, Some("1"));
        let _g2 = set_env_guard(MAX_SESSIONS_ENV, Some("5"));
        let _g3 = set_env_guard(SESSION_IDLE_ENV, Some("12"));
        let _g4 = set_env_guard(TOOLS_ENV, Some("read_file, session_read,,"));
        let _g5 = set_env_guard(WORKSPACE_ENV, Some("/tmp/work"));

        let config = AgentConfig::from_env().expect("config");
        assert!(config.bypass_destructive_approval);
        assert_eq!(config.max_sessions, 5);
        assert_eq!(config.session_idle_timeout, Duration::from_secs(12));
        assert_eq!(
            config.tool_whitelist,
            BTreeSet::from(["read_file".to_string(), "session_read".to_string()])
        );
        assert_eq!(config.workspace_root, PathBuf::from("/tmp/work"));
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let _lock = env_lock();
        let _guards = clear_all();
        let _g1 = set_env_guard(MAX_SESSIONS_ENV, Some("three"));

        let error = AgentConfig::from_env().expect_err("should reject");
        assert!(matches!(error, ConfigError::InvalidValue { ref key, .. } if key == MAX_SESSIONS_ENV));
    }

    #[test]
    fn bypass_flag_requires_exactly_one() {
        let _lock = env_lock();
        let _guards = clear_all();
        let _g1 = set_env_guard(BYPASS_APPROVAL_ENV, Some("true"));

        assert!(!AgentConfig::from_env().expect("config").bypass_destructive_approval);
    }

    #[test]
    fn plan_is_always_whitelisted() {
        let config = AgentConfig::default().with_tool_whitelist(["read_file"]);
        assert!(config.is_whitelisted("plan"));
        assert!(config.is_whitelisted("read_file"));
        assert!(!config.is_whitelisted("create_file"));
        assert!(config.effective_whitelist().contains("plan"));
    }

    #[test]
    fn settings_file_is_loaded_and_rejects_unknown_fields() {
        let _lock = env_lock();
        let _guards = clear_all();
        let dir = tempfile::tempdir().expect("tempdir");

        let good = dir.path().join("good.json");
        fs::write(&good, r#"{"max_sessions": 2, "session_idle_timeout": 9}"#).expect("write");
        let config = AgentConfig::load(&good).expect("load");
        assert_eq!(config.max_sessions, 2);
        assert_eq!(config.session_idle_timeout, Duration::from_secs(9));
        assert_eq!(config.session_max_lifetime, DEFAULT_MAX_LIFETIME);

        let bad = dir.path().join("bad.json");
        fs::write(&bad, r#"{"max_session": 2}"#).expect("write");
        assert!(matches!(AgentConfig::load(&bad), Err(ConfigError::Parse { .. })));
    }
}
