//! Configuration loading for Everclaw.
//!
//! Loaded once at startup from the environment and threaded through the
//! runtime explicitly — no module-level mutability. Invalid numeric values
//! fall back to their defaults with a warning rather than aborting.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// The runtime configuration record.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Identity label used in the default system prompt.
    pub agent_name: String,

    /// Workspace root: sessions, memory files, and tool sandbox all live here.
    pub workspace: PathBuf,

    /// Provider selector ("anthropic" or "openai").
    pub llm_provider: String,

    /// Model identifier passed to the gateway.
    pub model: String,

    /// API key for the provider.
    pub llm_api_key: Option<String>,

    /// Optional provider base-URL override (proxies, self-hosted gateways).
    pub llm_base_url: Option<String>,

    /// Hard upper bound on loop iterations per run.
    pub max_iterations: u32,

    /// Compactor tuning.
    pub compaction_max_tokens: usize,
    pub compaction_threshold: f64,
    pub keep_recent_tokens: usize,

    /// Heartbeat schedule (5-field cron) and daily-log retention.
    pub heartbeat_cron: String,
    pub memory_retention_days: u32,

    /// Channel credentials.
    pub telegram_bot_token: Option<String>,
    pub slack_bot_token: Option<String>,

    /// Address the webhook ingest server binds to.
    pub ingest_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent_name: "Everclaw".into(),
            workspace: PathBuf::from("./workspace"),
            llm_provider: "anthropic".into(),
            model: "claude-sonnet-4-20250514".into(),
            llm_api_key: None,
            llm_base_url: None,
            max_iterations: 20,
            compaction_max_tokens: 150_000,
            compaction_threshold: 0.8,
            keep_recent_tokens: 20_000,
            heartbeat_cron: "*/30 * * * *".into(),
            memory_retention_days: 30,
            telegram_bot_token: None,
            slack_bot_token: None,
            ingest_addr: "0.0.0.0:8420".into(),
        }
    }
}

impl Config {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            agent_name: env_string("AGENT_NAME").unwrap_or(defaults.agent_name),
            workspace: env_string("AGENT_WORKSPACE")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace),
            llm_provider: env_string("LLM_PROVIDER").unwrap_or(defaults.llm_provider),
            model: env_string("AGENT_MODEL").unwrap_or(defaults.model),
            llm_api_key: env_string("LLM_API_KEY"),
            llm_base_url: env_string("LLM_BASE_URL"),
            max_iterations: env_parsed("MAX_ITERATIONS", defaults.max_iterations),
            compaction_max_tokens: env_parsed(
                "COMPACTION_MAX_TOKENS",
                defaults.compaction_max_tokens,
            ),
            compaction_threshold: env_parsed("COMPACTION_THRESHOLD", defaults.compaction_threshold),
            keep_recent_tokens: env_parsed("KEEP_RECENT_TOKENS", defaults.keep_recent_tokens),
            heartbeat_cron: env_string("HEARTBEAT_CRON").unwrap_or(defaults.heartbeat_cron),
            memory_retention_days: env_parsed(
                "MEMORY_RETENTION_DAYS",
                defaults.memory_retention_days,
            ),
            telegram_bot_token: env_string("TELEGRAM_BOT_TOKEN"),
            slack_bot_token: env_string("SLACK_BOT_TOKEN"),
            ingest_addr: env_string("INGEST_ADDR").unwrap_or(defaults.ingest_addr),
        }
    }

    /// Where session JSONL files live.
    pub fn sessions_dir(&self) -> PathBuf {
        self.workspace.join("sessions")
    }

    /// Where daily memory logs live.
    pub fn memory_dir(&self) -> PathBuf {
        self.workspace.join("memory")
    }
}

fn env_string(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

fn env_parsed<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                warn!(key, value = %raw, "Unparseable config value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("agent_name", &self.agent_name)
            .field("workspace", &self.workspace)
            .field("llm_provider", &self.llm_provider)
            .field("model", &self.model)
            .field("llm_api_key", &redact(&self.llm_api_key))
            .field("llm_base_url", &self.llm_base_url)
            .field("max_iterations", &self.max_iterations)
            .field("compaction_max_tokens", &self.compaction_max_tokens)
            .field("compaction_threshold", &self.compaction_threshold)
            .field("keep_recent_tokens", &self.keep_recent_tokens)
            .field("heartbeat_cron", &self.heartbeat_cron)
            .field("memory_retention_days", &self.memory_retention_days)
            .field("telegram_bot_token", &redact(&self.telegram_bot_token))
            .field("slack_bot_token", &redact(&self.slack_bot_token))
            .field("ingest_addr", &self.ingest_addr)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.max_iterations, 20);
        assert_eq!(cfg.compaction_max_tokens, 150_000);
        assert!((cfg.compaction_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(cfg.keep_recent_tokens, 20_000);
        assert_eq!(cfg.heartbeat_cron, "*/30 * * * *");
        assert_eq!(cfg.memory_retention_days, 30);
    }

    #[test]
    fn secrets_redacted_in_debug() {
        let cfg = Config {
            llm_api_key: Some("sk-secret".into()),
            telegram_bot_token: Some("123:token".into()),
            ..Config::default()
        };
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("123:token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn derived_paths() {
        let cfg = Config {
            workspace: PathBuf::from("/tmp/ec"),
            ..Config::default()
        };
        assert_eq!(cfg.sessions_dir(), PathBuf::from("/tmp/ec/sessions"));
        assert_eq!(cfg.memory_dir(), PathBuf::from("/tmp/ec/memory"));
    }
}
