use rusqlite::Connection;

use crate::db;

pub const DEFAULT_AUTO_ADVANCE_MS: u64 = 300;
pub const DEFAULT_LOG_FILTER: &str = "info";
pub const AUTO_ADVANCE_SETTING: &str = "session.autoAdvanceMs";

const ENV_AUTO_ADVANCE_MS: &str = "ROLLCALLD_AUTO_ADVANCE_MS";
const ENV_LOG: &str = "ROLLCALLD_LOG";
const ENV_RUST_LOG: &str = "RUST_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub auto_advance_ms: u64,
    pub log_filter: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            auto_advance_ms: DEFAULT_AUTO_ADVANCE_MS,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl DaemonConfig {
    /// Reads overrides from the process environment. Returns the config and
    /// the list of values that were present but could not be used; logging
    /// is not up yet at this point so the caller reports them.
    pub fn from_env() -> (Self, Vec<String>) {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> (Self, Vec<String>) {
        let mut cfg = Self::default();
        let mut ignored = Vec::new();

        if let Some(raw) = lookup(ENV_AUTO_ADVANCE_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => cfg.auto_advance_ms = ms,
                Err(_) => ignored.push(format!("{}={:?}", ENV_AUTO_ADVANCE_MS, raw)),
            }
        }

        let filter = lookup(ENV_LOG)
            .or_else(|| lookup(ENV_RUST_LOG))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if let Some(f) = filter {
            cfg.log_filter = f;
        }

        (cfg, ignored)
    }

    /// Auto-advance delay for new sessions: the workspace setting when one is
    /// stored, otherwise the daemon value.
    pub fn effective_auto_advance_ms(&self, conn: Option<&Connection>) -> anyhow::Result<u64> {
        let Some(conn) = conn else {
            return Ok(self.auto_advance_ms);
        };
        let stored = db::settings_get_json(conn, AUTO_ADVANCE_SETTING)?;
        Ok(stored
            .and_then(|v| v.as_u64())
            .unwrap_or(self.auto_advance_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let (cfg, ignored) = DaemonConfig::from_lookup(lookup_from(&[]));
        assert_eq!(cfg, DaemonConfig::default());
        assert_eq!(cfg.auto_advance_ms, 300);
        assert!(ignored.is_empty());
    }

    #[test]
    fn env_overrides_and_log_precedence() {
        let (cfg, _) = DaemonConfig::from_lookup(lookup_from(&[
            ("ROLLCALLD_AUTO_ADVANCE_MS", "0"),
            ("ROLLCALLD_LOG", "rollcalld=debug"),
            ("RUST_LOG", "warn"),
        ]));
        assert_eq!(cfg.auto_advance_ms, 0);
        assert_eq!(cfg.log_filter, "rollcalld=debug");

        let (cfg, _) = DaemonConfig::from_lookup(lookup_from(&[("RUST_LOG", "warn")]));
        assert_eq!(cfg.log_filter, "warn");
    }

    #[test]
    fn malformed_delay_is_reported_and_ignored() {
        let (cfg, ignored) =
            DaemonConfig::from_lookup(lookup_from(&[("ROLLCALLD_AUTO_ADVANCE_MS", "soon")]));
        assert_eq!(cfg.auto_advance_ms, DEFAULT_AUTO_ADVANCE_MS);
        assert_eq!(ignored.len(), 1);
        assert!(ignored[0].contains("soon"));
    }

    #[test]
    fn workspace_setting_wins_over_daemon_value() {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("schema");
        let cfg = DaemonConfig::default();
        assert_eq!(cfg.effective_auto_advance_ms(Some(&conn)).expect("read"), 300);
        assert_eq!(cfg.effective_auto_advance_ms(None).expect("read"), 300);

        db::settings_set_json(&conn, AUTO_ADVANCE_SETTING, &serde_json::json!(150))
            .expect("write");
        assert_eq!(cfg.effective_auto_advance_ms(Some(&conn)).expect("read"), 150);
    }
}
