use std::path::PathBuf;

pub const ENV_WORKSPACE: &str = "JURNALD_WORKSPACE";
pub const ENV_LOG: &str = "JURNALD_LOG";
pub const DEFAULT_LOG_FILTER: &str = "jurnald=info";

/// Process-level settings read once at startup. Per-workspace settings live in
/// the `settings` table instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Workspace opened before the first request, if any.
    pub workspace: Option<PathBuf>,
    pub log_filter: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            workspace: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(v) = lookup(ENV_WORKSPACE) {
            let v = v.trim();
            if !v.is_empty() {
                cfg.workspace = Some(PathBuf::from(v));
            }
        }
        if let Some(v) = lookup(ENV_LOG) {
            let v = v.trim();
            if !v.is_empty() {
                cfg.log_filter = v.to_string();
            }
        }
        cfg
    }
}
