//! Broker-wide configuration, loaded once at startup from environment
//! variables under the `TASKBROKER_` prefix.
//!
//! Loading never fails: every key is optional, and a malformed value logs
//! a `tracing::warn!` and falls back to its documented default rather than
//! aborting startup. There is no config file and no search path — this is
//! intentionally the original's `CAM_*` environment scheme renamed, not a
//! file-based loader.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// How the broker reacts to `SIGINT` (Ctrl-C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigintMode {
    /// Cancel in-flight requests; exit only if none are running.
    #[default]
    Cancel,
    /// Always request a graceful shutdown.
    Exit,
    /// Cancel in-flight requests on the first tap; a second tap within the
    /// double-tap window forces shutdown.
    CancelThenExit,
}

impl FromStr for SigintMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cancel" => Ok(SigintMode::Cancel),
            "exit" => Ok(SigintMode::Exit),
            "cancel_then_exit" => Ok(SigintMode::CancelThenExit),
            other => Err(format!("unknown sigint mode: {other}")),
        }
    }
}

impl fmt::Display for SigintMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SigintMode::Cancel => "cancel",
            SigintMode::Exit => "exit",
            SigintMode::CancelThenExit => "cancel_then_exit",
        };
        f.write_str(s)
    }
}

/// Broker-wide settings. Construct via [`Config::from_env`]; [`Config::from_map`]
/// exists purely so tests can exercise the parsing rules without mutating
/// the real process environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Lower-cased whitelist of exposed tool base names (`claude`, not
    /// `claude_parallel`). Empty means every kind is enabled.
    pub enable: Vec<String>,
    /// Lower-cased blacklist, applied after the whitelist.
    pub disable: Vec<String>,
    pub sigint_mode: SigintMode,
    pub sigint_double_tap_window: f64,
    pub gui_enabled: bool,
    pub gui_host: String,
    pub gui_port: u16,
    pub gui_max_clients: usize,
    pub gui_grace_period_secs: f64,
    pub debug: bool,
    pub log_debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            enable: Vec::new(),
            disable: Vec::new(),
            sigint_mode: SigintMode::Cancel,
            sigint_double_tap_window: 1.0,
            gui_enabled: true,
            gui_host: "127.0.0.1".to_string(),
            gui_port: 0,
            gui_max_clients: 10,
            gui_grace_period_secs: 10.0,
            debug: false,
            log_debug: false,
        }
    }
}

impl Config {
    /// Loads configuration from the real process environment. Never fails.
    pub fn from_env() -> Self {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_map(&vars)
    }

    /// Loads configuration from an explicit map, for tests. Same parsing
    /// and fallback rules as [`Config::from_env`].
    pub fn from_map(vars: &HashMap<String, String>) -> Self {
        let defaults = Config::default();

        let enable = vars
            .get("TASKBROKER_ENABLE")
            .map(|v| split_csv(v))
            .unwrap_or_default();
        let disable = vars
            .get("TASKBROKER_DISABLE")
            .map(|v| split_csv(v))
            .unwrap_or_default();

        let sigint_mode = vars
            .get("TASKBROKER_SIGINT_MODE")
            .map(|v| {
                v.parse().unwrap_or_else(|_| {
                    tracing::warn!(value = %v, "invalid TASKBROKER_SIGINT_MODE, falling back to cancel");
                    SigintMode::Cancel
                })
            })
            .unwrap_or(defaults.sigint_mode);

        let sigint_double_tap_window = vars
            .get("TASKBROKER_SIGINT_DOUBLE_TAP_WINDOW")
            .map(|v| parse_clamped_f64(v, defaults.sigint_double_tap_window, 0.1, 10.0))
            .unwrap_or(defaults.sigint_double_tap_window);

        let gui_enabled = vars
            .get("TASKBROKER_GUI")
            .map(|v| parse_bool(v))
            .unwrap_or(defaults.gui_enabled);

        let gui_host = vars
            .get("TASKBROKER_GUI_HOST")
            .cloned()
            .unwrap_or(defaults.gui_host);

        let gui_port = vars
            .get("TASKBROKER_GUI_PORT")
            .map(|v| {
                v.parse::<u16>().unwrap_or_else(|_| {
                    tracing::warn!(value = %v, "invalid TASKBROKER_GUI_PORT, falling back to ephemeral");
                    defaults.gui_port
                })
            })
            .unwrap_or(defaults.gui_port);

        let gui_max_clients = vars
            .get("TASKBROKER_GUI_MAX_CLIENTS")
            .map(|v| {
                v.parse::<usize>().unwrap_or_else(|_| {
                    tracing::warn!(value = %v, "invalid TASKBROKER_GUI_MAX_CLIENTS, falling back to default");
                    defaults.gui_max_clients
                })
            })
            .unwrap_or(defaults.gui_max_clients);

        let gui_grace_period_secs = vars
            .get("TASKBROKER_GUI_GRACE_PERIOD_SECS")
            .map(|v| {
                v.parse::<f64>().unwrap_or_else(|_| {
                    tracing::warn!(value = %v, "invalid TASKBROKER_GUI_GRACE_PERIOD_SECS, falling back to default");
                    defaults.gui_grace_period_secs
                })
            })
            .unwrap_or(defaults.gui_grace_period_secs);

        let debug = vars.get("TASKBROKER_DEBUG").map(|v| parse_bool(v)).unwrap_or(defaults.debug);
        let log_debug = vars
            .get("TASKBROKER_LOG_DEBUG")
            .map(|v| parse_bool(v))
            .unwrap_or(defaults.log_debug);

        Config {
            enable,
            disable,
            sigint_mode,
            sigint_double_tap_window,
            gui_enabled,
            gui_host,
            gui_port,
            gui_max_clients,
            gui_grace_period_secs,
            debug,
            log_debug,
        }
    }

    /// Whether a tool base name (`claude`, not `claude_parallel`) should be
    /// exposed: the whitelist applies first (empty = everything passes),
    /// then the blacklist removes names from what's left.
    pub fn is_tool_enabled(&self, base_name: &str) -> bool {
        let name = base_name.to_ascii_lowercase();
        let allowed = self.enable.is_empty() || self.enable.iter().any(|e| e == &name);
        let denied = self.disable.iter().any(|d| d == &name);
        allowed && !denied
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Permissive boolean parsing: `true`/`1`/`yes`/`on` (case-insensitive) is
/// true, everything else is false.
fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

fn parse_clamped_f64(value: &str, default: f64, min: f64, max: f64) -> f64 {
    match value.parse::<f64>() {
        Ok(v) => v.clamp(min, max),
        Err(_) => {
            tracing::warn!(value = %value, "invalid float value, falling back to default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_when_env_empty() {
        let cfg = Config::from_map(&HashMap::new());
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn unrecognised_sigint_mode_warns_and_falls_back() {
        let cfg = Config::from_map(&map(&[("TASKBROKER_SIGINT_MODE", "bogus")]));
        assert_eq!(cfg.sigint_mode, SigintMode::Cancel);
    }

    #[test]
    fn sigint_mode_parses_all_variants() {
        for (s, expected) in [
            ("cancel", SigintMode::Cancel),
            ("exit", SigintMode::Exit),
            ("cancel_then_exit", SigintMode::CancelThenExit),
        ] {
            let cfg = Config::from_map(&map(&[("TASKBROKER_SIGINT_MODE", s)]));
            assert_eq!(cfg.sigint_mode, expected);
        }
    }

    #[test]
    fn double_tap_window_clamped_to_range() {
        let cfg = Config::from_map(&map(&[("TASKBROKER_SIGINT_DOUBLE_TAP_WINDOW", "50.0")]));
        assert_eq!(cfg.sigint_double_tap_window, 10.0);

        let cfg = Config::from_map(&map(&[("TASKBROKER_SIGINT_DOUBLE_TAP_WINDOW", "0.001")]));
        assert_eq!(cfg.sigint_double_tap_window, 0.1);
    }

    #[test]
    fn bool_parsing_is_permissive() {
        for truthy in ["true", "TRUE", "1", "yes", "on", "ON"] {
            assert!(parse_bool(truthy), "{truthy} should parse true");
        }
        for falsy in ["false", "0", "no", "off", "garbage"] {
            assert!(!parse_bool(falsy), "{falsy} should parse false");
        }
    }

    #[test]
    fn enable_whitelist_restricts_tools() {
        let cfg = Config::from_map(&map(&[("TASKBROKER_ENABLE", "claude, Codex")]));
        assert!(cfg.is_tool_enabled("claude"));
        assert!(cfg.is_tool_enabled("codex"));
        assert!(!cfg.is_tool_enabled("gemini"));
    }

    #[test]
    fn disable_blacklist_applies_after_whitelist() {
        let cfg = Config::from_map(&map(&[
            ("TASKBROKER_ENABLE", "claude,codex"),
            ("TASKBROKER_DISABLE", "codex"),
        ]));
        assert!(cfg.is_tool_enabled("claude"));
        assert!(!cfg.is_tool_enabled("codex"));
    }

    #[test]
    fn empty_whitelist_means_all_enabled() {
        let cfg = Config::default();
        for name in ["claude", "codex", "gemini", "opencode"] {
            assert!(cfg.is_tool_enabled(name));
        }
    }

    #[test]
    fn invalid_gui_port_falls_back_to_ephemeral() {
        let cfg = Config::from_map(&map(&[("TASKBROKER_GUI_PORT", "not-a-port")]));
        assert_eq!(cfg.gui_port, 0);
    }
}
