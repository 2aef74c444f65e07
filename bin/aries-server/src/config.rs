//! Server configuration, loaded from environment variables at startup.

use std::time::Duration;

/// Environment variable holding the upstream provider credential.
pub const API_KEY_VAR: &str = "GOOGLE_GENERATIVE_AI_API_KEY";

/// Runtime configuration for aries-server.
///
/// Every field except the upstream credential has a default, so the gate
/// starts without any environment. A missing credential is not a startup
/// error: chat requests answer 503 until it is set.
#[derive(Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`).
    pub bind_address: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Comma-separated allowed origins; `None` allows any origin.
    pub cors_allowed_origins: Option<String>,

    /// Serve the OpenAPI document at `/api-docs/openapi.json`.
    pub enable_docs: bool,

    /// Requests allowed per caller per window.
    pub rate_limit_max: u32,

    /// Length of the rate-limit window.
    pub rate_limit_window: Duration,

    /// Upstream API credential.
    pub api_key: Option<String>,

    /// Upstream model name.
    pub model: String,

    /// Base URL of the upstream generation API.
    pub upstream_base_url: String,

    /// Upper bound on one upstream call, body included.
    pub upstream_timeout: Duration,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build [`Config`] from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());

        Self {
            bind_address: env_or("ARIES_BIND", "0.0.0.0:3000"),
            log_level: env_or("ARIES_LOG", "info"),
            log_json: parse_flag(lookup("ARIES_LOG_JSON"), false),
            cors_allowed_origins: lookup("ARIES_CORS_ORIGINS").filter(|v| !v.trim().is_empty()),
            enable_docs: parse_flag(lookup("ARIES_ENABLE_DOCS"), true),
            rate_limit_max: parse_positive_or(lookup("ARIES_RATE_LIMIT_MAX"), 10),
            rate_limit_window: Duration::from_secs(parse_positive_or(
                lookup("ARIES_RATE_LIMIT_WINDOW_SECS"),
                60,
            )),
            api_key: lookup(API_KEY_VAR).filter(|v| !v.trim().is_empty()),
            model: env_or("ARIES_MODEL", "gemini-2.0-flash"),
            upstream_base_url: env_or(
                "ARIES_UPSTREAM_BASE_URL",
                "https://generativelanguage.googleapis.com/v1beta",
            ),
            upstream_timeout: Duration::from_secs(parse_or(
                lookup("ARIES_UPSTREAM_TIMEOUT_SECS"),
                30,
            )),
        }
    }
}

// Hand-written so the credential never reaches the logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("log_level", &self.log_level)
            .field("log_json", &self.log_json)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("enable_docs", &self.enable_docs)
            .field("rate_limit_max", &self.rate_limit_max)
            .field("rate_limit_window", &self.rate_limit_window)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("upstream_base_url", &self.upstream_base_url)
            .field("upstream_timeout", &self.upstream_timeout)
            .finish()
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// Like [`parse_or`], but zero also falls back: a zero limit or window would
/// either admit nothing or never reset.
fn parse_positive_or<T>(value: Option<String>, default: T) -> T
where
    T: std::str::FromStr + Default + PartialEq + Copy,
{
    let parsed = parse_or(value, default);
    if parsed == T::default() { default } else { parsed }
}

fn parse_flag(value: Option<String>, default: bool) -> bool {
    value
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_match_the_published_limits() {
        let cfg = config_with(&[]);
        assert_eq!(cfg.bind_address, "0.0.0.0:3000");
        assert_eq!(cfg.rate_limit_max, 10);
        assert_eq!(cfg.rate_limit_window, Duration::from_secs(60));
        assert_eq!(cfg.upstream_timeout, Duration::from_secs(30));
        assert_eq!(cfg.model, "gemini-2.0-flash");
        assert!(cfg.api_key.is_none());
        assert!(cfg.enable_docs);
        assert!(!cfg.log_json);
    }

    #[test]
    fn blank_credential_counts_as_missing() {
        let cfg = config_with(&[(API_KEY_VAR, "   ")]);
        assert!(cfg.api_key.is_none());
    }

    #[test]
    fn overrides_are_applied_and_garbage_ignored() {
        let cfg = config_with(&[
            ("ARIES_RATE_LIMIT_MAX", "25"),
            ("ARIES_RATE_LIMIT_WINDOW_SECS", "soon"),
            ("ARIES_LOG_JSON", "TRUE"),
            ("ARIES_ENABLE_DOCS", "0"),
        ]);
        assert_eq!(cfg.rate_limit_max, 25);
        assert_eq!(cfg.rate_limit_window, Duration::from_secs(60));
        assert!(cfg.log_json);
        assert!(!cfg.enable_docs);
    }

    #[test]
    fn zero_rate_limits_fall_back_to_defaults() {
        let cfg = config_with(&[
            ("ARIES_RATE_LIMIT_MAX", "0"),
            ("ARIES_RATE_LIMIT_WINDOW_SECS", "0"),
        ]);
        assert_eq!(cfg.rate_limit_max, 10);
        assert_eq!(cfg.rate_limit_window, Duration::from_secs(60));
    }

    #[test]
    fn debug_output_redacts_the_credential() {
        let cfg = config_with(&[(API_KEY_VAR, "secret-key")]);
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("secret-key"));
        assert!(rendered.contains("<redacted>"));
    }
}
