//! Server configuration: per-connection gateway knobs and the
//! environment-driven [`ServerConfig`] used by binaries.

use std::str::FromStr;
use std::time::Duration;

use duochat_session::SessionConfig;

use crate::DuochatError;

/// Default interval between maintenance sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// How each connection's gateway behaves.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Length of a ban issued when the content filter flags a message.
    pub ban_duration: Duration,

    /// A connection with no inbound frame for this long is closed. Off by
    /// default: waiting and read-only users are legitimately silent.
    pub idle_timeout: Option<Duration>,

    /// Longest chat message accepted, in characters after trimming.
    /// Longer messages are dropped.
    pub max_message_len: usize,

    /// Enter matchmaking as soon as the user connects, without waiting
    /// for `find_partner`.
    pub auto_match: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            ban_duration: Duration::from_secs(3600),
            idle_timeout: None,
            max_message_len: 2000,
            auto_match: true,
        }
    }
}

/// Everything a server binary needs, read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub ws_addr: String,
    pub http_addr: String,
    pub session: SessionConfig,
    pub gateway: GatewayConfig,
    pub sweep_interval: Duration,
    /// Words the default content filter flags. Empty means no filter.
    pub blocked_words: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_addr: "127.0.0.1:8080".to_string(),
            http_addr: "127.0.0.1:8081".to_string(),
            session: SessionConfig::default(),
            gateway: GatewayConfig::default(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            blocked_words: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Loads `.env` if present, then reads:
    ///
    /// | variable | default |
    /// |---|---|
    /// | `WS_ADDR` | `127.0.0.1:8080` |
    /// | `HTTP_ADDR` | `127.0.0.1:8081` |
    /// | `BAN_DURATION_SECS` | `3600` |
    /// | `RESUME_GRACE_SECS` | `3600` |
    /// | `IDLE_TIMEOUT_SECS` | unset: no timeout (`0` also disables) |
    /// | `MAX_MESSAGE_LEN` | `2000` |
    /// | `SWEEP_INTERVAL_SECS` | `30` |
    /// | `BLOCKED_WORDS` | empty (comma-separated) |
    ///
    /// # Errors
    /// [`DuochatError::Config`] if a numeric variable doesn't parse.
    pub fn from_env() -> Result<Self, DuochatError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but reads variables through
    /// `lookup`.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, DuochatError> {
        let defaults = Self::default();
        let secs = |key: &'static str, default: Duration| {
            parse_or(&lookup, key, default.as_secs()).map(Duration::from_secs)
        };

        Ok(Self {
            ws_addr: lookup("WS_ADDR").unwrap_or(defaults.ws_addr),
            http_addr: lookup("HTTP_ADDR").unwrap_or(defaults.http_addr),
            session: SessionConfig {
                resume_grace_secs: parse_or(
                    &lookup,
                    "RESUME_GRACE_SECS",
                    defaults.session.resume_grace_secs,
                )?,
            },
            gateway: GatewayConfig {
                ban_duration: secs(
                    "BAN_DURATION_SECS",
                    defaults.gateway.ban_duration,
                )?,
                idle_timeout: parse_or(
                    &lookup,
                    "IDLE_TIMEOUT_SECS",
                    defaults.gateway.idle_timeout.map_or(0, |d| d.as_secs()),
                )
                .map(|secs| (secs > 0).then(|| Duration::from_secs(secs)))?,
                max_message_len: parse_or(
                    &lookup,
                    "MAX_MESSAGE_LEN",
                    defaults.gateway.max_message_len,
                )?,
                auto_match: defaults.gateway.auto_match,
            },
            sweep_interval: secs(
                "SWEEP_INTERVAL_SECS",
                defaults.sweep_interval,
            )?,
            blocked_words: lookup("BLOCKED_WORDS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|w| !w.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, DuochatError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| DuochatError::Config { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_empty_uses_defaults() {
        let config = ServerConfig::from_lookup(env(&[])).unwrap();

        assert_eq!(config.ws_addr, "127.0.0.1:8080");
        assert_eq!(config.gateway.ban_duration, Duration::from_secs(3600));
        assert_eq!(config.gateway.max_message_len, 2000);
        assert_eq!(config.session.resume_grace_secs, 3600);
        assert_eq!(config.sweep_interval, DEFAULT_SWEEP_INTERVAL);
        assert!(config.gateway.auto_match);
        assert_eq!(config.gateway.idle_timeout, None);
        assert!(config.blocked_words.is_empty());
    }

    #[test]
    fn test_from_lookup_zero_idle_timeout_disables_it() {
        let config =
            ServerConfig::from_lookup(env(&[("IDLE_TIMEOUT_SECS", "0")])).unwrap();

        assert_eq!(config.gateway.idle_timeout, None);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ServerConfig::from_lookup(env(&[
            ("WS_ADDR", "0.0.0.0:9000"),
            ("BAN_DURATION_SECS", "60"),
            ("IDLE_TIMEOUT_SECS", " 5 "),
            ("MAX_MESSAGE_LEN", "280"),
            ("BLOCKED_WORDS", "spam, scam,,"),
        ]))
        .unwrap();

        assert_eq!(config.ws_addr, "0.0.0.0:9000");
        assert_eq!(config.gateway.ban_duration, Duration::from_secs(60));
        assert_eq!(config.gateway.idle_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.gateway.max_message_len, 280);
        assert_eq!(config.blocked_words, vec!["spam", "scam"]);
    }

    #[test]
    fn test_from_lookup_bad_number_returns_config_error() {
        let result =
            ServerConfig::from_lookup(env(&[("SWEEP_INTERVAL_SECS", "soon")]));

        assert!(matches!(
            result,
            Err(DuochatError::Config { key: "SWEEP_INTERVAL_SECS", .. })
        ));
    }
}
