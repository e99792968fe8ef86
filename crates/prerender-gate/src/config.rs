//! Configuration types and loading logic.
//!
//! [`GateConfig`] is the raw, deserializable form loaded from TOML and the
//! environment. [`PrerenderSettings`] is the validated form the middleware
//! reads on every request: patterns compiled, URLs checked, env fallbacks
//! applied. It is built once and never mutated.

use std::str::FromStr;
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use prerender_tracing::TracingConfig;
use serde::Deserialize;

use crate::classify::EligibilityLists;
use crate::error::ConfigError;

/// Top-level gate configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub prerender: PrerenderConfig,
    #[serde(default)]
    pub shadow: ShadowConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
}

/// Listener and origin application configuration for the host binary.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Application that answers every request the gate does not render.
    #[serde(default = "default_origin_url")]
    pub origin_url: String,

    #[serde(default = "default_origin_timeout")]
    pub origin_timeout_secs: u64,
}

/// Authoritative render service and eligibility configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PrerenderConfig {
    #[serde(default = "default_service_url")]
    pub service_url: String,

    /// Sent as `X-Prerender-Token`. Falls back to `PRERENDER_TOKEN`.
    #[serde(default)]
    pub token: Option<String>,

    /// Forces the scheme of the reconstructed page URL.
    #[serde(default)]
    pub protocol: Option<String>,

    /// Forces the host of the reconstructed page URL.
    #[serde(default)]
    pub host: Option<String>,

    /// Copy inbound request headers (minus `host`) onto render requests.
    #[serde(default)]
    pub forward_headers: bool,

    #[serde(default)]
    pub whitelist: Option<PatternList>,

    #[serde(default)]
    pub blacklist: Option<PatternList>,

    #[serde(default)]
    pub engine: Engine,

    #[serde(default = "default_render_timeout")]
    pub timeout_secs: u64,

    /// Log computed backend URLs at info level instead of debug.
    #[serde(default)]
    pub log_targets: bool,
}

/// Shadow render service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ShadowConfig {
    /// Empty disables the shadow service.
    #[serde(default)]
    pub service_url: String,

    #[serde(default = "default_render_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

/// One pattern or a list of patterns.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PatternList {
    One(String),
    Many(Vec<String>),
}

impl PatternList {
    pub fn patterns(&self) -> &[String] {
        match self {
            PatternList::One(pattern) => std::slice::from_ref(pattern),
            PatternList::Many(patterns) => patterns,
        }
    }
}

/// Which render service's response reaches the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// The primary service is authoritative; the shadow service is observed.
    #[default]
    Prerender,
    /// The shadow service is authoritative; the primary service is observed.
    #[serde(alias = "renderly")]
    Shadow,
}

impl FromStr for Engine {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "prerender" => Ok(Engine::Prerender),
            "shadow" | "renderly" => Ok(Engine::Shadow),
            other => Err(ConfigError::UnknownEngine(other.to_string())),
        }
    }
}

fn default_listen_address() -> String {
    "0.0.0.0:3080".to_string()
}

fn default_origin_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_origin_timeout() -> u64 {
    30
}

fn default_service_url() -> String {
    "https://service.prerender.io/".to_string()
}

fn default_render_timeout() -> u64 {
    10
}

fn default_max_concurrent() -> usize {
    50
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            origin_url: default_origin_url(),
            origin_timeout_secs: default_origin_timeout(),
        }
    }
}

impl Default for PrerenderConfig {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            token: None,
            protocol: None,
            host: None,
            forward_headers: false,
            whitelist: None,
            blacklist: None,
            engine: Engine::default(),
            timeout_secs: default_render_timeout(),
            log_targets: false,
        }
    }
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            service_url: String::new(),
            timeout_secs: default_render_timeout(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl GateConfig {
    /// Load configuration from TOML file and environment variables.
    ///
    /// Priority (highest to lowest):
    /// 1. `PRERENDER_SERVICE_URL`, `PRERENDER_SHADOW_SERVICE_URL`,
    ///    `PRERENDER_TOKEN`, `PRERENDER_ENGINE`
    /// 2. Environment variables (PRERENDER_GATE_ prefix, __ for nesting)
    /// 3. TOML config file
    /// 4. Defaults
    pub fn load(config_path: &str) -> anyhow::Result<Self> {
        let mut config: GateConfig = Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("PRERENDER_GATE_").split("__"))
            .extract()?;

        // Direct env var overrides, named as the render services expect them
        if let Ok(url) = std::env::var("PRERENDER_SERVICE_URL") {
            config.prerender.service_url = url;
        }
        if let Ok(url) = std::env::var("PRERENDER_SHADOW_SERVICE_URL") {
            config.shadow.service_url = url;
        }
        if let Ok(token) = std::env::var("PRERENDER_TOKEN") {
            config.prerender.token = Some(token);
        }
        if let Ok(engine) = std::env::var("PRERENDER_ENGINE") {
            config.prerender.engine = engine.parse()?;
        }

        Ok(config)
    }
}

/// Validated, immutable settings read by the middleware on every request.
#[derive(Debug, Clone)]
pub struct PrerenderSettings {
    pub service_url: String,
    /// `None` when the shadow service is not configured.
    pub shadow_service_url: Option<String>,
    pub token: Option<String>,
    pub protocol: Option<String>,
    pub host: Option<String>,
    pub forward_headers: bool,
    pub lists: EligibilityLists,
    pub engine: Engine,
    pub timeout: Duration,
    pub shadow_timeout: Duration,
    pub shadow_max_concurrent: usize,
    pub log_targets: bool,
}

impl PrerenderSettings {
    /// Validate raw configuration and compile the eligibility lists.
    pub fn from_config(
        prerender: &PrerenderConfig,
        shadow: &ShadowConfig,
    ) -> Result<Self, ConfigError> {
        let service_url = check_service_url("primary", &prerender.service_url)?;

        let shadow_service_url = match shadow.service_url.trim() {
            "" => None,
            url => Some(check_service_url("shadow", url)?),
        };

        if prerender.engine == Engine::Shadow && shadow_service_url.is_none() {
            return Err(ConfigError::MissingShadowService);
        }

        let token = prerender
            .token
            .clone()
            .or_else(|| std::env::var("PRERENDER_TOKEN").ok())
            .filter(|t| !t.is_empty());

        let lists = EligibilityLists::new(
            prerender.whitelist.as_ref().map(PatternList::patterns),
            prerender.blacklist.as_ref().map(PatternList::patterns),
        )?;

        Ok(Self {
            service_url,
            shadow_service_url,
            token,
            protocol: prerender.protocol.clone().filter(|p| !p.is_empty()),
            host: prerender.host.clone().filter(|h| !h.is_empty()),
            forward_headers: prerender.forward_headers,
            lists,
            engine: prerender.engine,
            timeout: Duration::from_secs(prerender.timeout_secs),
            shadow_timeout: Duration::from_secs(shadow.timeout_secs),
            shadow_max_concurrent: shadow.max_concurrent,
            log_targets: prerender.log_targets,
        })
    }
}

fn check_service_url(name: &'static str, url: &str) -> Result<String, ConfigError> {
    match url::Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(url.to_string()),
        _ => Err(ConfigError::InvalidServiceUrl {
            name,
            url: url.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(toml: &str) -> GateConfig {
        Figment::new()
            .merge(Toml::string(toml))
            .extract()
            .expect("config should parse")
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = from_toml("");
        assert_eq!(config.server.listen_address, "0.0.0.0:3080");
        assert_eq!(config.prerender.service_url, "https://service.prerender.io/");
        assert_eq!(config.prerender.engine, Engine::Prerender);
        assert!(config.shadow.service_url.is_empty());
        assert!(config.prerender.whitelist.is_none());
    }

    #[test]
    fn test_pattern_list_accepts_string_or_list() {
        let config = from_toml(
            r#"
            [prerender]
            whitelist = "^/blog"
            blacklist = ["/admin", "/checkout"]
            "#,
        );
        assert_eq!(
            config.prerender.whitelist.as_ref().unwrap().patterns(),
            ["^/blog".to_string()]
        );
        assert_eq!(config.prerender.blacklist.as_ref().unwrap().patterns().len(), 2);
    }

    #[test]
    fn test_engine_alias() {
        let config = from_toml(
            r#"
            [prerender]
            engine = "renderly"
            "#,
        );
        assert_eq!(config.prerender.engine, Engine::Shadow);
        assert_eq!("PRERENDER".parse::<Engine>().unwrap(), Engine::Prerender);
        assert!(matches!(
            "chromium".parse::<Engine>(),
            Err(ConfigError::UnknownEngine(name)) if name == "chromium"
        ));
    }

    #[test]
    fn test_settings_disable_empty_shadow() {
        let settings =
            PrerenderSettings::from_config(&PrerenderConfig::default(), &ShadowConfig::default())
                .unwrap();
        assert!(settings.shadow_service_url.is_none());
        assert_eq!(settings.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_shadow_engine_requires_shadow_url() {
        let prerender = PrerenderConfig {
            engine: Engine::Shadow,
            ..PrerenderConfig::default()
        };
        let err = PrerenderSettings::from_config(&prerender, &ShadowConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingShadowService));
    }

    #[test]
    fn test_invalid_pattern_fails_at_setup() {
        let prerender = PrerenderConfig {
            blacklist: Some(PatternList::One("(unclosed".into())),
            ..PrerenderConfig::default()
        };
        let err = PrerenderSettings::from_config(&prerender, &ShadowConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { list: "blacklist", .. }));
    }

    #[test]
    fn test_invalid_service_url_fails_at_setup() {
        let prerender = PrerenderConfig {
            service_url: "service.prerender.io".into(),
            ..PrerenderConfig::default()
        };
        let err = PrerenderSettings::from_config(&prerender, &ShadowConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidServiceUrl { name: "primary", .. }));
    }
}
