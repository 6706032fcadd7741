//! Runtime configuration.
//!
//! Built once at start-up from an optional TOML file, then `ATELIER_*`
//! environment overrides, then CLI flags, and passed explicitly to every
//! collaborator.

use std::path::{Path, PathBuf};
use std::time::Duration;

use atelier_pipeline::{CompressOptions, Quality};
use serde::{Deserialize, Serialize};

/// Remote API used when nothing else is configured.
pub const DEFAULT_API_BASE: &str = "https://api.jpart.at/api";

/// Environment variable overriding [`Config::api_base`].
pub const ENV_API_BASE: &str = "ATELIER_API_BASE";

/// Environment variable overriding [`Config::cache_path`].
pub const ENV_CACHE_PATH: &str = "ATELIER_CACHE_PATH";

/// Environment variable overriding [`Config::lang`].
pub const ENV_LANG: &str = "ATELIER_LANG";

/// Errors loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`Config`].
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Upload compression settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompressConfig {
    /// Bound on either axis, in pixels.
    pub max_dimension: u32,
    /// JPEG quality as a `0.0..=1.0` fraction.
    pub quality: f32,
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self {
            max_dimension: atelier_pipeline::compress::DEFAULT_MAX_DIMENSION,
            quality: 0.82,
        }
    }
}

/// Everything configurable about atelier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Base URL of the storefront API (no trailing `/ai/stage`).
    pub api_base: String,
    /// Keep a localhost `api_base` instead of swapping in the remote one.
    pub allow_local_api: bool,
    /// Blob cache file; `None` means the platform data directory.
    pub cache_path: Option<PathBuf>,
    /// HTTP request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Language tag sent with staging requests.
    pub lang: String,
    /// Upload compression.
    pub compress: CompressConfig,
    /// JPEG quality for finished slides, as a fraction.
    pub output_quality: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_owned(),
            allow_local_api: false,
            cache_path: None,
            request_timeout_secs: 60,
            lang: "en".to_owned(),
            compress: CompressConfig::default(),
            output_quality: 0.92,
        }
    }
}

impl Config {
    /// Defaults, overlaid with `path` if given, then the process
    /// environment, then validated.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if `path` cannot be read,
    /// [`ConfigError::Parse`] for malformed TOML, and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                tracing::debug!(path = %path.display(), "loaded config file");
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_env_from(std::env::vars());
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML; missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `ATELIER_*` overrides from `vars`. Empty values are ignored.
    pub fn apply_env_from<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in vars {
            let value: String = value.into();
            if value.trim().is_empty() {
                continue;
            }
            match key.as_ref() {
                ENV_API_BASE => self.api_base = value,
                ENV_CACHE_PATH => self.cache_path = Some(PathBuf::from(value)),
                ENV_LANG => self.lang = value,
                _ => {}
            }
        }
    }

    /// Check ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if reqwest::Url::parse(&self.api_base).is_err() {
            return Err(invalid("api_base", format!("not a URL: {:?}", self.api_base)));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid("request_timeout_secs", "must be positive".into()));
        }
        if self.compress.max_dimension == 0 {
            return Err(invalid("compress.max_dimension", "must be positive".into()));
        }
        for (field, q) in [
            ("compress.quality", self.compress.quality),
            ("output_quality", self.output_quality),
        ] {
            if !(q > 0.0 && q <= 1.0) {
                return Err(invalid(field, format!("{q} is outside (0, 1]")));
            }
        }
        Ok(())
    }

    /// The API base actually used.
    ///
    /// A loopback `api_base` is replaced by [`DEFAULT_API_BASE`] unless
    /// `allow_local_api` is set. Trailing slashes are removed.
    #[must_use]
    pub fn resolved_api_base(&self) -> String {
        let is_loopback = reqwest::Url::parse(&self.api_base)
            .ok()
            .and_then(|url| url.host_str().map(str::to_owned))
            .is_some_and(|host| matches!(host.as_str(), "localhost" | "127.0.0.1" | "[::1]"));
        let base = if is_loopback && !self.allow_local_api {
            tracing::debug!(configured = %self.api_base, "ignoring loopback API base");
            DEFAULT_API_BASE
        } else {
            self.api_base.as_str()
        };
        base.trim_end_matches('/').to_owned()
    }

    /// `POST` target for staging.
    #[must_use]
    pub fn stage_endpoint(&self) -> String {
        format!("{}/ai/stage", self.resolved_api_base())
    }

    /// Blob cache location: the configured path, or
    /// `<data dir>/atelier/images.sqlite3`.
    #[must_use]
    pub fn cache_path(&self) -> Option<PathBuf> {
        self.cache_path.clone().or_else(|| {
            dirs::data_dir()
                .or_else(dirs::home_dir)
                .map(|dir| dir.join("atelier").join("images.sqlite3"))
        })
    }

    /// HTTP timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Compression options for uploads.
    #[must_use]
    pub fn compress_options(&self) -> CompressOptions {
        CompressOptions {
            max_dimension: self.compress.max_dimension,
            quality: Quality::from_fraction(self.compress.quality),
            ..CompressOptions::default()
        }
    }

    /// JPEG quality for finished slides.
    #[must_use]
    pub fn output_quality(&self) -> Quality {
        Quality::from_fraction(self.output_quality)
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.api_base, DEFAULT_API_BASE);
        assert_eq!(c.lang, "en");
        assert_eq!(c.request_timeout(), Duration::from_secs(60));
        assert_eq!(c.compress_options().max_dimension, 1400);
        assert_eq!(c.compress_options().quality.get(), 82);
        assert_eq!(c.output_quality().get(), 92);
        c.validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = Config::from_toml_str(
            r#"
            lang = "de"
            [compress]
            max_dimension = 2048
            "#,
        )
        .unwrap();
        assert_eq!(c.lang, "de");
        assert_eq!(c.compress.max_dimension, 2048);
        assert!((c.compress.quality - 0.82).abs() < f32::EPSILON);
        assert_eq!(c.api_base, DEFAULT_API_BASE);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            Config::from_toml_str("colour = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let mut c = Config::default();
        c.apply_env_from([
            (ENV_API_BASE, "https://staging.example/api"),
            (ENV_CACHE_PATH, "/tmp/x.sqlite3"),
            (ENV_LANG, ""),
            ("UNRELATED", "1"),
        ]);
        assert_eq!(c.api_base, "https://staging.example/api");
        assert_eq!(c.cache_path(), Some(PathBuf::from("/tmp/x.sqlite3")));
        assert_eq!(c.lang, "en");
    }

    #[test]
    fn loopback_base_is_swapped_for_remote() {
        let mut c = Config {
            api_base: "http://localhost:8000/api/".into(),
            ..Config::default()
        };
        assert_eq!(c.resolved_api_base(), DEFAULT_API_BASE);
        c.allow_local_api = true;
        assert_eq!(c.resolved_api_base(), "http://localhost:8000/api");
        assert_eq!(c.stage_endpoint(), "http://localhost:8000/api/ai/stage");
    }

    #[test]
    fn remote_base_is_kept() {
        let c = Config {
            api_base: "https://shop.example/api/".into(),
            ..Config::default()
        };
        assert_eq!(c.stage_endpoint(), "https://shop.example/api/ai/stage");
    }

    #[test]
    fn validation_names_the_field() {
        let c = Config {
            output_quality: 1.5,
            ..Config::default()
        };
        let err = c.validate().unwrap_err();
        assert!(err.to_string().starts_with("invalid output_quality"), "{err}");

        let c = Config {
            api_base: "not a url".into(),
            ..Config::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
