//! Runtime configuration from the environment (and an optional `.env`).
//!
//! | Variable | Default |
//! |----------|---------|
//! | `TABLESMITH_PORT` | `3000` |
//! | `TABLESMITH_PREVIEW_ROWS` | `5` |
//! | `TABLESMITH_MAX_UPLOAD_MB` | `25` |
//! | `TABLESMITH_EXPORT_NAME` | `transformed_file` |
//! | `TABLESMITH_SESSION_IDLE_MINUTES` | `30` |

use std::env;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::export::DEFAULT_BASENAME;
use crate::session::DEFAULT_IDLE_MINUTES;

pub const PORT_VAR: &str = "TABLESMITH_PORT";
pub const PREVIEW_ROWS_VAR: &str = "TABLESMITH_PREVIEW_ROWS";
pub const MAX_UPLOAD_VAR: &str = "TABLESMITH_MAX_UPLOAD_MB";
pub const EXPORT_NAME_VAR: &str = "TABLESMITH_EXPORT_NAME";
pub const SESSION_IDLE_VAR: &str = "TABLESMITH_SESSION_IDLE_MINUTES";

const MIB: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// HTTP port for `serve`.
    pub port: u16,
    /// Rows shown in table previews.
    pub preview_rows: usize,
    /// Request body limit for uploads, in bytes.
    pub max_upload_bytes: usize,
    /// File name stem for exports.
    pub export_basename: String,
    /// Minutes of inactivity before a server session is dropped.
    pub session_idle_minutes: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            preview_rows: 5,
            max_upload_bytes: 25 * MIB,
            export_basename: DEFAULT_BASENAME.to_string(),
            session_idle_minutes: DEFAULT_IDLE_MINUTES as u32,
        }
    }
}

impl AppConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a configuration from any variable source. Unset or blank
    /// variables fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = match get(PORT_VAR) {
            Some(v) => parse_var(PORT_VAR, &v)?,
            None => defaults.port,
        };
        let preview_rows = match get(PREVIEW_ROWS_VAR) {
            Some(v) => parse_var(PREVIEW_ROWS_VAR, &v)?,
            None => defaults.preview_rows,
        };
        let max_upload_bytes = match get(MAX_UPLOAD_VAR) {
            Some(v) => parse_var::<usize>(MAX_UPLOAD_VAR, &v)?
                .checked_mul(MIB)
                .ok_or_else(|| invalid(MAX_UPLOAD_VAR, &v))?,
            None => defaults.max_upload_bytes,
        };
        let export_basename = get(EXPORT_NAME_VAR)
            .map(|v| v.trim().to_string())
            .unwrap_or(defaults.export_basename);
        let session_idle_minutes = match get(SESSION_IDLE_VAR) {
            Some(v) => parse_var(SESSION_IDLE_VAR, &v)?,
            None => defaults.session_idle_minutes,
        };

        Ok(Self {
            port,
            preview_rows,
            max_upload_bytes,
            export_basename,
            session_idle_minutes,
        })
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(name, value))
}

fn invalid(name: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.port, 3000);
        assert_eq!(config.max_upload_bytes, 25 * 1024 * 1024);
        assert_eq!(config.export_basename, "transformed_file");
        assert_eq!(config.session_idle_minutes, 30);
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            (PORT_VAR, "8080"),
            (PREVIEW_ROWS_VAR, " 10 "),
            (MAX_UPLOAD_VAR, "2"),
            (EXPORT_NAME_VAR, "report"),
            (SESSION_IDLE_VAR, "5"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.preview_rows, 10);
        assert_eq!(config.max_upload_bytes, 2 * 1024 * 1024);
        assert_eq!(config.export_basename, "report");
        assert_eq!(config.session_idle_minutes, 5);
    }

    #[test]
    fn test_blank_value_uses_default() {
        let config = from_pairs(&[(PORT_VAR, "  ")]).unwrap();
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_invalid_value() {
        let err = from_pairs(&[(PORT_VAR, "eighty")]).unwrap_err();
        assert!(err.to_string().contains("TABLESMITH_PORT"));

        assert!(from_pairs(&[(PORT_VAR, "70000")]).is_err());
    }
}
