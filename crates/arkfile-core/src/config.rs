use std::path::PathBuf;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Typed configuration for the auth core: key directory, store path, TOTP
/// issuer/digits, token TTLs, and per-component operation timeouts (§6
/// supplement). Loaded from an optional TOML file overlaid with
/// `ARKFILE_AUTH_*` environment variables, the latter always winning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub key_dir: PathBuf,
    pub sqlite_path: Option<PathBuf>,
    pub totp_issuer: String,
    pub totp_digits: usize,
    pub token_access_ttl_secs: i64,
    pub token_refresh_ttl_secs: i64,
    pub token_clock_skew_secs: i64,
    pub token_signing_key_ring_size: usize,
    pub store_op_timeout_secs: u64,
    pub pake_op_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_dir: PathBuf::from("/etc/arkfile/keys"),
            sqlite_path: None,
            totp_issuer: "Arkfile".to_string(),
            totp_digits: 6,
            token_access_ttl_secs: 86_400,
            token_refresh_ttl_secs: 30 * 86_400,
            token_clock_skew_secs: 60,
            token_signing_key_ring_size: 5,
            store_op_timeout_secs: 10,
            pake_op_timeout_secs: 5,
        }
    }
}

impl Config {
    /// Load defaults, overlay an optional TOML file at `path`, then overlay
    /// `ARKFILE_AUTH_*` environment variables. Environment variables always
    /// win — this is the knob operators reach for without a redeploy.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed("ARKFILE_AUTH_")).extract()
    }

    pub fn totp(&self) -> arkfile_totp::TotpConfig {
        arkfile_totp::TotpConfig {
            issuer: self.totp_issuer.clone(),
            digits: self.totp_digits,
        }
    }

    pub fn token(&self) -> arkfile_token::TokenConfig {
        arkfile_token::TokenConfig {
            access_ttl_secs: self.token_access_ttl_secs,
            refresh_ttl_secs: self.token_refresh_ttl_secs,
            clock_skew_secs: self.token_clock_skew_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_a_file() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.totp_digits, 6);
        assert_eq!(config.token_access_ttl_secs, 86_400);
        assert!(config.token_refresh_ttl_secs > config.token_access_ttl_secs);
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "totp_issuer = \"CustomVault\"\ntotp_digits = 8\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.totp_issuer, "CustomVault");
        assert_eq!(config.totp_digits, 8);
    }

    #[test]
    fn environment_overrides_the_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "totp_issuer = \"CustomVault\"\n").unwrap();

        // SAFETY: test runs single-threaded within this process for this var.
        unsafe {
            std::env::set_var("ARKFILE_AUTH_TOTP_ISSUER", "EnvVault");
        }
        let config = Config::load(Some(&path)).unwrap();
        unsafe {
            std::env::remove_var("ARKFILE_AUTH_TOTP_ISSUER");
        }
        assert_eq!(config.totp_issuer, "EnvVault");
    }
}
