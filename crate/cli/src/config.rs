use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::ValueEnum;
use p11_base_hsm::{PoolConfig, RetryConfig, UserType};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    cli_ensure,
    error::{
        CliError,
        result::{CliResult, CliResultHelper},
    },
};

pub const P11_CLI_CONF_ENV: &str = "P11_CLI_CONF";

/// The role used to log in
#[derive(ValueEnum, Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum User {
    #[default]
    CryptoOfficer,
    CryptoUser,
}

impl From<User> for UserType {
    fn from(user: User) -> Self {
        match user {
            User::CryptoOfficer => Self::CryptoOfficer,
            User::CryptoUser => Self::CryptoUser,
        }
    }
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConf {
    pub max_sessions: Option<u32>,
    pub min_idle: Option<u32>,
    pub connection_timeout_secs: Option<u64>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConf {
    pub initial_interval_secs: Option<u64>,
    pub multiplier: Option<f64>,
    pub max_elapsed_secs: Option<u64>,
}

/// Configuration of the samples, read from a TOML file.
///
/// ```toml
/// library_path = "/usr/safenet/lunaclient/lib/libCryptoki2_64.so"
/// slot = "myPartition"
/// user = "crypto-officer"
///
/// [pool]
/// max_sessions = 8
/// min_idle = 1
/// connection_timeout_secs = 30
///
/// [retry]
/// initial_interval_secs = 2
/// multiplier = 1.5
/// max_elapsed_secs = 30
/// ```
///
/// Every field is optional. Command line options and environment variables
/// take precedence over the file.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
#[serde(default, deny_unknown_fields)]
pub struct P11Conf {
    pub library_path: Option<PathBuf>,
    /// Slot id or token label
    pub slot: Option<String>,
    pub user: Option<User>,
    pub pool: PoolConf,
    pub retry: RetryConf,
}

impl P11Conf {
    /// Load the configuration file if one is given, the defaults otherwise
    ///
    /// # Errors
    /// Fails if the file cannot be read or is not a valid configuration.
    pub fn load(conf_path: Option<&Path>) -> CliResult<Self> {
        let Some(path) = conf_path else {
            debug!("No configuration file, using the defaults");
            return Ok(Self::default());
        };
        debug!("Loading configuration from: {}", path.display());
        Self::from_toml(path)
    }

    /// # Errors
    /// Fails if the file cannot be read or is not a valid configuration.
    pub fn from_toml(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Can't read the configuration file {}", path.display()))?;
        toml::from_str(&content).map_err(|e| {
            CliError::Configuration(format!(
                "Config TOML malformed in {}: {e}",
                path.display()
            ))
        })
    }

    /// # Errors
    /// Fails if the pool would hold no session.
    pub fn pool_config(&self) -> CliResult<PoolConfig> {
        let defaults = PoolConfig::default();
        let config = PoolConfig {
            max_sessions: self.pool.max_sessions.unwrap_or(defaults.max_sessions),
            min_idle: self.pool.min_idle.unwrap_or(defaults.min_idle),
            connection_timeout: self
                .pool
                .connection_timeout_secs
                .map_or(defaults.connection_timeout, Duration::from_secs),
            ..defaults
        };
        cli_ensure!(
            config.max_sessions > 0,
            CliError::Configuration("pool.max_sessions must be at least 1".to_owned())
        );
        Ok(config)
    }

    /// # Errors
    /// Fails if the multiplier is lower than 1.
    pub fn retry_config(&self) -> CliResult<RetryConfig> {
        let defaults = RetryConfig::default();
        let config = RetryConfig {
            initial_interval: self
                .retry
                .initial_interval_secs
                .map_or(defaults.initial_interval, Duration::from_secs),
            multiplier: self.retry.multiplier.unwrap_or(defaults.multiplier),
            max_elapsed_time: self
                .retry
                .max_elapsed_secs
                .map_or(defaults.max_elapsed_time, Duration::from_secs),
        };
        cli_ensure!(
            config.multiplier >= 1.0,
            CliError::Configuration(format!(
                "retry.multiplier must be at least 1, got {}",
                config.multiplier
            ))
        );
        Ok(config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::{io::Write, path::Path, time::Duration};

    use tempfile::NamedTempFile;

    use super::{P11Conf, User};

    fn write_conf(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load() {
        let file = write_conf(
            r#"
library_path = "/opt/luna/libCryptoki2_64.so"
slot = "myPartition"
user = "crypto-user"

[pool]
max_sessions = 4

[retry]
multiplier = 2.0
max_elapsed_secs = 10
"#,
        );
        let conf = P11Conf::load(Some(file.path())).unwrap();
        assert_eq!(
            conf.library_path.as_deref(),
            Some(Path::new("/opt/luna/libCryptoki2_64.so"))
        );
        assert_eq!(conf.slot.as_deref(), Some("myPartition"));
        assert_eq!(conf.user, Some(User::CryptoUser));

        let pool = conf.pool_config().unwrap();
        assert_eq!(pool.max_sessions, 4);
        assert_eq!(pool.min_idle, 1);
        assert_eq!(pool.connection_timeout, Duration::from_secs(30));

        let retry = conf.retry_config().unwrap();
        assert_eq!(retry.initial_interval, Duration::from_secs(2));
        assert_eq!(retry.max_elapsed_time, Duration::from_secs(10));
    }

    #[test]
    fn partial_and_missing_files() {
        let conf = P11Conf::load(Some(write_conf("").path())).unwrap();
        assert_eq!(conf, P11Conf::default());
        assert_eq!(P11Conf::load(None).unwrap(), P11Conf::default());

        let err = P11Conf::load(Some(Path::new("not_exist.toml")))
            .unwrap_err()
            .to_string();
        assert!(err.starts_with("Can't read the configuration file not_exist.toml"));
    }

    #[test]
    fn invalid_files() {
        let file = write_conf("slot = 1\nunknown = true\n");
        let err = P11Conf::load(Some(file.path())).unwrap_err().to_string();
        assert!(err.contains("Config TOML malformed"));

        let file = write_conf("[pool]\nmax_sessions = 0\n");
        let conf = P11Conf::load(Some(file.path())).unwrap();
        conf.pool_config().unwrap_err();

        let file = write_conf("[retry]\nmultiplier = 0.5\n");
        let conf = P11Conf::load(Some(file.path())).unwrap();
        conf.retry_config().unwrap_err();
    }
}
