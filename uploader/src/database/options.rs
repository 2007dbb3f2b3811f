//! Connect options and driver selection.
//!
//! [`ConnectOptions`] is the driver-independent description of a target
//! database. It is turned into the matching `sqlx` options type only when a
//! connection is opened, so an unknown driver or a missing option never
//! reaches the network.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::mysql::{MySqlConnectOptions, MySqlSslMode};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use sqlx::sqlite::SqliteConnectOptions;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};

pub const DEFAULT_MYSQL_PORT: u16 = 3306;
pub const DEFAULT_PGSQL_PORT: u16 = 5432;

/// Supported database drivers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    MySql,
    Postgres,
    Sqlite,
}

impl Driver {
    /// Canonical driver name
    pub fn name(&self) -> &'static str {
        match self {
            Driver::MySql => "mysql",
            Driver::Postgres => "pgsql",
            Driver::Sqlite => "sqlite",
        }
    }

    /// Port used when `host` carries none
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Driver::MySql => Some(DEFAULT_MYSQL_PORT),
            Driver::Postgres => Some(DEFAULT_PGSQL_PORT),
            Driver::Sqlite => None,
        }
    }

    /// Options that must be non-empty for this driver
    pub fn required_options(&self) -> &'static [&'static str] {
        match self {
            Driver::MySql | Driver::Postgres => &["host", "user", "password", "dbname"],
            Driver::Sqlite => &["path"],
        }
    }

    /// Driver-native overrides accepted in [`ConnectOptions::options`]
    pub fn native_options(&self) -> &'static [&'static str] {
        match self {
            Driver::MySql => &["charset", "ssl_mode"],
            Driver::Postgres => &["ssl_mode", "application_name"],
            Driver::Sqlite => &["create_if_missing", "foreign_keys", "busy_timeout"],
        }
    }
}

impl FromStr for Driver {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mysql" => Ok(Driver::MySql),
            "pgsql" | "postgres" | "postgresql" => Ok(Driver::Postgres),
            "sqlite" => Ok(Driver::Sqlite),
            _ => Err(ConfigError::UnknownDriver(s.to_string())),
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Driver-independent connection parameters.
///
/// Every field is optional at this level. Which ones are required depends on
/// the driver and is checked when the options are resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectOptions {
    pub driver: String,
    /// `host` or `host:port`
    pub host: String,
    #[serde(alias = "username")]
    pub user: String,
    pub password: String,
    #[serde(alias = "database")]
    pub dbname: String,
    /// SQLite database file, or `:memory:`
    pub path: String,
    /// Driver-native overrides
    pub options: BTreeMap<String, Value>,
}

/// Resolved, driver-specific connect options
#[derive(Debug, Clone)]
pub enum Target {
    MySql(MySqlConnectOptions),
    Postgres(PgConnectOptions),
    Sqlite(SqliteConnectOptions),
}

impl ConnectOptions {
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            ..Self::default()
        }
    }

    /// SQLite options for a database file.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            driver: "sqlite".to_string(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn dbname(mut self, dbname: impl Into<String>) -> Self {
        self.dbname = dbname.into();
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Overlay the non-empty fields of `other` on top of `self`.
    pub fn merge(mut self, other: ConnectOptions) -> Self {
        fn take(dst: &mut String, src: String) {
            if !src.trim().is_empty() {
                *dst = src;
            }
        }
        take(&mut self.driver, other.driver);
        take(&mut self.host, other.host);
        take(&mut self.user, other.user);
        take(&mut self.password, other.password);
        take(&mut self.dbname, other.dbname);
        take(&mut self.path, other.path);
        self.options.extend(other.options);
        self
    }

    /// Parse the driver name.
    pub fn driver(&self) -> ConfigResult<Driver> {
        self.driver.parse()
    }

    /// Check required options and build the `sqlx` options for the driver.
    pub fn resolve(&self) -> ConfigResult<Target> {
        let driver = self.driver()?;

        for option in driver.required_options() {
            if self.field(option).map_or(true, |v| v.trim().is_empty()) {
                return Err(ConfigError::MissingOption {
                    driver: driver.name().to_string(),
                    option: option.to_string(),
                });
            }
        }

        if let Some(key) = self
            .options
            .keys()
            .find(|k| !driver.native_options().contains(&k.as_str()))
        {
            return Err(invalid(driver, key, "unsupported option"));
        }

        match driver {
            Driver::MySql => self.mysql(driver).map(Target::MySql),
            Driver::Postgres => self.postgres(driver).map(Target::Postgres),
            Driver::Sqlite => self.sqlite_options(driver).map(Target::Sqlite),
        }
    }

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "host" => Some(self.host.as_str()),
            "user" => Some(self.user.as_str()),
            "password" => Some(self.password.as_str()),
            "dbname" => Some(self.dbname.as_str()),
            "path" => Some(self.path.as_str()),
            _ => None,
        }
    }

    fn mysql(&self, driver: Driver) -> ConfigResult<MySqlConnectOptions> {
        let (host, port) = parse_host(driver, &self.host)?;
        let mut opts = MySqlConnectOptions::new()
            .host(&host)
            .port(port)
            .username(self.user.trim())
            .password(self.password.trim())
            .database(self.dbname.trim());

        if let Some(charset) = self.string_option(driver, "charset")? {
            opts = opts.charset(&charset);
        }
        if let Some(mode) = self.string_option(driver, "ssl_mode")? {
            let mode = MySqlSslMode::from_str(&mode).map_err(|e| invalid(driver, "ssl_mode", e))?;
            opts = opts.ssl_mode(mode);
        }
        Ok(opts)
    }

    fn postgres(&self, driver: Driver) -> ConfigResult<PgConnectOptions> {
        let (host, port) = parse_host(driver, &self.host)?;
        let mut opts = PgConnectOptions::new()
            .host(&host)
            .port(port)
            .username(self.user.trim())
            .password(self.password.trim())
            .database(self.dbname.trim());

        if let Some(mode) = self.string_option(driver, "ssl_mode")? {
            let mode = PgSslMode::from_str(&mode).map_err(|e| invalid(driver, "ssl_mode", e))?;
            opts = opts.ssl_mode(mode);
        }
        if let Some(name) = self.string_option(driver, "application_name")? {
            opts = opts.application_name(&name);
        }
        Ok(opts)
    }

    fn sqlite_options(&self, driver: Driver) -> ConfigResult<SqliteConnectOptions> {
        let path = self.path.trim();
        let opts = if path == ":memory:" {
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| invalid(driver, "path", e))?
        } else {
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(self.bool_option(driver, "create_if_missing")?.unwrap_or(true))
        };

        let mut opts = opts;
        if let Some(enabled) = self.bool_option(driver, "foreign_keys")? {
            opts = opts.foreign_keys(enabled);
        }
        if let Some(seconds) = self.number_option(driver, "busy_timeout")? {
            opts = opts.busy_timeout(Duration::from_secs_f64(seconds));
        }
        Ok(opts)
    }

    fn string_option(&self, driver: Driver, key: &str) -> ConfigResult<Option<String>> {
        match self.options.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
            Some(_) => Err(invalid(driver, key, "expected a string")),
        }
    }

    fn bool_option(&self, driver: Driver, key: &str) -> ConfigResult<Option<bool>> {
        match self.options.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::Number(n)) => Ok(Some(n.as_i64() != Some(0))),
            Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(Some(true)),
                "false" | "0" | "no" | "off" => Ok(Some(false)),
                _ => Err(invalid(driver, key, "expected a boolean")),
            },
            Some(_) => Err(invalid(driver, key, "expected a boolean")),
        }
    }

    fn number_option(&self, driver: Driver, key: &str) -> ConfigResult<Option<f64>> {
        let value = match self.options.get(key) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            Some(_) => None,
        };
        match value {
            Some(v) if v.is_finite() && v >= 0.0 => Ok(Some(v)),
            _ => Err(invalid(driver, key, "expected a non-negative number of seconds")),
        }
    }
}

fn invalid(driver: Driver, option: &str, message: impl fmt::Display) -> ConfigError {
    ConfigError::InvalidOption {
        driver: driver.name().to_string(),
        option: option.to_string(),
        message: message.to_string(),
    }
}

/// Split `host:port` on the first colon, falling back to the driver's port.
pub fn parse_host(driver: Driver, host: &str) -> ConfigResult<(String, u16)> {
    let host = host.trim();
    let default_port = driver.default_port().unwrap_or_default();

    match host.split_once(':') {
        None => Ok((host.to_string(), default_port)),
        Some((name, port)) => {
            let port = port.trim();
            if port.is_empty() {
                return Ok((name.to_string(), default_port));
            }
            let port = port
                .parse::<u16>()
                .map_err(|_| invalid(driver, "host", format!("invalid port '{}'", port)))?;
            Ok((name.to_string(), port))
        }
    }
}
