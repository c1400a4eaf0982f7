use crate::error::{Result, ResultExt as _, WarehouseError};
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;
use std::path::{Path, PathBuf};
use std::str::FromStr as _;

/// Written in place of a non-empty password when a config is saved.
pub const PASSWORD_PLACEHOLDER: &str = "__ENV__";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct WarehouseConfig {
    pub input: InputSettings,
    pub database: DatabaseSettings,
    pub load: LoadSettings,
    pub validation: ValidationSettings,
    pub logging: LogSettings,
}

/// Text encoding of the extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    Latin1,
    Utf8,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct InputSettings {
    /// Extract to load. Required by every command, from here or the CLI.
    pub path: Option<PathBuf>,
    pub delimiter: char,
    pub encoding: TextEncoding,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            path: None,
            delimiter: ';',
            encoding: TextEncoding::Latin1,
        }
    }
}

impl InputSettings {
    pub fn delimiter_byte(&self) -> Result<u8> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                WarehouseError::Config(format!(
                    "Delimiter {:?} must be a single ASCII character",
                    self.delimiter
                ))
            })
    }

    pub fn require_path(&self) -> Result<&Path> {
        self.path.as_deref().ok_or_else(|| {
            WarehouseError::Config("No input file given (use --file or input.path)".to_owned())
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    #[serde(
        serialize_with = "serialize_password",
        deserialize_with = "deserialize_password"
    )]
    pub password: SecretString,
    /// Full connection URL; wins over the individual fields when present.
    #[serde(skip)]
    pub url: Option<SecretString>,
}

fn serialize_password<S>(password: &SecretString, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    if password.expose_secret().is_empty() {
        serializer.serialize_str("")
    } else {
        serializer.serialize_str(PASSWORD_PLACEHOLDER)
    }
}

fn deserialize_password<'de, D>(deserializer: D) -> std::result::Result<SecretString, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(SecretString::new(s.into()))
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 5432,
            database: "games_warehouse".to_owned(),
            user: "postgres".to_owned(),
            password: SecretString::new(String::new().into()),
            url: None,
        }
    }
}

impl DatabaseSettings {
    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        if let Some(url) = &self.url {
            return PgConnectOptions::from_str(url.expose_secret())
                .map_err(|e| WarehouseError::Config(format!("Invalid database URL: {e}")));
        }

        let password = self.password.expose_secret();
        if password == PASSWORD_PLACEHOLDER {
            return Err(WarehouseError::Config(
                "Password placeholder found in config; pass it with --db-password or WAREHOUSE_DB_PASSWORD"
                    .to_owned(),
            ));
        }

        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user);
        if !password.is_empty() {
            options = options.password(password);
        }
        Ok(options)
    }

    /// Connection target without credentials, for log lines.
    pub fn describe(&self) -> String {
        if self.url.is_some() {
            "database URL".to_owned()
        } else {
            format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database)
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoadSettings {
    /// Rows per multi-row INSERT statement
    pub batch_size: usize,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            batch_size: crate::etl::loader::DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ValidationSettings {
    /// Turn reconciliation findings into a failing run
    pub strict: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LogSettings {
    /// Defaults to the platform data directory
    pub dir: Option<PathBuf>,
    pub file_logging: bool,
    /// Used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            dir: None,
            file_logging: true,
            level: "info".to_owned(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<WarehouseConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

pub fn save_config(config: &WarehouseConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
