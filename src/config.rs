//! Runtime configuration from the environment and `<config dir>/.env`

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fs;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::telegram::DEFAULT_MAX_RETRIES;

/// Overrides the configuration directory
pub const HOME_VAR: &str = "SMTP2TELEGRAM_HOME";

const CONFIG_DIR_NAME: &str = "smtp2telegram";
const ENV_FILE_NAME: &str = ".env";

const DEFAULT_HOSTNAME: &str = "0.0.0.0";
const DEFAULT_PORT: &str = "2525";
const DEFAULT_LOG_KEEP_DAYS: usize = 3;
const DEFAULT_SERVER_NAME: &str = "smtp2telegram";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No home directory found; set SMTP2TELEGRAM_HOME")]
    NoHomeDir,

    #[error("Failed to access {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("Failed to parse {}: {source}", .path.display())]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },

    #[error("Missing required variable {0}")]
    Missing(&'static str),

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{name} must be a positive integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("SMTP_PORT must be between 1 and 65535, got {0:?}")]
    InvalidPort(String),

    #[error("Failed to read configuration from the terminal: {0}")]
    Prompt(io::Error),
}

/// Validated process configuration
#[derive(Clone)]
pub struct Config {
    /// Telegram chat receiving every message
    pub chat_id: String,
    /// Bot token
    pub api_key: String,
    pub smtp_hostname: String,
    pub smtp_port: u16,
    /// Number of daily log files kept
    pub log_keep_days: usize,
    /// Name announced to SMTP clients
    pub server_name: String,
    /// Delivery attempts per message
    pub max_retries: u32,
    /// Directory holding `.env` and the logs
    pub config_dir: PathBuf,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("chat_id", &self.chat_id)
            .field("api_key", &"<redacted>")
            .field("smtp_hostname", &self.smtp_hostname)
            .field("smtp_port", &self.smtp_port)
            .field("log_keep_days", &self.log_keep_days)
            .field("server_name", &self.server_name)
            .field("max_retries", &self.max_retries)
            .field("config_dir", &self.config_dir)
            .finish()
    }
}

/// `$SMTP2TELEGRAM_HOME`, or `smtp2telegram` under the user's home directory
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = env::var_os(HOME_VAR).filter(|dir| !dir.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(CONFIG_DIR_NAME))
        .ok_or(ConfigError::NoHomeDir)
}

impl Config {
    /// Load from the default directory, prompting on a terminal when no
    /// `.env` exists yet.
    pub fn load() -> Result<Self, ConfigError> {
        let dir = config_dir()?;
        Self::load_from(&dir, io::stdin().is_terminal())
    }

    /// Load from `dir`. Variables in the process environment take precedence
    /// over the `.env` file.
    pub fn load_from(dir: &Path, interactive: bool) -> Result<Self, ConfigError> {
        Self::load_with(dir, interactive, |name| env::var(name).ok())
    }

    fn load_with(
        dir: &Path,
        interactive: bool,
        process_env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        ensure_config_dir(dir)?;

        let env_path = dir.join(ENV_FILE_NAME);
        if !env_path.exists() && interactive {
            let values = prompt_values(&mut io::stdin().lock(), &mut io::stdout())?;
            write_env_file(&env_path, &values)?;
            println!(".env file created at {}", env_path.display());
        }

        let file_vars = if env_path.exists() {
            restrict_permissions(&env_path, 0o600)?;
            read_env_file(&env_path)?
        } else {
            HashMap::new()
        };

        Self::from_lookup(dir, |name| {
            process_env(name).or_else(|| file_vars.get(name).cloned())
        })
    }

    /// Build and validate a configuration from a variable lookup
    pub fn from_lookup(
        dir: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let required = |name: &'static str| -> Result<String, ConfigError> {
            let value = lookup(name).ok_or(ConfigError::Missing(name))?;
            let value = value.trim();
            if value.is_empty() {
                return Err(ConfigError::Empty(name));
            }
            Ok(value.to_owned())
        };
        let optional = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let chat_id = required("CHAT_ID")?;
        let api_key = required("API_KEY")?;
        let smtp_hostname = required("SMTP_HOSTNAME")?;
        let smtp_port = parse_port(&required("SMTP_PORT")?)?;

        let log_keep_days = match optional("LOG_KEEP_DAYS") {
            Some(value) => parse_positive("LOG_KEEP_DAYS", &value)?,
            None => DEFAULT_LOG_KEEP_DAYS,
        };
        let max_retries = match optional("TELEGRAM_MAX_RETRIES") {
            Some(value) => parse_positive("TELEGRAM_MAX_RETRIES", &value)?,
            None => DEFAULT_MAX_RETRIES,
        };
        let server_name =
            optional("SMTP_SERVER_NAME").unwrap_or_else(|| DEFAULT_SERVER_NAME.to_owned());

        Ok(Self {
            chat_id,
            api_key,
            smtp_hostname,
            smtp_port,
            log_keep_days,
            server_name,
            max_retries,
            config_dir: dir.to_path_buf(),
        })
    }

    /// Address to bind, with IPv6 hosts in brackets
    pub fn bind_addr(&self) -> String {
        if self.smtp_hostname.contains(':') && !self.smtp_hostname.starts_with('[') {
            format!("[{}]:{}", self.smtp_hostname, self.smtp_port)
        } else {
            format!("{}:{}", self.smtp_hostname, self.smtp_port)
        }
    }

    /// Whether the chat id has the shape Telegram uses: digits, optionally
    /// negative for groups and channels
    pub fn chat_id_looks_valid(&self) -> bool {
        let digits = self.chat_id.strip_prefix('-').unwrap_or(&self.chat_id);
        !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
    }
}

fn parse_port(value: &str) -> Result<u16, ConfigError> {
    match value.parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ConfigError::InvalidPort(value.to_owned())),
    }
}

fn parse_positive<N>(name: &'static str, value: &str) -> Result<N, ConfigError>
where
    N: std::str::FromStr + PartialOrd + From<u8>,
{
    match value.parse::<N>() {
        Ok(n) if n >= N::from(1) => Ok(n),
        _ => Err(ConfigError::InvalidNumber {
            name,
            value: value.to_owned(),
        }),
    }
}

fn ensure_config_dir(dir: &Path) -> Result<(), ConfigError> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    restrict_permissions(dir, 0o700)
}

fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let env_file_error = |source| ConfigError::EnvFile {
        path: path.to_path_buf(),
        source,
    };

    dotenvy::from_path_iter(path)
        .map_err(env_file_error)?
        .map(|item| item.map_err(env_file_error))
        .collect()
}

/// Write `values` as a `.env` file readable only by the owner
pub fn write_env_file(path: &Path, values: &[(&str, String)]) -> Result<(), ConfigError> {
    let io_error = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(io_error)?;
    for (name, value) in values {
        writeln!(file, "{name}={}", quote_env_value(value)).map_err(io_error)?;
    }
    file.flush().map_err(io_error)?;

    restrict_permissions(path, 0o600)
}

/// Single quotes keep a value literal; values containing one fall back to
/// double quotes with escapes
fn quote_env_value(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{value}'");
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

fn prompt_values(
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<Vec<(&'static str, String)>, ConfigError> {
    writeln!(output, ".env file not found. Please provide the following information:")
        .map_err(ConfigError::Prompt)?;

    let chat_id = prompt_line(input, output, "CHAT_ID (Telegram chat ID)", None)?;
    let api_key = rpassword::prompt_password("API_KEY (Telegram bot API key): ")
        .map_err(ConfigError::Prompt)?;
    let smtp_hostname = prompt_line(
        input,
        output,
        "SMTP_HOSTNAME (address to listen on)",
        Some(DEFAULT_HOSTNAME),
    )?;
    let smtp_port = prompt_line(input, output, "SMTP_PORT (port to listen on)", Some(DEFAULT_PORT))?;
    let log_keep_days = prompt_line(
        input,
        output,
        "LOG_KEEP_DAYS (days of logs to keep)",
        Some(&DEFAULT_LOG_KEEP_DAYS.to_string()),
    )?;

    Ok(vec![
        ("CHAT_ID", chat_id),
        ("API_KEY", api_key.trim().to_owned()),
        ("SMTP_HOSTNAME", smtp_hostname),
        ("SMTP_PORT", smtp_port),
        ("LOG_KEEP_DAYS", log_keep_days),
    ])
}

/// Ask for one value; an empty answer takes `default`
fn prompt_line(
    input: &mut impl BufRead,
    output: &mut impl Write,
    label: &str,
    default: Option<&str>,
) -> Result<String, ConfigError> {
    match default {
        Some(default) => write!(output, "{label} [{default}]: "),
        None => write!(output, "{label}: "),
    }
    .and_then(|()| output.flush())
    .map_err(ConfigError::Prompt)?;

    let mut answer = String::new();
    input.read_line(&mut answer).map_err(ConfigError::Prompt)?;
    let answer = answer.trim();

    Ok(match default {
        Some(default) if answer.is_empty() => default.to_owned(),
        _ => answer.to_owned(),
    })
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|source| {
        ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> Result<(), ConfigError> {
    Ok(())
}
