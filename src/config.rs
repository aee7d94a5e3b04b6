use std::path::PathBuf;
use std::str::FromStr;

/// Server settings, read once from `VILLETTA_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub admin_password: String,
    pub guest_password: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub metrics_port: Option<u16>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Malformed { var: &'static str, value: String },
    TlsPair,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Malformed { var, value } => write!(f, "{var}: cannot parse {value:?}"),
            ConfigError::TlsPair => write!(
                f,
                "both VILLETTA_TLS_CERT and VILLETTA_TLS_KEY must be set, or neither"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

fn parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Malformed { var, value }),
    }
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as `from_env` with variables read through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
        let tls_cert = lookup("VILLETTA_TLS_CERT");
        let tls_key = lookup("VILLETTA_TLS_KEY");
        if tls_cert.is_some() != tls_key.is_some() {
            return Err(ConfigError::TlsPair);
        }

        Ok(Config {
            bind: lookup("VILLETTA_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed(&lookup, "VILLETTA_PORT")?.unwrap_or(5433),
            data_dir: lookup("VILLETTA_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            admin_password: lookup("VILLETTA_ADMIN_PASSWORD").unwrap_or_else(|| "admin".into()),
            guest_password: lookup("VILLETTA_GUEST_PASSWORD").unwrap_or_else(|| "villetta".into()),
            max_connections: parsed(&lookup, "VILLETTA_MAX_CONNECTIONS")?.unwrap_or(256),
            compact_threshold: parsed(&lookup, "VILLETTA_COMPACT_THRESHOLD")?.unwrap_or(1000),
            tls_cert,
            tls_key,
            metrics_port: parsed(&lookup, "VILLETTA_METRICS_PORT")?,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("villetta.wal")
    }
}
