use std::{path::PathBuf, time::Duration};

use clap::Parser;
use reqwest::Url;

use crate::{countries::REST_COUNTRIES_URL, db::DEFAULT_DATABASE_URL};

pub const DEFAULT_ISSUER: &str = "countries-app";
pub const DEFAULT_ACCESS_TOKEN_LIFETIME: Duration = Duration::from_secs(8 * 60 * 60);
pub const DEFAULT_REFRESH_TOKEN_LIFETIME: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Clone)]
pub struct TokenConfig {
    /// The secret used to sign access tokens.
    /// If it changes, every outstanding access token stops verifying.
    pub access_secret: Vec<u8>,
    /// The secret used to sign refresh tokens. Must differ from `access_secret`
    /// in any real deployment.
    pub refresh_secret: Vec<u8>,
    pub access_token_lifetime: Duration,
    pub refresh_token_lifetime: Duration,
    /// Issuer embedded in, and required of, every token.
    pub issuer: String,
}

impl TokenConfig {
    pub fn new(access_secret: impl Into<Vec<u8>>, refresh_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_token_lifetime: DEFAULT_ACCESS_TOKEN_LIFETIME,
            refresh_token_lifetime: DEFAULT_REFRESH_TOKEN_LIFETIME,
            issuer: DEFAULT_ISSUER.to_owned(),
        }
    }
}

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Clone)]
#[command(
    name = "country-favorites",
    about = "Country search and per-user favorites behind bearer token auth"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3001")]
    pub port: u16,

    /// Origins allowed to make credentialed cross-origin requests
    #[arg(
        long,
        env = "ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:3000",
        value_parser = parse_origin
    )]
    pub allowed_origins: Vec<String>,

    /// Secret for signing access tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Secret for signing refresh tokens
    #[arg(long, env = "JWT_REFRESH_SECRET", hide_env_values = true)]
    pub jwt_refresh_secret: Option<String>,

    /// Access token lifetime, e.g. "15m", "8h", "2 days" or a number of milliseconds
    #[arg(long, env = "JWT_EXPIRES_IN", default_value = "8h", value_parser = parse_lifetime)]
    pub jwt_expires_in: Duration,

    /// Refresh token lifetime, e.g. "7d"
    #[arg(long, env = "JWT_REFRESH_EXPIRES_IN", default_value = "7d", value_parser = parse_lifetime)]
    pub jwt_refresh_expires_in: Duration,

    #[arg(long, env = "JWT_ISSUER", default_value = DEFAULT_ISSUER)]
    pub jwt_issuer: String,

    /// Base URL of the country name search endpoint
    #[arg(long, env = "COUNTRIES_API_URL", default_value = REST_COUNTRIES_URL)]
    pub countries_api_url: String,

    /// Upper bound on one country search against the upstream API
    #[arg(long, env = "COUNTRIES_API_TIMEOUT", default_value = "10s", value_parser = parse_lifetime)]
    pub countries_api_timeout: Duration,

    /// SQLite database holding users and favorites; created if missing
    #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    pub database_url: String,

    /// PEM certificate chain; serves HTTPS when given together with --tls-key
    #[arg(long, env = "TLS_CERT", requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,

    #[arg(long, env = "TLS_KEY", requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

impl Args {
    /// Secrets that were not supplied come through empty; the token service
    /// refuses to start with them.
    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            access_secret: self.jwt_secret.clone().unwrap_or_default().into_bytes(),
            refresh_secret: self
                .jwt_refresh_secret
                .clone()
                .unwrap_or_default()
                .into_bytes(),
            access_token_lifetime: self.jwt_expires_in,
            refresh_token_lifetime: self.jwt_refresh_expires_in,
            issuer: self.jwt_issuer.clone(),
        }
    }
}

/// Parse a lifetime such as "30s", "15m", "1.5h", "2 days", "1y" or "100ms".
/// Units are case-insensitive and may be spelled out; a bare number counts
/// milliseconds. A year is 365.25 days.
pub fn parse_lifetime(s: &str) -> Result<Duration, String> {
    let trimmed = s.trim();
    let unit_start = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (amount, unit) = trimmed.split_at(unit_start);

    if amount.is_empty() || amount.ends_with('.') {
        return Err(format!("Invalid lifetime: {s:?}"));
    }
    let amount: f64 = amount
        .parse()
        .map_err(|_| format!("Invalid lifetime: {s:?}"))?;

    let millis_per_unit = match unit.trim_start_matches(' ').to_ascii_lowercase().as_str() {
        "" | "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => 1.0,
        "s" | "sec" | "secs" | "second" | "seconds" => 1_000.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60_000.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600_000.0,
        "d" | "day" | "days" => 86_400_000.0,
        "w" | "week" | "weeks" => 604_800_000.0,
        "y" | "yr" | "yrs" | "year" | "years" => 31_557_600_000.0,
        _ => return Err(format!("Unknown lifetime unit {unit:?} in {s:?}")),
    };

    let millis = (amount * millis_per_unit).round();
    if millis >= u64::MAX as f64 {
        return Err(format!("Lifetime out of range: {s:?}"));
    }

    Ok(Duration::from_millis(millis as u64))
}

/// Accept an http(s) origin such as "https://app.example.com" or
/// "http://localhost:3000" and return it in serialized origin form.
pub fn parse_origin(s: &str) -> Result<String, String> {
    let url = Url::parse(s.trim()).map_err(|e| format!("Invalid origin {s:?}: {e}"))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!(
            "Invalid origin {s:?}: expected scheme://host[:port] with an http or https scheme"
        ));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(format!("Invalid origin {s:?}: missing host"));
    }
    if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
        return Err(format!("Invalid origin {s:?}: must not have a path or query"));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(format!("Invalid origin {s:?}: must not carry credentials"));
    }

    Ok(url.origin().ascii_serialization())
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}
