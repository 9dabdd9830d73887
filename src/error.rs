use std::error::Error;

use warp::reject::Reject;

/// Problems with the startup configuration. Any of these stops the process
/// before it serves traffic.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set to a non-empty value")]
    MissingSecret(&'static str),
    #[error("invalid country API URL {url:?}: {reason}")]
    InvalidCountriesUrl { url: String, reason: String },
    #[error("failed to build the country API client")]
    HttpClient {
        #[from]
        source: reqwest::Error,
    },
}

/// Low level token failures, as reported by the codec.
#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not match")]
    SignatureMismatch,
    #[error("token has expired")]
    Expired,
    #[error("token audience does not match")]
    AudienceMismatch,
    #[error("token issuer does not match")]
    IssuerMismatch,
    #[error("failed to sign token")]
    Signing {
        #[source]
        source: jsonwebtoken::errors::Error,
    },
    #[error("system clock is set before the unix epoch")]
    Clock,
}

/// What a caller learns when an access token is rejected. `Expired` means the
/// client should try its refresh token; the others mean it must log in again.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessTokenError {
    #[error("Access token has expired. Please refresh your token.")]
    Expired,
    #[error("Invalid access token format.")]
    InvalidFormat,
    #[error("Access token verification failed.")]
    VerificationFailed,
}

#[derive(thiserror::Error, Debug)]
pub enum RefreshTokenError {
    #[error("Invalid or expired refresh token")]
    InvalidOrExpired,
    #[error("failed to issue access token")]
    Signing {
        #[from]
        source: CodecError,
    },
}

/// Why the auth gate turned a request away.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRejection {
    #[error("Authorization header required.")]
    MissingHeader,
    #[error("Access token required. Format: Bearer <token>")]
    MalformedHeader,
    #[error("Invalid or expired token.")]
    InvalidToken(AccessTokenError),
}

impl Reject for GateRejection {}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("Email and password are required.")]
    MissingCredentials,
    #[error("Email already exists.")]
    EmailTaken,
    #[error("Invalid email or password.")]
    LoginFailed,
    #[error("Refresh token required.")]
    MissingRefreshToken,
    #[error("{source}")]
    Refresh {
        #[from]
        source: RefreshTokenError,
    },
    #[error("Query parameter is required.")]
    MissingQuery,
    #[error("Country name is required.")]
    MissingCountryName,
    #[error("Country is already in favorites.")]
    FavoriteExists,
    #[error("Invalid favorite ID.")]
    InvalidFavoriteId,
    #[error("Favorite not found.")]
    FavoriteNotFound,
    #[error("Database connection failed")]
    DatabaseUnavailable {
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    #[error("Database error.")]
    DatabaseError {
        #[from]
        source: Box<dyn Error + Send + Sync>,
    },
    #[error("Error fetching countries.")]
    CountryLookup {
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    #[error("Could not issue token.")]
    TokenError {
        #[from]
        source: CodecError,
    },
    #[error("Could not process password.")]
    PasswordHash {
        #[from]
        source: argon2::Error,
    },
}

impl Reject for ApiError {}
