use std::time::{Duration, SystemTime};

use tracing::debug;

use crate::{
    codec::{self, Claims, SigningKey},
    config::TokenConfig,
    error::{AccessTokenError, CodecError, ConfigError, RefreshTokenError},
    types::{Identity, RefreshSubject, RefreshedAccessToken, TokenPair},
};

pub const ACCESS_AUDIENCE: &str = "user";
pub const REFRESH_AUDIENCE: &str = "refresh";

/// Claims recovered from a verified access token.
pub type AccessClaims = Claims<Identity>;

/// Claims recovered from a verified refresh token. Refresh tokens are signed
/// with the subject id only, so `payload.email` is normally `None`.
pub type RefreshClaims = Claims<Identity>;

/// Issues and verifies access/refresh token pairs.
///
/// The two token families use independent secrets and audiences, so a token
/// of one kind never verifies as the other. Holds no mutable state and can be
/// shared freely between request handlers.
pub struct TokenService {
    access_key: SigningKey,
    refresh_key: SigningKey,
    access_token_lifetime: Duration,
    refresh_token_lifetime: Duration,
    issuer: String,
}

impl TokenService {
    pub fn new(config: &TokenConfig) -> Result<Self, ConfigError> {
        if config.access_secret.is_empty() {
            return Err(ConfigError::MissingSecret("JWT_SECRET"));
        }
        if config.refresh_secret.is_empty() {
            return Err(ConfigError::MissingSecret("JWT_REFRESH_SECRET"));
        }

        Ok(Self {
            access_key: SigningKey::from_secret(&config.access_secret),
            refresh_key: SigningKey::from_secret(&config.refresh_secret),
            access_token_lifetime: config.access_token_lifetime,
            refresh_token_lifetime: config.refresh_token_lifetime,
            issuer: config.issuer.clone(),
        })
    }

    pub fn generate_access_token(&self, identity: &Identity) -> Result<String, CodecError> {
        codec::sign(
            identity,
            &self.access_key,
            SystemTime::now(),
            self.access_token_lifetime,
            &self.issuer,
            ACCESS_AUDIENCE,
        )
    }

    /// Only the subject id goes into a refresh token; profile data such as the
    /// email may change during its lifetime.
    pub fn generate_refresh_token(&self, identity: &Identity) -> Result<String, CodecError> {
        codec::sign(
            &RefreshSubject { id: identity.id },
            &self.refresh_key,
            SystemTime::now(),
            self.refresh_token_lifetime,
            &self.issuer,
            REFRESH_AUDIENCE,
        )
    }

    pub fn generate_tokens(&self, identity: &Identity) -> Result<TokenPair, CodecError> {
        Ok(TokenPair {
            access_token: self.generate_access_token(identity)?,
            refresh_token: self.generate_refresh_token(identity)?,
        })
    }

    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AccessTokenError> {
        codec::verify(token, &self.access_key, &self.issuer, ACCESS_AUDIENCE).map_err(|err| {
            debug!(error = %err, "access token rejected");
            match err {
                CodecError::Expired => AccessTokenError::Expired,
                CodecError::Malformed | CodecError::SignatureMismatch => {
                    AccessTokenError::InvalidFormat
                }
                _ => AccessTokenError::VerificationFailed,
            }
        })
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, RefreshTokenError> {
        codec::verify(token, &self.refresh_key, &self.issuer, REFRESH_AUDIENCE).map_err(|err| {
            debug!(error = %err, "refresh token rejected");
            RefreshTokenError::InvalidOrExpired
        })
    }

    /// Issue a new access token from a valid refresh token. The refresh token
    /// itself is not rotated.
    pub fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<RefreshedAccessToken, RefreshTokenError> {
        let claims = self.verify_refresh_token(refresh_token)?;

        let identity = Identity::new(claims.payload.id, claims.payload.email);

        Ok(RefreshedAccessToken {
            access_token: self.generate_access_token(&identity)?,
        })
    }
}
