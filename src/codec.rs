use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::CodecError;

const ALGORITHM: Algorithm = Algorithm::HS256;

/// Secret used to sign and verify one family of tokens.
#[derive(Clone)]
pub struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// A decoded HS256 claim set: the caller's payload with `iat`, `exp`, `iss`
/// and `aud` added alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Claims<P> {
    #[serde(flatten)]
    pub payload: P,
    /// Issued at (Unix seconds)
    pub iat: u64,
    /// Expiry (Unix seconds)
    pub exp: u64,
    pub iss: String,
    pub aud: String,
}

pub fn sign<P: Serialize>(
    payload: &P,
    key: &SigningKey,
    issued_at: SystemTime,
    lifetime: Duration,
    issuer: &str,
    audience: &str,
) -> Result<String, CodecError> {
    let iat = unix_seconds(issued_at)?;

    let claims = Claims {
        payload,
        iat,
        exp: iat.saturating_add(lifetime.as_secs()),
        iss: issuer.to_owned(),
        aud: audience.to_owned(),
    };

    encode(&Header::new(ALGORITHM), &claims, &key.encoding)
        .map_err(|source| CodecError::Signing { source })
}

/// Verify `token` against `key` and the expected issuer and audience.
///
/// The signature is checked first, so a forged token is reported as a
/// signature mismatch even when its claims are also stale. A token is
/// expired from the second named by its `exp` claim onwards.
pub fn verify<P: DeserializeOwned>(
    token: &str,
    key: &SigningKey,
    issuer: &str,
    audience: &str,
) -> Result<Claims<P>, CodecError> {
    let mut validation = Validation::new(ALGORITHM);
    validation.leeway = 0;
    validation.set_issuer(&[issuer]);
    validation.set_audience(&[audience]);
    validation.set_required_spec_claims(&["exp", "iss", "aud"]);

    let claims = decode::<Claims<P>>(token, &key.decoding, &validation)
        .map_err(classify)?
        .claims;

    if unix_seconds(SystemTime::now())? >= claims.exp {
        return Err(CodecError::Expired);
    }

    Ok(claims)
}

fn classify(err: jsonwebtoken::errors::Error) -> CodecError {
    match err.kind() {
        ErrorKind::InvalidSignature => CodecError::SignatureMismatch,
        ErrorKind::ExpiredSignature => CodecError::Expired,
        ErrorKind::InvalidAudience => CodecError::AudienceMismatch,
        ErrorKind::InvalidIssuer => CodecError::IssuerMismatch,
        _ => CodecError::Malformed,
    }
}

fn unix_seconds(time: SystemTime) -> Result<u64, CodecError> {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .map_err(|_| CodecError::Clock)
}
