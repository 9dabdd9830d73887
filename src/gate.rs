use std::{convert::Infallible, sync::Arc};

use tracing::debug;
use warp::{
    http::{header::AUTHORIZATION, HeaderMap},
    Filter, Rejection,
};

use crate::{
    error::GateRejection,
    tokens::{AccessClaims, TokenService},
    types::UserID,
};

const BEARER_PREFIX: &str = "Bearer ";

/// The verified claims of the access token presented with a request.
#[derive(Debug, Clone)]
pub struct AuthenticatedIdentity {
    pub claims: AccessClaims,
}

impl AuthenticatedIdentity {
    pub fn user_id(&self) -> UserID {
        self.claims.payload.id
    }

    pub fn email(&self) -> Option<&str> {
        self.claims.payload.email.as_deref()
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` value. The prefix
/// is case sensitive and the token may not contain whitespace.
pub fn extract_bearer(header: Option<&str>) -> Option<&str> {
    let token = header?.strip_prefix(BEARER_PREFIX)?;

    if token.is_empty() || token.contains(char::is_whitespace) {
        return None;
    }

    Some(token)
}

pub fn authenticate(
    tokens: &TokenService,
    headers: &HeaderMap,
) -> Result<AuthenticatedIdentity, GateRejection> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(GateRejection::MissingHeader)?;

    let token = extract_bearer(value.to_str().ok()).ok_or(GateRejection::MalformedHeader)?;

    let claims = tokens
        .verify_access_token(token)
        .map_err(GateRejection::InvalidToken)?;

    Ok(AuthenticatedIdentity { claims })
}

/// Filter that admits requests carrying a valid access token, extracting the
/// caller's identity. Anything else is rejected with a [`GateRejection`].
pub fn with_auth(
    tokens: Arc<TokenService>,
) -> impl Filter<Extract = (AuthenticatedIdentity,), Error = Rejection> + Clone {
    warp::header::headers_cloned()
        .and(with_token_service(tokens))
        .and_then(user_auth_check)
}

async fn user_auth_check(
    headers: HeaderMap,
    tokens: Arc<TokenService>,
) -> Result<AuthenticatedIdentity, Rejection> {
    authenticate(&tokens, &headers).map_err(|rejection| {
        debug!(reason = ?rejection, "request rejected by auth gate");
        warp::reject::custom(rejection)
    })
}

fn with_token_service(
    tokens: Arc<TokenService>,
) -> impl Filter<Extract = (Arc<TokenService>,), Error = Infallible> + Clone {
    warp::any().map(move || tokens.clone())
}
