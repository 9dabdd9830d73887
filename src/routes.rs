use std::{convert::Infallible, sync::Arc};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};
use warp::{
    http::StatusCode,
    path,
    reply::{Json, WithStatus},
    Filter, Rejection, Reply,
};

use crate::{
    api::{Api, ApiInternal},
    countries::Country,
    error::{ApiError, GateRejection, RefreshTokenError},
    gate::{with_auth, AuthenticatedIdentity},
    types::{Email, FavoriteID, Identity, NewFavorite, NewUser, TokenPair, UserProfile},
};

const MAX_BODY_BYTES: u64 = 16 * 1024;

pub fn build_api_route_filter(
    api: &Api,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let health = path!("api" / "test-db")
        .and(warp::get())
        .and(with_api_state(api.internal.clone()))
        .and_then(database_health);

    let register = path!("api" / "auth" / "register")
        .and(warp::post())
        .and(json_body())
        .and(with_api_state(api.internal.clone()))
        .and_then(user_register);

    let login = path!("api" / "auth" / "login")
        .and(warp::post())
        .and(json_body())
        .and(with_api_state(api.internal.clone()))
        .and_then(user_login);

    let refresh = path!("api" / "auth" / "refresh")
        .and(warp::post())
        .and(json_body())
        .and(with_api_state(api.internal.clone()))
        .and_then(token_refresh);

    let search = path!("api" / "countries" / "search")
        .and(warp::get())
        .and(warp::query::<SearchQuery>())
        .and(with_api_state(api.internal.clone()))
        .and_then(search_countries);

    let add_favorite = path!("api" / "favorites")
        .and(warp::post())
        .and(with_auth(api.tokens()))
        .and(json_body())
        .and(with_api_state(api.internal.clone()))
        .and_then(favorite_add);

    let list_favorites = path!("api" / "favorites")
        .and(warp::get())
        .and(with_auth(api.tokens()))
        .and(with_api_state(api.internal.clone()))
        .and_then(favorite_list);

    let delete_favorite = path!("api" / "favorites" / String)
        .and(warp::delete())
        .and(with_auth(api.tokens()))
        .and(with_api_state(api.internal.clone()))
        .and_then(favorite_delete);

    health
        .or(register)
        .or(login)
        .or(refresh)
        .or(search)
        .or(add_favorite)
        .or(list_favorites)
        .or(delete_favorite)
}

/// Turn the rejections raised by the API and the auth gate into JSON error
/// responses. Anything else is passed on untouched.
pub async fn handle_api_errors(err: Rejection) -> Result<impl Reply, Rejection> {
    if let Some(rejection) = err.find::<GateRejection>() {
        let reply = match rejection {
            GateRejection::MissingHeader | GateRejection::MalformedHeader => json_reply(
                StatusCode::UNAUTHORIZED,
                json!({ "message": rejection.to_string() }),
            ),
            GateRejection::InvalidToken(reason) => json_reply(
                StatusCode::FORBIDDEN,
                json!({ "message": rejection.to_string(), "error": reason.to_string() }),
            ),
        };
        return Ok(reply);
    }

    if let Some(api_error) = err.find::<ApiError>() {
        let message = api_error.to_string();
        let reply = match api_error {
            ApiError::MissingCredentials
            | ApiError::MissingRefreshToken
            | ApiError::MissingQuery
            | ApiError::MissingCountryName
            | ApiError::InvalidFavoriteId => {
                json_reply(StatusCode::BAD_REQUEST, json!({ "message": message }))
            }
            ApiError::LoginFailed => {
                json_reply(StatusCode::UNAUTHORIZED, json!({ "message": message }))
            }
            ApiError::Refresh {
                source: RefreshTokenError::InvalidOrExpired,
            } => json_reply(StatusCode::FORBIDDEN, json!({ "message": message })),
            ApiError::EmailTaken | ApiError::FavoriteExists => {
                json_reply(StatusCode::CONFLICT, json!({ "message": message }))
            }
            ApiError::FavoriteNotFound => {
                json_reply(StatusCode::NOT_FOUND, json!({ "message": message }))
            }
            ApiError::DatabaseUnavailable { source } => {
                error!(error = %source, "database unreachable");
                json_reply(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "message": message, "error": source.to_string() }),
                )
            }
            ApiError::CountryLookup { source } => {
                error!(error = %source, "country lookup failed");
                json_reply(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "success": false, "message": message, "error": source.to_string() }),
                )
            }
            other => {
                error!(error = ?other, "request failed");
                json_reply(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "message": message }),
                )
            }
        };
        return Ok(reply);
    }

    Err(err)
}

fn json_reply(status: StatusCode, body: serde_json::Value) -> WithStatus<Json> {
    warp::reply::with_status(warp::reply::json(&body), status)
}

async fn database_health(api: Arc<ApiInternal>) -> Result<impl Reply, Rejection> {
    api.ping_database().await?;

    Ok(warp::reply::json(
        &json!({ "message": "Database connection successful" }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
}

async fn user_register(
    input: RegisterRequest,
    api: Arc<ApiInternal>,
) -> Result<impl Reply, Rejection> {
    let (Some(email), Some(password)) = (non_empty(input.email), present(input.password)) else {
        return Err(ApiError::MissingCredentials.into());
    };

    let new_user = NewUser {
        email: Email(email),
        hashed_password: api.hash(&password)?,
        name: non_empty(input.name),
    };

    let Some(user_id) = api.create_user_if_not_exists(&new_user).await? else {
        return Err(ApiError::EmailTaken.into());
    };

    info!(user_id = %user_id, "user registered");

    Ok(json_reply(
        StatusCode::CREATED,
        json!({ "message": "User registered successfully." }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub message: String,
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: UserProfile,
}

async fn user_login(input: LoginRequest, api: Arc<ApiInternal>) -> Result<impl Reply, Rejection> {
    let (Some(email), Some(password)) = (non_empty(input.email), present(input.password)) else {
        return Err(ApiError::MissingCredentials.into());
    };

    let Some(user) = api.retrieve_user(&Email(email)).await? else {
        return Err(ApiError::LoginFailed.into());
    };

    if !api.verify_hash(&password, &user.hashed_password) {
        warn!(user_id = %user.id, "login attempt with wrong password");
        return Err(ApiError::LoginFailed.into());
    }

    let identity = Identity::new(user.id, Some(user.email.0.clone()));
    let tokens = api.tokens.generate_tokens(&identity).map_err(ApiError::from)?;

    info!(user_id = %user.id, "user logged in");

    Ok(warp::reply::json(&LoginResponse {
        message: "Login successful.".into(),
        tokens,
        user: UserProfile::from(&user),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

async fn token_refresh(
    input: RefreshRequest,
    api: Arc<ApiInternal>,
) -> Result<impl Reply, Rejection> {
    let Some(refresh_token) = non_empty(input.refresh_token) else {
        return Err(ApiError::MissingRefreshToken.into());
    };

    let refreshed = api
        .tokens
        .refresh_access_token(&refresh_token)
        .map_err(ApiError::from)?;

    Ok(warp::reply::json(&refreshed))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub success: bool,
    pub countries: Vec<Country>,
}

async fn search_countries(
    input: SearchQuery,
    api: Arc<ApiInternal>,
) -> Result<impl Reply, Rejection> {
    let Some(query) = non_empty(input.query) else {
        return Err(ApiError::MissingQuery.into());
    };

    let countries = api.search_countries(&query).await?;

    Ok(warp::reply::with_header(
        warp::reply::json(&SearchResponse {
            success: true,
            countries,
        }),
        "cache-control",
        "no-cache",
    ))
}

#[derive(Debug, Deserialize)]
pub struct FavoriteRequest {
    pub country_name: Option<String>,
    pub flag: Option<String>,
    pub capital: Option<String>,
    pub population: Option<u64>,
    pub region: Option<String>,
}

async fn favorite_add(
    identity: AuthenticatedIdentity,
    input: FavoriteRequest,
    api: Arc<ApiInternal>,
) -> Result<impl Reply, Rejection> {
    let Some(country_name) = non_empty(input.country_name) else {
        return Err(ApiError::MissingCountryName.into());
    };

    let favorite = NewFavorite {
        country_name,
        flag: input.flag,
        capital: input.capital,
        population: input.population,
        region: input.region,
    };

    if !api
        .insert_favorite_if_absent(identity.user_id(), &favorite)
        .await?
    {
        return Err(ApiError::FavoriteExists.into());
    }

    Ok(json_reply(
        StatusCode::CREATED,
        json!({ "message": "Favorite added." }),
    ))
}

async fn favorite_list(
    identity: AuthenticatedIdentity,
    api: Arc<ApiInternal>,
) -> Result<impl Reply, Rejection> {
    let favorites = api.list_favorites(identity.user_id()).await?;

    Ok(warp::reply::json(&favorites))
}

async fn favorite_delete(
    favorite_id: String,
    identity: AuthenticatedIdentity,
    api: Arc<ApiInternal>,
) -> Result<impl Reply, Rejection> {
    let favorite_id = favorite_id
        .parse()
        .map(FavoriteID)
        .map_err(|_| ApiError::InvalidFavoriteId)?;

    if !api
        .delete_favorite(identity.user_id(), favorite_id)
        .await?
    {
        return Err(ApiError::FavoriteNotFound.into());
    }

    Ok(warp::reply::json(&json!({ "message": "Favorite deleted." })))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

// passwords are taken as typed, so only an empty one counts as missing
fn present(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

fn json_body<T: DeserializeOwned + Send + 'static>(
) -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

// functor that adds a reference to the internal api state into the filter chain
fn with_api_state(
    api: Arc<ApiInternal>,
) -> impl Filter<Extract = (Arc<ApiInternal>,), Error = Infallible> + Clone {
    warp::any().map(move || api.clone())
}
