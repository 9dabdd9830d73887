use std::{error::Error, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::anyhow;
use async_trait::async_trait;
use country_favorites::{
    build_api_route_filter, handle_api_errors, Api, ApiConfig, Country, CountrySource,
    FavoritesDatabase, InMemoryStore, SqlStore, TokenConfig, UserDatabase,
};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use warp::Filter;

struct FixedCountries;

#[async_trait]
impl CountrySource for FixedCountries {
    async fn search(&self, query: &str) -> Result<Vec<Country>, Box<dyn Error + Send + Sync>> {
        if query == "fail" {
            return Err(anyhow!("upstream unavailable").into());
        }

        Ok(vec![Country {
            name: "Peru".into(),
            flag: "https://flagcdn.com/w320/pe.png".into(),
            capital: "Lima".into(),
            population: 32971846,
            region: "Americas".into(),
        }])
    }
}

fn start_server(tokens: TokenConfig) -> SocketAddr {
    start_server_with_store(tokens, InMemoryStore::new())
}

fn start_server_with_store<S: UserDatabase + FavoritesDatabase>(
    tokens: TokenConfig,
    store: S,
) -> SocketAddr {
    let store = Arc::new(Mutex::new(store));

    let config = ApiConfig {
        tokens,
        users: store.clone(),
        favorites: store,
        countries: Arc::new(FixedCountries),
    };

    let api = Api::new(config).unwrap();

    let routes = build_api_route_filter(&api).recover(handle_api_errors);

    let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    addr
}

fn token_config() -> TokenConfig {
    TokenConfig::new("integration access secret", "integration refresh secret")
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
    refresh_token: String,
    user: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
}

#[tokio::test]
async fn integration() {
    full_flow(start_server(token_config())).await;
}

#[tokio::test]
async fn integration_with_sqlite() {
    let store = SqlStore::connect("sqlite::memory:").await.unwrap();

    full_flow(start_server_with_store(token_config(), store)).await;
}

async fn full_flow(addr: SocketAddr) {
    let base = format!("http://{addr}");
    let client = reqwest::Client::new();

    assert_eq!(
        client
            .get(format!("{base}/api/test-db"))
            .send()
            .await
            .unwrap()
            .status(),
        StatusCode::OK,
        "health check failed"
    );

    assert_eq!(
        client
            .post(format!("{base}/api/auth/register"))
            .json(&json!({"email": "sam@example.com", "password": "foobar", "name": "Sam"}))
            .send()
            .await
            .unwrap()
            .status(),
        StatusCode::CREATED,
        "failed to register user"
    );

    assert_eq!(
        client
            .post(format!("{base}/api/auth/register"))
            .json(&json!({"email": "sam@example.com", "password": "fizzbuzz"}))
            .send()
            .await
            .unwrap()
            .status(),
        StatusCode::CONFLICT,
        "attempt to register the same email twice should have been denied"
    );

    assert_eq!(
        client
            .post(format!("{base}/api/auth/register"))
            .json(&json!({"email": "no-password@example.com"}))
            .send()
            .await
            .unwrap()
            .status(),
        StatusCode::BAD_REQUEST,
        "registration without a password should have been denied"
    );

    assert_eq!(
        client
            .post(format!("{base}/api/auth/login"))
            .json(&json!({"email": "sam@example.com", "password": "hunter1"}))
            .send()
            .await
            .unwrap()
            .status(),
        StatusCode::UNAUTHORIZED,
        "attempt to login with an invalid password should have been denied"
    );

    assert_eq!(
        client
            .post(format!("{base}/api/auth/login"))
            .json(&json!({"email": "nobody@example.com", "password": "foobar"}))
            .send()
            .await
            .unwrap()
            .status(),
        StatusCode::UNAUTHORIZED,
        "attempt to login as an unknown user should have been denied"
    );

    let login_response = client
        .post(format!("{base}/api/auth/login"))
        .json(&json!({"email": "sam@example.com", "password": "foobar"}))
        .send()
        .await
        .unwrap();

    assert_eq!(
        login_response.status(),
        StatusCode::OK,
        "failed to login as user"
    );

    let login = login_response.json::<LoginResponse>().await.unwrap();
    assert_eq!(login.user["email"], "sam@example.com");
    assert_eq!(login.user["name"], "Sam");

    let favorites = format!("{base}/api/favorites");

    assert_eq!(
        client.get(&favorites).send().await.unwrap().status(),
        StatusCode::UNAUTHORIZED,
        "favorites without an authorization header should have been denied"
    );

    assert_eq!(
        client
            .get(&favorites)
            .header("authorization", format!("Token {}", login.access_token))
            .send()
            .await
            .unwrap()
            .status(),
        StatusCode::UNAUTHORIZED,
        "favorites with a non-bearer authorization header should have been denied"
    );

    let bad_token = client
        .get(&favorites)
        .bearer_auth("fake.token.value")
        .send()
        .await
        .unwrap();
    assert_eq!(
        bad_token.status(),
        StatusCode::FORBIDDEN,
        "favorites with a bad token should have been denied"
    );
    let body = bad_token.json::<Value>().await.unwrap();
    assert_eq!(body["error"], "Invalid access token format.");

    assert_eq!(
        client
            .post(&favorites)
            .bearer_auth(&login.access_token)
            .json(&json!({"flag": "https://flagcdn.com/w320/pe.png"}))
            .send()
            .await
            .unwrap()
            .status(),
        StatusCode::BAD_REQUEST,
        "a favorite without a country name should have been denied"
    );

    let peru = json!({
        "country_name": "Peru",
        "flag": "https://flagcdn.com/w320/pe.png",
        "capital": "Lima",
        "population": 32971846,
        "region": "Americas"
    });

    assert_eq!(
        client
            .post(&favorites)
            .bearer_auth(&login.access_token)
            .json(&peru)
            .send()
            .await
            .unwrap()
            .status(),
        StatusCode::CREATED,
        "failed to add favorite"
    );

    assert_eq!(
        client
            .post(&favorites)
            .bearer_auth(&login.access_token)
            .json(&peru)
            .send()
            .await
            .unwrap()
            .status(),
        StatusCode::CONFLICT,
        "adding the same favorite twice should have been denied"
    );

    let listed = client
        .get(&favorites)
        .bearer_auth(&login.access_token)
        .send()
        .await
        .unwrap()
        .json::<Vec<Value>>()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["country_name"], "Peru");
    assert_eq!(listed[0]["capital"], "Lima");
    let favorite_id = listed[0]["id"].as_i64().unwrap();

    assert_eq!(
        client
            .delete(format!("{favorites}/not-a-number"))
            .bearer_auth(&login.access_token)
            .send()
            .await
            .unwrap()
            .status(),
        StatusCode::BAD_REQUEST,
        "deleting with a non-numeric id should have been denied"
    );

    assert_eq!(
        client
            .delete(format!("{favorites}/{favorite_id}"))
            .bearer_auth(&login.access_token)
            .send()
            .await
            .unwrap()
            .status(),
        StatusCode::OK,
        "failed to delete favorite"
    );

    assert_eq!(
        client
            .delete(format!("{favorites}/{favorite_id}"))
            .bearer_auth(&login.access_token)
            .send()
            .await
            .unwrap()
            .status(),
        StatusCode::NOT_FOUND,
        "deleting a missing favorite should report not found"
    );

    let refresh_response = client
        .post(format!("{base}/api/auth/refresh"))
        .json(&json!({"refreshToken": login.refresh_token}))
        .send()
        .await
        .unwrap();
    assert_eq!(
        refresh_response.status(),
        StatusCode::OK,
        "failed to refresh access token"
    );
    let refreshed = refresh_response.json::<RefreshResponse>().await.unwrap();

    assert_eq!(
        client
            .get(&favorites)
            .bearer_auth(&refreshed.access_token)
            .send()
            .await
            .unwrap()
            .status(),
        StatusCode::OK,
        "refreshed access token should be accepted"
    );

    assert_eq!(
        client
            .post(format!("{base}/api/auth/refresh"))
            .json(&json!({"refreshToken": login.access_token}))
            .send()
            .await
            .unwrap()
            .status(),
        StatusCode::FORBIDDEN,
        "an access token should not work as a refresh token"
    );

    assert_eq!(
        client
            .post(format!("{base}/api/auth/refresh"))
            .json(&json!({}))
            .send()
            .await
            .unwrap()
            .status(),
        StatusCode::BAD_REQUEST,
        "refresh without a token should have been denied"
    );
}

#[tokio::test]
async fn favorites_are_private_to_their_owner() {
    let base = format!("http://{}", start_server(token_config()));
    let client = reqwest::Client::new();

    let mut access_tokens = Vec::new();
    for email in ["alice@example.com", "bob@example.com"] {
        client
            .post(format!("{base}/api/auth/register"))
            .json(&json!({"email": email, "password": "correct horse"}))
            .send()
            .await
            .unwrap();

        let login = client
            .post(format!("{base}/api/auth/login"))
            .json(&json!({"email": email, "password": "correct horse"}))
            .send()
            .await
            .unwrap()
            .json::<LoginResponse>()
            .await
            .unwrap();
        access_tokens.push(login.access_token);
    }
    let (alice, bob) = (&access_tokens[0], &access_tokens[1]);

    let favorites = format!("{base}/api/favorites");
    client
        .post(&favorites)
        .bearer_auth(alice)
        .json(&json!({"country_name": "Chile"}))
        .send()
        .await
        .unwrap();

    let alices = client
        .get(&favorites)
        .bearer_auth(alice)
        .send()
        .await
        .unwrap()
        .json::<Vec<Value>>()
        .await
        .unwrap();
    let bobs = client
        .get(&favorites)
        .bearer_auth(bob)
        .send()
        .await
        .unwrap()
        .json::<Vec<Value>>()
        .await
        .unwrap();
    assert_eq!(alices.len(), 1);
    assert!(bobs.is_empty());

    let chile = alices[0]["id"].as_i64().unwrap();
    assert_eq!(
        client
            .delete(format!("{favorites}/{chile}"))
            .bearer_auth(bob)
            .send()
            .await
            .unwrap()
            .status(),
        StatusCode::NOT_FOUND,
        "one user must not delete another user's favorite"
    );
}

#[tokio::test]
async fn expired_access_token_is_forbidden() {
    let mut tokens = token_config();
    tokens.access_token_lifetime = Duration::ZERO;
    let base = format!("http://{}", start_server(tokens));
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/api/auth/register"))
        .json(&json!({"email": "late@example.com", "password": "pw"}))
        .send()
        .await
        .unwrap();
    let login = client
        .post(format!("{base}/api/auth/login"))
        .json(&json!({"email": "late@example.com", "password": "pw"}))
        .send()
        .await
        .unwrap()
        .json::<LoginResponse>()
        .await
        .unwrap();

    let response = client
        .get(format!("{base}/api/favorites"))
        .bearer_auth(&login.access_token)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = response.json::<Value>().await.unwrap();
    assert_eq!(
        body["error"],
        "Access token has expired. Please refresh your token."
    );
}

#[tokio::test]
async fn country_search() {
    let base = format!("http://{}", start_server(token_config()));
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{base}/api/countries/search?query=peru"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["cache-control"], "no-cache");
    let body = response.json::<Value>().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["countries"][0]["name"], "Peru");
    assert_eq!(body["countries"][0]["capital"], "Lima");

    assert_eq!(
        client
            .get(format!("{base}/api/countries/search"))
            .send()
            .await
            .unwrap()
            .status(),
        StatusCode::BAD_REQUEST,
        "search without a query should have been denied"
    );

    let failed = client
        .get(format!("{base}/api/countries/search?query=fail"))
        .send()
        .await
        .unwrap();
    assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = failed.json::<Value>().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "upstream unavailable");
}

#[test]
fn api_refuses_to_start_without_secrets() {
    let store = Arc::new(Mutex::new(InMemoryStore::new()));

    let config = ApiConfig {
        tokens: TokenConfig::new("", ""),
        users: store.clone(),
        favorites: store,
        countries: Arc::new(FixedCountries),
    };

    assert!(Api::new(config).is_err());
}

#[tokio::test]
async fn unreachable_database_fails_the_health_check() {
    let store = SqlStore::connect("sqlite::memory:").await.unwrap();
    store.close().await;
    let base = format!("http://{}", start_server_with_store(token_config(), store));

    let response = reqwest::get(format!("{base}/api/test-db")).await.unwrap();

    assert_eq!(
        response.status(),
        StatusCode::INTERNAL_SERVER_ERROR,
        "health check should report the closed pool"
    );
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Database connection failed");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn whitespace_password_is_still_a_password() {
    let base = format!("http://{}", start_server(token_config()));
    let client = reqwest::Client::new();

    assert_eq!(
        client
            .post(format!("{base}/api/auth/register"))
            .json(&json!({"email": "spaces@example.com", "password": "   "}))
            .send()
            .await
            .unwrap()
            .status(),
        StatusCode::CREATED,
        "a whitespace password should be accepted as given"
    );

    assert_eq!(
        client
            .post(format!("{base}/api/auth/login"))
            .json(&json!({"email": "spaces@example.com", "password": "   "}))
            .send()
            .await
            .unwrap()
            .status(),
        StatusCode::OK,
        "login with the same whitespace password should succeed"
    );

    assert_eq!(
        client
            .post(format!("{base}/api/auth/login"))
            .json(&json!({"email": "spaces@example.com", "password": " "}))
            .send()
            .await
            .unwrap()
            .status(),
        StatusCode::UNAUTHORIZED,
        "a different whitespace password must not match"
    );

    assert_eq!(
        client
            .post(format!("{base}/api/auth/register"))
            .json(&json!({"email": "empty@example.com", "password": ""}))
            .send()
            .await
            .unwrap()
            .status(),
        StatusCode::BAD_REQUEST,
        "an empty password is still missing"
    );
}
