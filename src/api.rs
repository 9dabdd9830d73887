use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::{
    config::TokenConfig,
    countries::{Country, CountrySource},
    error::{ApiError, ConfigError},
    store::{FavoritesDatabase, UserDatabase},
    tokens::TokenService,
    types::{Email, Favorite, FavoriteID, HashedPassword, NewFavorite, NewUser, UserID, UserRecord},
};

#[derive(Clone)]
pub struct ApiConfig {
    /// Secrets, lifetimes and issuer for the tokens handed out on login.
    pub tokens: TokenConfig,
    pub users: Arc<Mutex<dyn UserDatabase>>,
    pub favorites: Arc<Mutex<dyn FavoritesDatabase>>,
    pub countries: Arc<dyn CountrySource>,
}

pub(crate) struct ApiInternal {
    pub(crate) tokens: Arc<TokenService>,
    users: Arc<Mutex<dyn UserDatabase>>,
    favorites: Arc<Mutex<dyn FavoritesDatabase>>,
    countries: Arc<dyn CountrySource>,
}

impl ApiInternal {
    /// Hash with a fresh random salt; the salt is recorded in the encoded hash.
    pub fn hash(&self, password: &str) -> Result<HashedPassword, ApiError> {
        let salt = Uuid::new_v4();
        let encoded =
            argon2::hash_encoded(password.as_bytes(), salt.as_bytes(), &Default::default())?;

        Ok(HashedPassword(encoded))
    }

    pub fn verify_hash(&self, password: &str, hash: &HashedPassword) -> bool {
        argon2::verify_encoded(&hash.0, password.as_bytes()).unwrap_or_else(|e| {
            warn!(error = %e, "stored password hash could not be checked");
            false
        })
    }

    pub async fn create_user_if_not_exists(
        &self,
        new_user: &NewUser,
    ) -> Result<Option<UserID>, ApiError> {
        let user_id = self
            .users
            .lock()
            .await
            .create_user_if_not_exists(new_user)
            .await?;

        Ok(user_id)
    }

    pub async fn retrieve_user(&self, email: &Email) -> Result<Option<UserRecord>, ApiError> {
        let user = self.users.lock().await.retrieve_user(email).await?;

        Ok(user)
    }

    pub async fn ping_database(&self) -> Result<(), ApiError> {
        self.users
            .lock()
            .await
            .ping()
            .await
            .map_err(|source| ApiError::DatabaseUnavailable { source })
    }

    pub async fn insert_favorite_if_absent(
        &self,
        user_id: UserID,
        favorite: &NewFavorite,
    ) -> Result<bool, ApiError> {
        let inserted = self
            .favorites
            .lock()
            .await
            .insert_favorite_if_absent(user_id, favorite)
            .await?;

        Ok(inserted)
    }

    pub async fn list_favorites(&self, user_id: UserID) -> Result<Vec<Favorite>, ApiError> {
        let favorites = self.favorites.lock().await.list_favorites(user_id).await?;

        Ok(favorites)
    }

    pub async fn delete_favorite(
        &self,
        user_id: UserID,
        favorite_id: FavoriteID,
    ) -> Result<bool, ApiError> {
        let deleted = self
            .favorites
            .lock()
            .await
            .delete_favorite(user_id, favorite_id)
            .await?;

        Ok(deleted)
    }

    pub async fn search_countries(&self, query: &str) -> Result<Vec<Country>, ApiError> {
        self.countries
            .search(query)
            .await
            .map_err(|source| ApiError::CountryLookup { source })
    }
}

/// Shared handle to the API's token service and collaborators. Cheap to clone.
#[derive(Clone)]
pub struct Api {
    pub(crate) internal: Arc<ApiInternal>,
}

impl Api {
    /// Fails if either token secret is empty.
    pub fn new(config: ApiConfig) -> Result<Self, ConfigError> {
        let tokens = TokenService::new(&config.tokens)?;

        Ok(Self {
            internal: Arc::new(ApiInternal {
                tokens: Arc::new(tokens),
                users: config.users,
                favorites: config.favorites,
                countries: config.countries,
            }),
        })
    }

    pub fn tokens(&self) -> Arc<TokenService> {
        self.internal.tokens.clone()
    }
}
