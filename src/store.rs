use std::{collections::HashMap, error::Error};

use async_trait::async_trait;

use crate::types::{Email, Favorite, FavoriteID, NewFavorite, NewUser, UserID, UserRecord};

#[async_trait]
pub trait UserDatabase: Send + Sync + 'static {
    /// Create the specified user and return its new id. If a user with the
    /// given email already exists, return `None` and leave it untouched.
    async fn create_user_if_not_exists(
        &mut self,
        new_user: &NewUser,
    ) -> Result<Option<UserID>, Box<dyn Error + Send + Sync>>;

    /// Retrieve the user registered under the specified email, if any.
    async fn retrieve_user(
        &self,
        email: &Email,
    ) -> Result<Option<UserRecord>, Box<dyn Error + Send + Sync>>;

    /// Cheap round trip to check the store is reachable.
    async fn ping(&self) -> Result<(), Box<dyn Error + Send + Sync>>;
}

#[async_trait]
pub trait FavoritesDatabase: Send + Sync + 'static {
    /// Store a favorite for the user. Returns `false` if the user already has
    /// a favorite with the same country name.
    async fn insert_favorite_if_absent(
        &mut self,
        user_id: UserID,
        favorite: &NewFavorite,
    ) -> Result<bool, Box<dyn Error + Send + Sync>>;

    async fn list_favorites(
        &self,
        user_id: UserID,
    ) -> Result<Vec<Favorite>, Box<dyn Error + Send + Sync>>;

    /// Delete one of the user's favorites. Returns `false` if no favorite with
    /// that id belongs to the user.
    async fn delete_favorite(
        &mut self,
        user_id: UserID,
        favorite_id: FavoriteID,
    ) -> Result<bool, Box<dyn Error + Send + Sync>>;
}

/// Process-local store backing both users and favorites. Contents are lost
/// when the process exits.
#[derive(Default)]
pub struct InMemoryStore {
    users: HashMap<Email, UserRecord>,
    favorites: Vec<Favorite>,
    last_user_id: i64,
    last_favorite_id: i64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDatabase for InMemoryStore {
    async fn create_user_if_not_exists(
        &mut self,
        new_user: &NewUser,
    ) -> Result<Option<UserID>, Box<dyn Error + Send + Sync>> {
        if self.users.contains_key(&new_user.email) {
            return Ok(None);
        }

        self.last_user_id += 1;
        let id = UserID(self.last_user_id);

        self.users.insert(
            new_user.email.clone(),
            UserRecord {
                id,
                email: new_user.email.clone(),
                name: new_user.name.clone(),
                hashed_password: new_user.hashed_password.clone(),
            },
        );

        Ok(Some(id))
    }

    async fn retrieve_user(
        &self,
        email: &Email,
    ) -> Result<Option<UserRecord>, Box<dyn Error + Send + Sync>> {
        Ok(self.users.get(email).cloned())
    }

    async fn ping(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}

#[async_trait]
impl FavoritesDatabase for InMemoryStore {
    async fn insert_favorite_if_absent(
        &mut self,
        user_id: UserID,
        favorite: &NewFavorite,
    ) -> Result<bool, Box<dyn Error + Send + Sync>> {
        let exists = self.favorites.iter().any(|existing| {
            existing.user_id == user_id && existing.country.country_name == favorite.country_name
        });
        if exists {
            return Ok(false);
        }

        self.last_favorite_id += 1;
        self.favorites.push(Favorite {
            id: FavoriteID(self.last_favorite_id),
            user_id,
            country: favorite.clone(),
        });

        Ok(true)
    }

    async fn list_favorites(
        &self,
        user_id: UserID,
    ) -> Result<Vec<Favorite>, Box<dyn Error + Send + Sync>> {
        Ok(self
            .favorites
            .iter()
            .filter(|favorite| favorite.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete_favorite(
        &mut self,
        user_id: UserID,
        favorite_id: FavoriteID,
    ) -> Result<bool, Box<dyn Error + Send + Sync>> {
        let before = self.favorites.len();
        self.favorites
            .retain(|favorite| !(favorite.id == favorite_id && favorite.user_id == user_id));

        Ok(self.favorites.len() != before)
    }
}
