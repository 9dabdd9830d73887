use std::{error::Error, str::FromStr};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::{
    store::{FavoritesDatabase, UserDatabase},
    types::{
        Email, Favorite, FavoriteID, HashedPassword, NewFavorite, NewUser, UserID, UserRecord,
    },
};

pub const DEFAULT_DATABASE_URL: &str = "sqlite:country_favorites.db";

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT UNIQUE NOT NULL,
        password TEXT NOT NULL,
        name TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    )",
    "CREATE TABLE IF NOT EXISTS favorites (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        country_name TEXT NOT NULL,
        flag TEXT,
        capital TEXT,
        population INTEGER,
        region TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        UNIQUE (user_id, country_name)
    )",
];

/// SQLite-backed store for users and favorites.
#[derive(Clone)]
pub struct SqlStore {
    pool: SqlitePool,
}

impl SqlStore {
    /// Open or create the database at `url` and make sure its tables exist.
    /// Use "sqlite::memory:" for a database that lives as long as the store.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in SCHEMA {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        tx.commit().await
    }

    /// Close every pooled connection. Later queries fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(e) if e.is_unique_violation())
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    name: Option<String>,
    password: String,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserID(row.id),
            email: Email(row.email),
            name: row.name,
            hashed_password: HashedPassword(row.password),
        }
    }
}

#[derive(sqlx::FromRow)]
struct FavoriteRow {
    id: i64,
    user_id: i64,
    country_name: String,
    flag: Option<String>,
    capital: Option<String>,
    population: Option<i64>,
    region: Option<String>,
}

impl From<FavoriteRow> for Favorite {
    fn from(row: FavoriteRow) -> Self {
        Self {
            id: FavoriteID(row.id),
            user_id: UserID(row.user_id),
            country: NewFavorite {
                country_name: row.country_name,
                flag: row.flag,
                capital: row.capital,
                population: row.population.and_then(|p| u64::try_from(p).ok()),
                region: row.region,
            },
        }
    }
}

#[async_trait]
impl UserDatabase for SqlStore {
    async fn create_user_if_not_exists(
        &mut self,
        new_user: &NewUser,
    ) -> Result<Option<UserID>, Box<dyn Error + Send + Sync>> {
        let result = sqlx::query("INSERT INTO users (email, password, name) VALUES (?, ?, ?)")
            .bind(&new_user.email.0)
            .bind(&new_user.hashed_password.0)
            .bind(&new_user.name)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) => Ok(Some(UserID(done.last_insert_rowid()))),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn retrieve_user(
        &self,
        email: &Email,
    ) -> Result<Option<UserRecord>, Box<dyn Error + Send + Sync>> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, email, name, password FROM users WHERE email = ?")
                .bind(&email.0)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(UserRecord::from))
    }

    async fn ping(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;

        Ok(())
    }
}

#[async_trait]
impl FavoritesDatabase for SqlStore {
    async fn insert_favorite_if_absent(
        &mut self,
        user_id: UserID,
        favorite: &NewFavorite,
    ) -> Result<bool, Box<dyn Error + Send + Sync>> {
        let population = favorite.population.map(i64::try_from).transpose()?;

        let result = sqlx::query(
            "INSERT INTO favorites (user_id, country_name, flag, capital, population, region)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id.0)
        .bind(&favorite.country_name)
        .bind(&favorite.flag)
        .bind(&favorite.capital)
        .bind(population)
        .bind(&favorite.region)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_favorites(
        &self,
        user_id: UserID,
    ) -> Result<Vec<Favorite>, Box<dyn Error + Send + Sync>> {
        let rows: Vec<FavoriteRow> = sqlx::query_as(
            "SELECT id, user_id, country_name, flag, capital, population, region
             FROM favorites WHERE user_id = ? ORDER BY id",
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Favorite::from).collect())
    }

    async fn delete_favorite(
        &mut self,
        user_id: UserID,
        favorite_id: FavoriteID,
    ) -> Result<bool, Box<dyn Error + Send + Sync>> {
        let result = sqlx::query("DELETE FROM favorites WHERE id = ? AND user_id = ?")
            .bind(favorite_id.0)
            .bind(user_id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqlStore {
        SqlStore::connect("sqlite::memory:").await.unwrap()
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: Email(email.into()),
            hashed_password: HashedPassword("hash".into()),
            name: Some("Sam".into()),
        }
    }

    fn favorite(country_name: &str) -> NewFavorite {
        NewFavorite {
            country_name: country_name.into(),
            flag: Some("https://flagcdn.com/w320/pe.png".into()),
            capital: Some("Lima".into()),
            population: Some(32971846),
            region: None,
        }
    }

    #[tokio::test]
    async fn email_is_a_unique_key() {
        let mut store = store().await;

        let first = store
            .create_user_if_not_exists(&new_user("a@example.com"))
            .await
            .unwrap();
        let duplicate = store
            .create_user_if_not_exists(&new_user("a@example.com"))
            .await
            .unwrap();

        assert!(first.is_some());
        assert_eq!(duplicate, None);

        let found = store
            .retrieve_user(&Email("a@example.com".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(Some(found.id), first);
        assert_eq!(found.name.as_deref(), Some("Sam"));
        assert_eq!(found.hashed_password.0, "hash");
        assert!(store
            .retrieve_user(&Email("nobody@example.com".into()))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn favorites_are_unique_per_owner_and_country() {
        let mut store = store().await;
        let alice = store
            .create_user_if_not_exists(&new_user("alice@example.com"))
            .await
            .unwrap()
            .unwrap();
        let bob = store
            .create_user_if_not_exists(&new_user("bob@example.com"))
            .await
            .unwrap()
            .unwrap();

        assert!(store
            .insert_favorite_if_absent(alice, &favorite("Peru"))
            .await
            .unwrap());
        assert!(!store
            .insert_favorite_if_absent(alice, &favorite("Peru"))
            .await
            .unwrap());
        assert!(store
            .insert_favorite_if_absent(bob, &favorite("Peru"))
            .await
            .unwrap());

        let alices = store.list_favorites(alice).await.unwrap();
        assert_eq!(alices.len(), 1);
        assert_eq!(alices[0].user_id, alice);
        assert_eq!(alices[0].country, favorite("Peru"));
        let peru = alices[0].id;

        assert!(!store.delete_favorite(bob, peru).await.unwrap());
        assert!(store.delete_favorite(alice, peru).await.unwrap());
        assert!(!store.delete_favorite(alice, peru).await.unwrap());

        assert!(store.list_favorites(alice).await.unwrap().is_empty());
        assert_eq!(store.list_favorites(bob).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ping_reports_a_closed_pool() {
        let store = store().await;

        store.ping().await.unwrap();
        store.close().await;
        assert!(store.ping().await.is_err());
    }
}
