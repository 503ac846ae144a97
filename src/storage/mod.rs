use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

pub mod memory;
pub mod token_store;
pub mod user_store;

pub type DbPool = Pool<Postgres>;

/// Initializes the database connection pool.
///
/// # Errors
/// Returns `sqlx::Error` if the connection fails.
pub async fn init_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new().max_connections(20).connect(database_url).await
}
