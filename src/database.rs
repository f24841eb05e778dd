//! Record store wiring.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::ad::AdRepository;
use crate::comment::CommentRepository;
use crate::identity::IdentityRepository;

pub const DEFAULT_CREDENTIALS: &str = "postgres";
pub const DEFAULT_DATABASE_NAME: &str = "adboard";
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// PostgreSQL connection pool.
#[derive(Clone)]
pub struct Database {
    pub postgres: PgPool,
}

impl Database {
    /// Init database connections.
    pub async fn new(
        hostname: &str,
        username: &str,
        password: &str,
        db: &str,
        pool: u32,
    ) -> Result<Self, sqlx::Error> {
        let addr = format!("postgres://{username}:{password}@{hostname}/{db}");
        let pool = PgPoolOptions::new().max_connections(pool);
        let postgres = pool.connect(&addr).await?;

        tracing::info!(%hostname, %db, "postgres connected");

        Ok(Self { postgres })
    }
}

/// Repository ports backed by one record store.
#[derive(Clone)]
pub struct Repositories {
    pub identities: Arc<dyn IdentityRepository>,
    pub ads: Arc<dyn AdRepository>,
    pub comments: Arc<dyn CommentRepository>,
}

impl Repositories {
    pub fn postgres(db: &Database) -> Self {
        Self {
            identities: Arc::new(postgres::PgIdentityRepository::new(db.postgres.clone())),
            ads: Arc::new(postgres::PgAdRepository::new(db.postgres.clone())),
            comments: Arc::new(postgres::PgCommentRepository::new(db.postgres.clone())),
        }
    }

    pub fn memory() -> Self {
        Self::in_memory(Arc::new(memory::MemoryStore::default()))
    }

    /// Share `store` across every port.
    pub fn in_memory(store: Arc<memory::MemoryStore>) -> Self {
        Self {
            identities: store.clone(),
            ads: store.clone(),
            comments: store,
        }
    }
}
