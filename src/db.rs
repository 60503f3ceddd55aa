//! Catalog connection handle.
//!
//! An owned, cheaply-cloned handle over a connection pool, constructed once
//! from a connect string and shared by every component. `sqlx::PgPool`
//! already holds its own internal `Arc`, so cloning a `CatalogConnection`
//! is just cloning that handle, not opening a new pool.

use crate::config::Config;
use crate::error::DssResult;
use sqlx::postgres::{PgPool, PgPoolOptions};

/// A handle is not safe for concurrent use from multiple callers sharing one
/// *connection*, but `sqlx::PgPool` is itself a pool of connections, so a
/// single `CatalogConnection` clone safely serves many concurrent callers —
/// it just checks out a distinct physical connection per operation.
#[derive(Clone)]
pub struct CatalogConnection {
	pool: PgPool,
}

impl CatalogConnection {
	/// Opens the pool described by `config.connect_string` and runs pending
	/// migrations.
	pub async fn connect(config: &Config) -> DssResult<CatalogConnection> {
		let pool = PgPoolOptions::new().max_connections(16).connect(&config.connect_string).await?;
		sqlx::migrate!("./migrations").run(&pool).await?;
		Ok(CatalogConnection { pool })
	}

	/// Wraps an already-open pool, used by tests that spin up their own
	/// ephemeral database (`#[sqlx::test]`).
	pub fn from_pool(pool: PgPool) -> CatalogConnection {
		CatalogConnection { pool }
	}

	pub fn pool(&self) -> &PgPool {
		&self.pool
	}

	/// Begins a server-side transaction. Every multi-statement operation in
	/// this crate (lock acquire, object move, media stat updates) runs
	/// inside one of these so partial success is never observable.
	pub async fn begin(&self) -> DssResult<sqlx::Transaction<'static, sqlx::Postgres>> {
		Ok(self.pool.begin().await?)
	}
}
