//! Cross-process run exclusion through a Postgres session advisory lock.
//!
//! The lock lives on a dedicated connection for as long as the [`RunLock`] exists. Postgres frees
//! session locks when that connection closes, so a crashed holder never blocks later runs.

use std::time::Duration;

use sqlx::{Connection, PgConnection, postgres::PgPoolOptions};

use crate::Result;

/// First key of the two-key advisory lock space. Distinct from the schema lock id.
pub const RUN_LOCK_CLASS: i32 = 7_120_116;

pub struct RunLock {
	conn: PgConnection,
	key: i32,
}
impl RunLock {
	/// Returns `None` when another session already holds the lock for `key`.
	pub async fn try_acquire(cfg: &chanlake_config::Postgres, key: i32) -> Result<Option<Self>> {
		let pool = PgPoolOptions::new()
			.max_connections(1)
			.acquire_timeout(Duration::from_millis(cfg.acquire_timeout_ms))
			.connect(&cfg.dsn)
			.await?;
		// Detach before closing; `close` waits for checked-out connections.
		let acquired = pool.acquire().await.map(|conn| conn.detach());

		pool.close().await;

		let mut conn = acquired?;
		let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1, $2)")
			.bind(RUN_LOCK_CLASS)
			.bind(key)
			.fetch_one(&mut conn)
			.await?;

		if !locked {
			conn.close().await?;

			return Ok(None);
		}

		Ok(Some(Self { conn, key }))
	}

	pub fn key(&self) -> i32 {
		self.key
	}

	/// Unlocks explicitly, then closes the session.
	pub async fn release(mut self) -> Result<()> {
		sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock($1, $2)")
			.bind(RUN_LOCK_CLASS)
			.bind(self.key)
			.fetch_one(&mut self.conn)
			.await?;

		self.conn.close().await?;

		Ok(())
	}
}
