//! Lock Manager: cluster-wide advisory locking keyed by
//! `(entity_kind, entity_identity)`, oblivious to everything else about the
//! entity it protects.
//!
//! All-or-nothing acquisition is a dropped `sqlx::Transaction` on the first
//! conflict — Postgres undoes every insert made earlier in the same call, so
//! there is no rollback bookkeeping to hand-write.

use crate::db::CatalogConnection;
use crate::entity::EntityKind;
use crate::error::{DssResult, Error};
use chrono::{DateTime, Utc};

/// `(hostname, owner)` identifies one process holding a lock. `owner` is a
/// pid-sized positive integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOwner {
	pub hostname: String,
	pub owner: i64,
}

impl LockOwner {
	/// Substitutes the current host and process id when the caller doesn't
	/// supply an explicit owner.
	pub fn current() -> DssResult<LockOwner> {
		let hostname = hostname::get()
			.map_err(|e| Error::Transport(format!("could not determine local hostname: {}", e)))?
			.to_string_lossy()
			.into_owned();
		Ok(LockOwner { hostname, owner: std::process::id() as i64 })
	}
}

/// One item to lock: the entity kind plus the canonical identity string the
/// manager keys on — it never sees the entity payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockItem {
	pub kind: EntityKind,
	pub identity: String,
}

impl LockItem {
	pub fn for_medium(id: &crate::id::PhoId) -> LockItem {
		LockItem { kind: EntityKind::Medium, identity: id.canonical() }
	}

	pub fn for_device(id: &crate::id::PhoId) -> LockItem {
		LockItem { kind: EntityKind::Device, identity: id.canonical() }
	}

	pub fn for_object(oid: &str) -> LockItem {
		LockItem { kind: EntityKind::Object, identity: oid.to_string() }
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct LockStatus {
	pub hostname: String,
	pub owner: i64,
	pub timestamp: DateTime<Utc>,
	/// `None` means "never located" (the C core's `last_locate = 0`
	/// sentinel).
	pub last_locate: Option<DateTime<Utc>>,
}

/// Finds the first `Err` in an as-much-as-possible batch result, without
/// discarding the per-item detail every other slot carries.
pub fn first_error<T>(results: &[DssResult<T>]) -> Option<&Error> {
	results.iter().find_map(|r| r.as_ref().err())
}

pub struct LockManager;

impl LockManager {
	/// All-or-nothing: every lock in `items` is acquired, or none is. On the
	/// first conflict the whole transaction is dropped, which undoes every
	/// insert already made in this call.
	pub async fn acquire(conn: &CatalogConnection, items: &[LockItem], owner: &LockOwner) -> DssResult<()> {
		if items.is_empty() {
			return Ok(());
		}
		let mut tx = conn.begin().await?;
		for item in items {
			let result = sqlx::query(
				"INSERT INTO lock (entity_kind, entity_identity, hostname, owner, timestamp, last_locate)
				 VALUES ($1, $2, $3, $4, now(), NULL)",
			)
			.bind(item.kind.as_str())
			.bind(&item.identity)
			.bind(&owner.hostname)
			.bind(owner.owner)
			.execute(&mut *tx)
			.await;

			if let Err(sqlx::Error::Database(db_err)) = &result {
				if db_err.is_unique_violation() {
					// Dropping `tx` here rolls back every lock acquired
					// earlier in this loop.
					return Err(Error::AlreadyExists(format!("lock already held: {:?}", item)));
				}
			}
			result?;
		}
		tx.commit().await?;
		Ok(())
	}

	/// Same all-or-nothing contract, with an explicit acquiring host (used
	/// when a coordinator pre-places a lock for a different host).
	pub async fn acquire_as(conn: &CatalogConnection, items: &[LockItem], hostname: &str, owner: i64) -> DssResult<()> {
		Self::acquire(conn, items, &LockOwner { hostname: hostname.to_string(), owner }).await
	}

	/// As-much-as-possible: bumps `timestamp` (and `last_locate` when
	/// `update_last_locate`) on every item independently.
	pub async fn refresh(
		conn: &CatalogConnection,
		items: &[LockItem],
		owner: &LockOwner,
		update_last_locate: bool,
	) -> Vec<DssResult<()>> {
		let mut results = Vec::with_capacity(items.len());
		for item in items {
			results.push(Self::refresh_one(conn, item, owner, update_last_locate).await);
		}
		results
	}

	async fn refresh_one(conn: &CatalogConnection, item: &LockItem, owner: &LockOwner, update_last_locate: bool) -> DssResult<()> {
		let current = Self::current_owner(conn, item).await?;
		match current {
			None => Err(Error::NotLocked(format!("{:?}", item))),
			Some((hostname, pid)) if hostname != owner.hostname || pid != owner.owner => {
				Err(Error::PermissionDenied(format!("{:?} is held by {}:{}", item, hostname, pid)))
			}
			Some(_) => {
				let query = if update_last_locate {
					"UPDATE lock SET timestamp = now(), last_locate = now() WHERE entity_kind = $1 AND entity_identity = $2"
				} else {
					"UPDATE lock SET timestamp = now() WHERE entity_kind = $1 AND entity_identity = $2"
				};
				sqlx::query(query).bind(item.kind.as_str()).bind(&item.identity).execute(conn.pool()).await?;
				Ok(())
			}
		}
	}

	/// As-much-as-possible: deletes every item, skipping the ownership check
	/// when `force`.
	pub async fn release(conn: &CatalogConnection, items: &[LockItem], owner: &LockOwner, force: bool) -> Vec<DssResult<()>> {
		let mut results = Vec::with_capacity(items.len());
		for item in items {
			results.push(Self::release_one(conn, item, owner, force).await);
		}
		results
	}

	async fn release_one(conn: &CatalogConnection, item: &LockItem, owner: &LockOwner, force: bool) -> DssResult<()> {
		if force {
			let result = sqlx::query("DELETE FROM lock WHERE entity_kind = $1 AND entity_identity = $2")
				.bind(item.kind.as_str())
				.bind(&item.identity)
				.execute(conn.pool())
				.await?;
			if result.rows_affected() == 0 {
				return Err(Error::NotLocked(format!("{:?}", item)));
			}
			return Ok(());
		}

		let current = Self::current_owner(conn, item).await?;
		match current {
			None => Err(Error::NotLocked(format!("{:?}", item))),
			Some((hostname, pid)) if hostname != owner.hostname || pid != owner.owner => {
				Err(Error::PermissionDenied(format!("{:?} is held by {}:{}", item, hostname, pid)))
			}
			Some(_) => {
				sqlx::query("DELETE FROM lock WHERE entity_kind = $1 AND entity_identity = $2")
					.bind(item.kind.as_str())
					.bind(&item.identity)
					.execute(conn.pool())
					.await?;
				Ok(())
			}
		}
	}

	/// As-much-as-possible: one status lookup per item. A missing lock is
	/// represented as `Err(NotLocked)` in that item's slot — see
	/// [`first_error`] to collapse a batch down to one overall result.
	pub async fn status(conn: &CatalogConnection, items: &[LockItem]) -> Vec<DssResult<LockStatus>> {
		let mut results = Vec::with_capacity(items.len());
		for item in items {
			let row = sqlx::query_as::<_, (String, i64, DateTime<Utc>, Option<DateTime<Utc>>)>(
				"SELECT hostname, owner, timestamp, last_locate FROM lock WHERE entity_kind = $1 AND entity_identity = $2",
			)
			.bind(item.kind.as_str())
			.bind(&item.identity)
			.fetch_optional(conn.pool())
			.await;

			let outcome = match row {
				Ok(Some((hostname, owner, timestamp, last_locate))) => Ok(LockStatus { hostname, owner, timestamp, last_locate }),
				Ok(None) => Err(Error::NotLocked(format!("{:?}", item))),
				Err(e) => Err(Error::from(e)),
			};
			results.push(outcome);
		}
		results
	}

	async fn current_owner(conn: &CatalogConnection, item: &LockItem) -> DssResult<Option<(String, i64)>> {
		let row: Option<(String, i64)> = sqlx::query_as("SELECT hostname, owner FROM lock WHERE entity_kind = $1 AND entity_identity = $2")
			.bind(item.kind.as_str())
			.bind(&item.identity)
			.fetch_optional(conn.pool())
			.await?;
		Ok(row)
	}

	/// Best-effort: removes device locks whose owner no longer matches the
	/// given `(hostname, owner)` — used on daemon restart.
	pub async fn clean_devices(conn: &CatalogConnection, hostname: &str, owner: i64) -> DssResult<u64> {
		let result = sqlx::query(
			"DELETE FROM lock WHERE entity_kind = $1 AND NOT (hostname = $2 AND owner = $3)",
		)
		.bind(EntityKind::Device.as_str())
		.bind(hostname)
		.bind(owner)
		.execute(conn.pool())
		.await?;
		Ok(result.rows_affected())
	}

	/// Best-effort: removes media locks held by `(hostname, owner)` that are
	/// not in `keep`.
	pub async fn clean_media(conn: &CatalogConnection, keep: &[String], hostname: &str, owner: i64) -> DssResult<u64> {
		let mut qb = sqlx::QueryBuilder::new("DELETE FROM lock WHERE entity_kind = ");
		qb.push_bind(EntityKind::Medium.as_str());
		qb.push(" AND hostname = ").push_bind(hostname);
		qb.push(" AND owner = ").push_bind(owner);
		if !keep.is_empty() {
			qb.push(" AND entity_identity NOT IN (");
			let mut sep = qb.separated(", ");
			for identity in keep {
				sep.push_bind(identity.clone());
			}
			qb.push(")");
		}
		let result = qb.build().execute(conn.pool()).await?;
		Ok(result.rows_affected())
	}

	/// Best-effort: generic clean by any combination of filters. An absent
	/// filter is a wildcard; `family` is ignored unless `kind` is set.
	pub async fn clean_select(
		conn: &CatalogConnection,
		hostname: Option<&str>,
		kind: Option<EntityKind>,
		family: Option<crate::id::Family>,
		ids: Option<&[String]>,
	) -> DssResult<u64> {
		let mut qb = sqlx::QueryBuilder::new("DELETE FROM lock WHERE TRUE");
		if let Some(hostname) = hostname {
			qb.push(" AND hostname = ").push_bind(hostname);
		}
		if let Some(kind) = kind {
			qb.push(" AND entity_kind = ").push_bind(kind.as_str());
			if let Some(family) = family {
				// `entity_identity` is `family:library:name`; filtering by
				// family is a prefix match on that canonical form.
				qb.push(" AND entity_identity LIKE ").push_bind(format!("{}:%", family));
			}
		}
		if let Some(ids) = ids {
			if ids.is_empty() {
				return Ok(0);
			}
			qb.push(" AND entity_identity IN (");
			let mut sep = qb.separated(", ");
			for id in ids {
				sep.push_bind(id.clone());
			}
			qb.push(")");
		}
		let result = qb.build().execute(conn.pool()).await?;
		Ok(result.rows_affected())
	}

	/// Admin disaster-recovery operation: removes every lock.
	pub async fn clean_all(conn: &CatalogConnection) -> DssResult<u64> {
		let result = sqlx::query("DELETE FROM lock").execute(conn.pool()).await?;
		Ok(result.rows_affected())
	}
}
