//! Live objects, their deprecated history, and the generic move between the
//! two tables. Queries are parameterised at runtime by a
//! [`Filter`](crate::filter::Filter) rather than fixed at compile time, so
//! rows are hand-mapped through `sqlx::FromRow` instead of a schema macro.

use crate::db::CatalogConnection;
use crate::entity::EntityKind;
use crate::error::{DssResult, Error};
use crate::filter::{Filter, FieldDictionary, FieldKind};
use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use sqlx::{postgres::Postgres, QueryBuilder};
use std::sync::OnceLock;
use uuid::Uuid;

fn object_dict() -> &'static FieldDictionary {
	static DICT: OnceLock<FieldDictionary> = OnceLock::new();
	DICT.get_or_init(|| {
		FieldDictionary::new(&[
			("DSS::OBJ::oid", "oid", FieldKind::Text),
			("DSS::OBJ::uuid", "uuid", FieldKind::Text),
			("DSS::OBJ::version", "version", FieldKind::Integer),
			("DSS::OBJ::user_md", "user_md", FieldKind::Json),
		])
	})
}

fn deprecated_dict() -> &'static FieldDictionary {
	static DICT: OnceLock<FieldDictionary> = OnceLock::new();
	DICT.get_or_init(|| {
		FieldDictionary::new(&[
			("DSS::DEPR::oid", "oid", FieldKind::Text),
			("DSS::DEPR::uuid", "uuid", FieldKind::Text),
			("DSS::DEPR::version", "version", FieldKind::Integer),
			("DSS::DEPR::user_md", "user_md", FieldKind::Json),
			("DSS::DEPR::deprec_time", "deprec_time", FieldKind::Text),
		])
	})
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow, serde::Serialize, serde::Deserialize)]
pub struct Object {
	pub oid: String,
	pub uuid: Uuid,
	pub version: i64,
	pub user_md: Json,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow, serde::Serialize, serde::Deserialize)]
pub struct DeprecatedObject {
	pub uuid: Uuid,
	pub version: i64,
	pub oid: String,
	pub user_md: Json,
	pub deprec_time: DateTime<Utc>,
}

pub struct ObjectStore;

impl ObjectStore {
	pub async fn get(conn: &CatalogConnection, filter: Option<&Filter>) -> DssResult<Vec<Object>> {
		let mut qb = QueryBuilder::<Postgres>::new("SELECT oid, uuid, version, user_md FROM object");
		if let Some(filter) = filter {
			filter.append_where(&mut qb, object_dict())?;
		}
		Ok(qb.build_query_as::<Object>().fetch_all(conn.pool()).await?)
	}

	pub async fn get_deprecated(conn: &CatalogConnection, filter: Option<&Filter>) -> DssResult<Vec<DeprecatedObject>> {
		let mut qb = QueryBuilder::<Postgres>::new("SELECT uuid, version, oid, user_md, deprec_time FROM deprecated_object");
		if let Some(filter) = filter {
			filter.append_where(&mut qb, deprecated_dict())?;
		}
		Ok(qb.build_query_as::<DeprecatedObject>().fetch_all(conn.pool()).await?)
	}

	/// `Insert(default)`: creates the first generation of a new oid. Fails
	/// with `AlreadyExists` if a live row already owns `oid`.
	pub async fn put(conn: &CatalogConnection, oid: &str, user_md: Json) -> DssResult<Object> {
		let object = Object { oid: oid.to_string(), uuid: Uuid::new_v4(), version: 1, user_md };
		sqlx::query("INSERT INTO object (oid, uuid, version, user_md) VALUES ($1, $2, $3, $4)")
			.bind(&object.oid)
			.bind(object.uuid)
			.bind(object.version)
			.bind(&object.user_md)
			.execute(conn.pool())
			.await?;
		Ok(object)
	}

	/// Overwrite: moves the live row to `deprecated_object` and inserts a new
	/// generation under the same uuid with `version + 1`. Atomic: both
	/// halves run in one transaction.
	pub async fn overwrite(conn: &CatalogConnection, oid: &str, user_md: Json) -> DssResult<Object> {
		let mut tx = conn.begin().await?;
		let live: Object = sqlx::query_as("SELECT oid, uuid, version, user_md FROM object WHERE oid = $1 FOR UPDATE")
			.bind(oid)
			.fetch_optional(&mut *tx)
			.await?
			.ok_or_else(|| Error::not_found(format!("live object {}", oid)))?;

		sqlx::query("DELETE FROM object WHERE oid = $1").bind(oid).execute(&mut *tx).await?;
		sqlx::query(
			"INSERT INTO deprecated_object (uuid, version, oid, user_md, deprec_time) VALUES ($1, $2, $3, $4, now())",
		)
		.bind(live.uuid)
		.bind(live.version)
		.bind(&live.oid)
		.bind(&live.user_md)
		.execute(&mut *tx)
		.await?;

		let next = Object { oid: oid.to_string(), uuid: live.uuid, version: live.version + 1, user_md };
		sqlx::query("INSERT INTO object (oid, uuid, version, user_md) VALUES ($1, $2, $3, $4)")
			.bind(&next.oid)
			.bind(next.uuid)
			.bind(next.version)
			.bind(&next.user_md)
			.execute(&mut *tx)
			.await?;

		tx.commit().await?;
		Ok(next)
	}

	/// Soft delete: the live generation becomes the newest deprecated row,
	/// nothing is inserted to replace it.
	pub async fn delete(conn: &CatalogConnection, oid: &str) -> DssResult<()> {
		let mut tx = conn.begin().await?;
		let live: Object = sqlx::query_as("SELECT oid, uuid, version, user_md FROM object WHERE oid = $1 FOR UPDATE")
			.bind(oid)
			.fetch_optional(&mut *tx)
			.await?
			.ok_or_else(|| Error::not_found(format!("live object {}", oid)))?;

		sqlx::query("DELETE FROM object WHERE oid = $1").bind(oid).execute(&mut *tx).await?;
		sqlx::query(
			"INSERT INTO deprecated_object (uuid, version, oid, user_md, deprec_time) VALUES ($1, $2, $3, $4, now())",
		)
		.bind(live.uuid)
		.bind(live.version)
		.bind(&live.oid)
		.bind(&live.user_md)
		.execute(&mut *tx)
		.await?;

		tx.commit().await?;
		Ok(())
	}

	/// `FullInsert`: re-hydrates an archived generation, preserving its
	/// caller-supplied uuid/version exactly. Used to restore a deprecated row
	/// (e.g. after an admin `undelete`).
	pub async fn full_insert_deprecated(conn: &CatalogConnection, rows: &[DeprecatedObject]) -> DssResult<()> {
		let mut tx = conn.begin().await?;
		for row in rows {
			sqlx::query(
				"INSERT INTO deprecated_object (uuid, version, oid, user_md, deprec_time) VALUES ($1, $2, $3, $4, $5)",
			)
			.bind(row.uuid)
			.bind(row.version)
			.bind(&row.oid)
			.bind(&row.user_md)
			.bind(row.deprec_time)
			.execute(&mut *tx)
			.await?;
		}
		tx.commit().await?;
		Ok(())
	}

	/// Permanent removal from the archive (Deprecated-Delete).
	pub async fn delete_deprecated(conn: &CatalogConnection, keys: &[(Uuid, i64)]) -> DssResult<()> {
		let mut tx = conn.begin().await?;
		for (uuid, version) in keys {
			sqlx::query("DELETE FROM deprecated_object WHERE uuid = $1 AND version = $2")
				.bind(uuid)
				.bind(version)
				.execute(&mut *tx)
				.await?;
		}
		tx.commit().await?;
		Ok(())
	}

	/// Moves a batch of generations from one table to the other, keyed by
	/// each table's own minimal primary key (`oid` for the live table,
	/// `uuid`+`version` for the archive). `overwrite` and `delete` are really
	/// "move live generation into the archive" plus whatever happens next;
	/// this is that primitive exposed directly, so an archived generation can
	/// also be restored to live (e.g. undoing a soft delete).
	///
	/// Runs the whole batch in one transaction: any collision in `to` (an
	/// oid already live, or a uuid+version already archived) aborts the
	/// entire move with `AlreadyExists`, leaving neither table touched.
	pub async fn move_generation(conn: &CatalogConnection, from: EntityKind, to: EntityKind, keys: &[MoveKey]) -> DssResult<()> {
		match (from, to) {
			(EntityKind::Object, EntityKind::DeprecatedObject) => Self::move_live_to_deprecated(conn, keys).await,
			(EntityKind::DeprecatedObject, EntityKind::Object) => Self::move_deprecated_to_live(conn, keys).await,
			(from, to) => Err(Error::Unsupported(format!("no object move path from {:?} to {:?}", from, to))),
		}
	}

	async fn move_live_to_deprecated(conn: &CatalogConnection, keys: &[MoveKey]) -> DssResult<()> {
		let mut tx = conn.begin().await?;
		for key in keys {
			let oid = match key {
				MoveKey::ByOid(oid) => oid,
				MoveKey::ByUuidVersion(..) => {
					return Err(Error::invalid("moving into deprecated_object needs an oid key, not uuid+version"))
				}
			};
			let live: Object = sqlx::query_as("SELECT oid, uuid, version, user_md FROM object WHERE oid = $1 FOR UPDATE")
				.bind(oid)
				.fetch_optional(&mut *tx)
				.await?
				.ok_or_else(|| Error::not_found(format!("live object {}", oid)))?;

			sqlx::query("DELETE FROM object WHERE oid = $1").bind(oid).execute(&mut *tx).await?;
			let inserted = sqlx::query(
				"INSERT INTO deprecated_object (uuid, version, oid, user_md, deprec_time) VALUES ($1, $2, $3, $4, now())",
			)
			.bind(live.uuid)
			.bind(live.version)
			.bind(&live.oid)
			.bind(&live.user_md)
			.execute(&mut *tx)
			.await;
			reject_collision(inserted, format!("deprecated object {} v{}", live.oid, live.version))?;
		}
		tx.commit().await?;
		Ok(())
	}

	async fn move_deprecated_to_live(conn: &CatalogConnection, keys: &[MoveKey]) -> DssResult<()> {
		let mut tx = conn.begin().await?;
		for key in keys {
			let (uuid, version) = match key {
				MoveKey::ByUuidVersion(uuid, version) => (*uuid, *version),
				MoveKey::ByOid(_) => return Err(Error::invalid("moving into object needs a uuid+version key, not an oid")),
			};
			let row: DeprecatedObject = sqlx::query_as(
				"SELECT uuid, version, oid, user_md, deprec_time FROM deprecated_object WHERE uuid = $1 AND version = $2 FOR UPDATE",
			)
			.bind(uuid)
			.bind(version)
			.fetch_optional(&mut *tx)
			.await?
			.ok_or_else(|| Error::not_found(format!("deprecated object {} v{}", uuid, version)))?;

			sqlx::query("DELETE FROM deprecated_object WHERE uuid = $1 AND version = $2")
				.bind(uuid)
				.bind(version)
				.execute(&mut *tx)
				.await?;
			let inserted = sqlx::query("INSERT INTO object (oid, uuid, version, user_md) VALUES ($1, $2, $3, $4)")
				.bind(&row.oid)
				.bind(row.uuid)
				.bind(row.version)
				.bind(&row.user_md)
				.execute(&mut *tx)
				.await;
			reject_collision(inserted, format!("live object {}", row.oid))?;
		}
		tx.commit().await?;
		Ok(())
	}
}

/// Identifies one generation to move, by whichever primary key the table it
/// currently lives in actually uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveKey {
	ByOid(String),
	ByUuidVersion(Uuid, i64),
}

fn reject_collision(result: Result<sqlx::postgres::PgQueryResult, sqlx::Error>, what: String) -> DssResult<()> {
	match result {
		Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(Error::AlreadyExists(what)),
		other => {
			other?;
			Ok(())
		}
	}
}

// Catalog-backed scenarios (put/overwrite/delete round trips, generic move in
// both directions) live in tests/entity_store.rs.
