//! Version Resolver: reconciles the live `object` table against the
//! `deprecated_object` archive to answer "which generation did the caller
//! mean" from a partial key of `(oid, uuid, version)`.
//!
//! Lazy by design: no row here is locked, so a retry after `NotFound` can
//! succeed if a concurrent writer just moved the generation the caller
//! wanted.

use crate::db::CatalogConnection;
use crate::entity::object::{DeprecatedObject, Object};
use crate::error::{DssResult, Error};
use uuid::Uuid;

/// `version = 0` is the "unspecified, give me the latest" sentinel. We keep
/// the sentinel instead of collapsing it into `Option::None` at the API
/// boundary, since callers that deserialize a request straight off the wire
/// carry the same zero.
const LATEST: i64 = 0;

fn is_latest(version: Option<i64>) -> bool {
	matches!(version, None | Some(LATEST))
}

/// Resolves a partial key to exactly one object generation.
pub async fn lazy_find_object(
	conn: &CatalogConnection,
	oid: Option<&str>,
	uuid: Option<Uuid>,
	version: Option<i64>,
) -> DssResult<Object> {
	match (oid, uuid) {
		(None, None) => Err(Error::invalid("lazy_find_object needs at least one of oid or uuid")),
		(Some(oid), None) => resolve_by_oid(conn, oid, version).await,
		(None, Some(uuid)) => resolve_by_uuid(conn, uuid, version).await,
		(Some(oid), Some(uuid)) => resolve_by_oid_and_uuid(conn, oid, uuid, version).await,
	}
}

/// Case 1: **oid only**. The live row for `oid` wins if present and its
/// version agrees (or none was requested). Otherwise falls to the
/// deprecated archive: a single uuid among `oid`'s deprecated rows resolves
/// by version the same way `resolve_by_uuid` would; two or more distinct
/// uuids with no version given is genuinely ambiguous (`Invalid`); with a
/// version given, it must identify exactly one archived row.
async fn resolve_by_oid(conn: &CatalogConnection, oid: &str, version: Option<i64>) -> DssResult<Object> {
	if let Some(live) = fetch_live_by_oid(conn, oid).await? {
		if is_latest(version) || live.version == version.unwrap() {
			return Ok(live);
		}
	}

	let rows = fetch_deprecated_by_oid(conn, oid).await?;
	if rows.is_empty() {
		return Err(Error::not_found(format!("object {}", oid)));
	}

	let mut uuids: Vec<Uuid> = rows.iter().map(|r| r.uuid).collect();
	uuids.sort();
	uuids.dedup();

	if uuids.len() == 1 {
		return resolve_deprecated_rows(rows, version).ok_or_else(|| Error::not_found(format!("object {}", oid)));
	}

	// Two or more generations under different uuids share this oid.
	if is_latest(version) {
		return Err(Error::invalid(format!(
			"oid {} is ambiguous across {} deprecated uuids; pass uuid or version",
			oid,
			uuids.len()
		)));
	}
	let version = version.unwrap();
	let matches: Vec<&DeprecatedObject> = rows.iter().filter(|r| r.version == version).collect();
	match matches.as_slice() {
		[one] => Ok(Object::from((*one).clone())),
		[] => Err(Error::not_found(format!("oid {} version {}", oid, version))),
		_ => Err(Error::invalid(format!("oid {} version {} is ambiguous across multiple uuids", oid, version))),
	}
}

/// Case 2: **uuid only**. The live row under `uuid` wins if present and
/// version-compatible; otherwise the deprecated archive is searched by
/// uuid, taking the newest row when no version is given.
async fn resolve_by_uuid(conn: &CatalogConnection, uuid: Uuid, version: Option<i64>) -> DssResult<Object> {
	if let Some(live) = fetch_live_by_uuid(conn, uuid).await? {
		if is_latest(version) || live.version == version.unwrap() {
			return Ok(live);
		}
	}
	if is_latest(version) {
		newest_deprecated(conn, uuid).await?.map(Object::from).ok_or_else(|| Error::not_found(format!("uuid {}", uuid)))
	} else {
		let version = version.unwrap();
		fetch_deprecated(conn, uuid, version)
			.await?
			.map(Object::from)
			.ok_or_else(|| Error::not_found(format!("uuid {} version {}", uuid, version)))
	}
}

/// Case 3: **oid + uuid**. Both must name the same generation (live
/// preferred, then deprecated). When the live row under `oid` exists but
/// carries a *different* uuid than the caller's, we take the deprecated
/// row under the caller's uuid rather than erroring: the caller's explicit
/// uuid takes priority over whatever currently occupies `oid`.
async fn resolve_by_oid_and_uuid(conn: &CatalogConnection, oid: &str, uuid: Uuid, version: Option<i64>) -> DssResult<Object> {
	if let Some(live) = fetch_live_by_oid(conn, oid).await? {
		if live.uuid == uuid && (is_latest(version) || live.version == version.unwrap()) {
			return Ok(live);
		}
	}

	if is_latest(version) {
		newest_deprecated(conn, uuid).await?.map(Object::from).ok_or_else(|| Error::not_found(format!("oid {} uuid {}", oid, uuid)))
	} else {
		let version = version.unwrap();
		fetch_deprecated(conn, uuid, version)
			.await?
			.map(Object::from)
			.ok_or_else(|| Error::not_found(format!("oid {} uuid {} version {}", oid, uuid, version)))
	}
}

fn resolve_deprecated_rows(rows: Vec<DeprecatedObject>, version: Option<i64>) -> Option<Object> {
	if is_latest(version) {
		rows.into_iter().max_by_key(|r| r.version).map(Object::from)
	} else {
		let version = version.unwrap();
		rows.into_iter().find(|r| r.version == version).map(Object::from)
	}
}

async fn fetch_live_by_oid(conn: &CatalogConnection, oid: &str) -> DssResult<Option<Object>> {
	Ok(sqlx::query_as("SELECT oid, uuid, version, user_md FROM object WHERE oid = $1")
		.bind(oid)
		.fetch_optional(conn.pool())
		.await?)
}

async fn fetch_live_by_uuid(conn: &CatalogConnection, uuid: Uuid) -> DssResult<Option<Object>> {
	Ok(sqlx::query_as("SELECT oid, uuid, version, user_md FROM object WHERE uuid = $1")
		.bind(uuid)
		.fetch_optional(conn.pool())
		.await?)
}

async fn fetch_deprecated(conn: &CatalogConnection, uuid: Uuid, version: i64) -> DssResult<Option<DeprecatedObject>> {
	Ok(sqlx::query_as(
		"SELECT uuid, version, oid, user_md, deprec_time FROM deprecated_object WHERE uuid = $1 AND version = $2",
	)
	.bind(uuid)
	.bind(version)
	.fetch_optional(conn.pool())
	.await?)
}

async fn fetch_deprecated_by_oid(conn: &CatalogConnection, oid: &str) -> DssResult<Vec<DeprecatedObject>> {
	Ok(
		sqlx::query_as("SELECT uuid, version, oid, user_md, deprec_time FROM deprecated_object WHERE oid = $1")
			.bind(oid)
			.fetch_all(conn.pool())
			.await?,
	)
}

async fn newest_deprecated(conn: &CatalogConnection, uuid: Uuid) -> DssResult<Option<DeprecatedObject>> {
	Ok(sqlx::query_as(
		"SELECT uuid, version, oid, user_md, deprec_time FROM deprecated_object WHERE uuid = $1 ORDER BY version DESC LIMIT 1",
	)
	.bind(uuid)
	.fetch_optional(conn.pool())
	.await?)
}

impl From<DeprecatedObject> for Object {
	fn from(row: DeprecatedObject) -> Object {
		Object { oid: row.oid, uuid: row.uuid, version: row.version, user_md: row.user_md }
	}
}
