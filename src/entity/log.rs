//! Log Store: append-only journal of operational events; dump and delete are
//! both driven by the same [`Filter`] compiler as every other entity kind.

use crate::db::CatalogConnection;
use crate::error::DssResult;
use crate::filter::{Filter, FieldDictionary, FieldKind};
use crate::id::{Family, PhoId};
use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use std::sync::OnceLock;

fn log_dict() -> &'static FieldDictionary {
	static DICT: OnceLock<FieldDictionary> = OnceLock::new();
	DICT.get_or_init(|| {
		FieldDictionary::new(&[
			("DSS::LOG::device_family", "device_family", FieldKind::Text),
			("DSS::LOG::device_name", "device_name", FieldKind::Text),
			("DSS::LOG::medium_family", "medium_family", FieldKind::Text),
			("DSS::LOG::medium_name", "medium_name", FieldKind::Text),
			("DSS::LOG::cause", "cause", FieldKind::Text),
			("DSS::LOG::errno", "errno", FieldKind::Integer),
			("DSS::LOG::time", "time", FieldKind::Text),
			("DSS::LOG::message", "message", FieldKind::Json),
		])
	})
}

/// Closed set of causes a log entry may record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum Cause {
	LibraryScan,
	DeviceLoad,
	DeviceUnload,
	LtfsMount,
	LtfsUmount,
	LtfsFormat,
	LtfsDf,
	LtfsSync,
}

impl Cause {
	pub fn as_str(&self) -> &'static str {
		match self {
			Cause::LibraryScan => "library_scan",
			Cause::DeviceLoad => "device_load",
			Cause::DeviceUnload => "device_unload",
			Cause::LtfsMount => "ltfs_mount",
			Cause::LtfsUmount => "ltfs_umount",
			Cause::LtfsFormat => "ltfs_format",
			Cause::LtfsDf => "ltfs_df",
			Cause::LtfsSync => "ltfs_sync",
		}
	}

	pub fn parse(s: &str) -> Option<Cause> {
		match s {
			"library_scan" => Some(Cause::LibraryScan),
			"device_load" => Some(Cause::DeviceLoad),
			"device_unload" => Some(Cause::DeviceUnload),
			"ltfs_mount" => Some(Cause::LtfsMount),
			"ltfs_umount" => Some(Cause::LtfsUmount),
			"ltfs_format" => Some(Cause::LtfsFormat),
			"ltfs_df" => Some(Cause::LtfsDf),
			"ltfs_sync" => Some(Cause::LtfsSync),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LogEntry {
	pub id: i64,
	pub device_family: Family,
	pub device_name: String,
	pub device_library: String,
	pub medium_family: Family,
	pub medium_name: String,
	pub medium_library: String,
	pub cause: Cause,
	pub errno: i32,
	pub time: DateTime<Utc>,
	pub message: Json,
}

/// Caller-facing log to append; `id` and `time` are assigned by the store.
pub struct NewLogEntry {
	pub device: PhoId,
	pub medium: PhoId,
	pub cause: Cause,
	pub errno: i32,
	pub message: Json,
}

pub struct LogStore;

impl LogStore {
	pub async fn emit(conn: &CatalogConnection, entry: NewLogEntry) -> DssResult<()> {
		sqlx::query(
			"INSERT INTO logs (device_family, device_name, device_library, medium_family, medium_name, medium_library, cause, errno, time, message)
			 VALUES ($1,$2,$3,$4,$5,$6,$7,$8, now(), $9)",
		)
		.bind(entry.device.family.as_str())
		.bind(&entry.device.name)
		.bind(&entry.device.library)
		.bind(entry.medium.family.as_str())
		.bind(&entry.medium.name)
		.bind(&entry.medium.library)
		.bind(entry.cause.as_str())
		.bind(entry.errno)
		.bind(&entry.message)
		.execute(conn.pool())
		.await?;
		Ok(())
	}

	pub async fn get(conn: &CatalogConnection, filter: Option<&Filter>) -> DssResult<Vec<LogEntry>> {
		let mut qb = sqlx::QueryBuilder::new(
			"SELECT id, device_family, device_name, device_library, medium_family, medium_name, medium_library,
			        cause, errno, time, message FROM logs",
		);
		if let Some(filter) = filter {
			filter.append_where(&mut qb, log_dict())?;
		}
		qb.push(" ORDER BY time ASC");
		Ok(qb.build_query_as().fetch_all(conn.pool()).await?)
	}

	/// Deletes matching logs; `filter = None` deletes everything.
	pub async fn delete(conn: &CatalogConnection, filter: Option<&Filter>) -> DssResult<u64> {
		let mut qb = sqlx::QueryBuilder::new("DELETE FROM logs");
		if let Some(filter) = filter {
			filter.append_where(&mut qb, log_dict())?;
		}
		let result = qb.build().execute(conn.pool()).await?;
		Ok(result.rows_affected())
	}
}
