//! Devices: access hardware such as tape drives and local mount points,
//! owned by at most one host at a time.

use crate::db::CatalogConnection;
use crate::error::DssResult;
use crate::filter::{Filter, FieldDictionary, FieldKind};
use crate::id::{Family, PhoId};
use std::sync::OnceLock;

fn device_dict() -> &'static FieldDictionary {
	static DICT: OnceLock<FieldDictionary> = OnceLock::new();
	DICT.get_or_init(|| {
		FieldDictionary::new(&[
			("DSS::DEV::family", "family", FieldKind::Text),
			("DSS::DEV::name", "name", FieldKind::Text),
			("DSS::DEV::library", "library", FieldKind::Text),
			("DSS::DEV::host", "host", FieldKind::Text),
			("DSS::DEV::model", "model", FieldKind::Text),
			("DSS::DEV::adm_status", "adm_status", FieldKind::Text),
			("DSS::DEV::path", "path", FieldKind::Text),
		])
	})
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum AdmStatus {
	Locked,
	Unlocked,
	Failed,
}

impl AdmStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			AdmStatus::Locked => "locked",
			AdmStatus::Unlocked => "unlocked",
			AdmStatus::Failed => "failed",
		}
	}

	pub fn parse(s: &str) -> Option<AdmStatus> {
		match s {
			"locked" => Some(AdmStatus::Locked),
			"unlocked" => Some(AdmStatus::Unlocked),
			"failed" => Some(AdmStatus::Failed),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Device {
	pub family: Family,
	pub name: String,
	pub library: String,
	pub host: Option<String>,
	pub model: Option<String>,
	pub path: String,
	pub adm_status: AdmStatus,
}

impl Device {
	pub fn id(&self) -> DssResult<PhoId> {
		PhoId::new(self.family, self.name.clone(), self.library.clone())
	}
}

pub struct DeviceStore;

impl DeviceStore {
	pub async fn get(conn: &CatalogConnection, filter: Option<&Filter>) -> DssResult<Vec<Device>> {
		let mut qb = sqlx::QueryBuilder::new(
			"SELECT family, name, library, host, model, path, adm_status FROM device",
		);
		if let Some(filter) = filter {
			filter.append_where(&mut qb, device_dict())?;
		}
		Ok(qb.build_query_as().fetch_all(conn.pool()).await?)
	}

	pub async fn insert(conn: &CatalogConnection, device: &Device) -> DssResult<()> {
		sqlx::query(
			"INSERT INTO device (family, name, library, host, model, path, adm_status) VALUES ($1, $2, $3, $4, $5, $6, $7)",
		)
		.bind(device.family.as_str())
		.bind(&device.name)
		.bind(&device.library)
		.bind(&device.host)
		.bind(&device.model)
		.bind(&device.path)
		.bind(device.adm_status.as_str())
		.execute(conn.pool())
		.await?;
		Ok(())
	}

	/// Narrow contract: sets `adm_status` only. Kept separate from
	/// `update_host` so the two are independently atomic and neither can
	/// accidentally clobber the other's column.
	pub async fn update_adm_status(conn: &CatalogConnection, id: &PhoId, status: AdmStatus) -> DssResult<()> {
		let result = sqlx::query("UPDATE device SET adm_status = $1 WHERE family = $2 AND name = $3 AND library = $4")
			.bind(status.as_str())
			.bind(id.family.as_str())
			.bind(&id.name)
			.bind(&id.library)
			.execute(conn.pool())
			.await?;
		if result.rows_affected() == 0 {
			return Err(crate::error::Error::not_found(format!("device {}", id)));
		}
		Ok(())
	}

	/// Narrow contract: transfers ownership to `host`. Must be observable
	/// atomically by the Lock Manager — a single-statement `UPDATE` already
	/// gives us that under Postgres's row-level isolation.
	pub async fn update_host(conn: &CatalogConnection, id: &PhoId, host: Option<&str>) -> DssResult<()> {
		let result = sqlx::query("UPDATE device SET host = $1 WHERE family = $2 AND name = $3 AND library = $4")
			.bind(host)
			.bind(id.family.as_str())
			.bind(&id.name)
			.bind(&id.library)
			.execute(conn.pool())
			.await?;
		if result.rows_affected() == 0 {
			return Err(crate::error::Error::not_found(format!("device {}", id)));
		}
		Ok(())
	}

	pub async fn delete(conn: &CatalogConnection, id: &PhoId) -> DssResult<()> {
		sqlx::query("DELETE FROM device WHERE family = $1 AND name = $2 AND library = $3")
			.bind(id.family.as_str())
			.bind(&id.name)
			.bind(&id.library)
			.execute(conn.pool())
			.await?;
		Ok(())
	}
}
