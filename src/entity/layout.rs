//! Layouts and their extents: how an object generation's data is actually
//! laid out across media, one layout per live object generation.

use crate::db::CatalogConnection;
use crate::error::DssResult;
use crate::filter::{Filter, FieldDictionary, FieldKind};
use crate::id::{Family, PhoId};
use serde_json::Value as Json;
use sqlx::{postgres::Postgres, QueryBuilder};
use std::sync::OnceLock;
use uuid::Uuid;

fn layout_dict() -> &'static FieldDictionary {
	static DICT: OnceLock<FieldDictionary> = OnceLock::new();
	DICT.get_or_init(|| {
		FieldDictionary::new(&[
			("DSS::LYT::oid", "oid", FieldKind::Text),
			("DSS::LYT::uuid", "uuid", FieldKind::Text),
			("DSS::LYT::version", "version", FieldKind::Integer),
			("DSS::LYT::layout_desc", "layout_desc", FieldKind::Json),
		])
	})
}

/// `{mod_name, major, minor, attrs}` describing how a layout module encoded
/// the object (e.g. RAID1's replication count lives in `attrs`).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LayoutDesc {
	pub mod_name: String,
	pub major: i32,
	pub minor: i32,
	pub attrs: Json,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Extent {
	pub layout_oid: String,
	pub layout_uuid: Uuid,
	pub layout_version: i64,
	pub layout_idx: i32,
	pub medium_family: Family,
	pub medium_name: String,
	pub medium_library: String,
	pub size: i64,
	pub address: String,
}

impl Extent {
	pub fn medium_id(&self) -> crate::error::DssResult<PhoId> {
		PhoId::new(self.medium_family, self.medium_name.clone(), self.medium_library.clone())
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
	pub oid: String,
	pub uuid: Uuid,
	pub version: i64,
	pub layout_desc: LayoutDesc,
	pub extents: Vec<Extent>,
}

pub struct LayoutStore;

impl LayoutStore {
	pub async fn get(conn: &CatalogConnection, filter: Option<&Filter>) -> DssResult<Vec<Layout>> {
		#[derive(sqlx::FromRow)]
		struct Row {
			oid: String,
			uuid: Uuid,
			version: i64,
			layout_desc: Json,
		}
		let mut qb = QueryBuilder::<Postgres>::new("SELECT oid, uuid, version, layout_desc FROM layout");
		if let Some(filter) = filter {
			filter.append_where(&mut qb, layout_dict())?;
		}
		let rows: Vec<Row> = qb.build_query_as().fetch_all(conn.pool()).await?;

		let mut layouts = Vec::with_capacity(rows.len());
		for row in rows {
			let extents: Vec<Extent> = sqlx::query_as(
				"SELECT layout_oid, layout_uuid, layout_version, layout_idx, medium_family, medium_name, medium_library, size, address
				 FROM extent WHERE layout_oid = $1 AND layout_uuid = $2 AND layout_version = $3 ORDER BY layout_idx",
			)
			.bind(&row.oid)
			.bind(row.uuid)
			.bind(row.version)
			.fetch_all(conn.pool())
			.await?;
			layouts.push(Layout {
				oid: row.oid,
				uuid: row.uuid,
				version: row.version,
				layout_desc: serde_json::from_value(row.layout_desc)?,
				extents,
			});
		}
		Ok(layouts)
	}

	/// Inserts a layout and its extents atomically. `layout_idx` must be
	/// unique within one layout; checked here up front and backstopped by a
	/// unique index.
	pub async fn insert(conn: &CatalogConnection, layout: &Layout) -> DssResult<()> {
		let mut seen = std::collections::HashSet::new();
		for extent in &layout.extents {
			if !seen.insert(extent.layout_idx) {
				return Err(crate::error::Error::invalid(format!(
					"duplicate layout_idx {} in layout for {}",
					extent.layout_idx, layout.oid
				)));
			}
		}

		let mut tx = conn.begin().await?;
		sqlx::query("INSERT INTO layout (oid, uuid, version, layout_desc) VALUES ($1, $2, $3, $4)")
			.bind(&layout.oid)
			.bind(layout.uuid)
			.bind(layout.version)
			.bind(serde_json::to_value(&layout.layout_desc)?)
			.execute(&mut *tx)
			.await?;

		for extent in &layout.extents {
			sqlx::query(
				"INSERT INTO extent (layout_oid, layout_uuid, layout_version, layout_idx, medium_family, medium_name, medium_library, size, address)
				 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
			)
			.bind(&extent.layout_oid)
			.bind(extent.layout_uuid)
			.bind(extent.layout_version)
			.bind(extent.layout_idx)
			.bind(extent.medium_family.as_str())
			.bind(&extent.medium_name)
			.bind(&extent.medium_library)
			.bind(extent.size)
			.bind(&extent.address)
			.execute(&mut *tx)
			.await?;
		}
		tx.commit().await?;
		Ok(())
	}

	pub async fn delete(conn: &CatalogConnection, oid: &str, uuid: Uuid, version: i64) -> DssResult<()> {
		let mut tx = conn.begin().await?;
		sqlx::query("DELETE FROM extent WHERE layout_oid = $1 AND layout_uuid = $2 AND layout_version = $3")
			.bind(oid)
			.bind(uuid)
			.bind(version)
			.execute(&mut *tx)
			.await?;
		sqlx::query("DELETE FROM layout WHERE oid = $1 AND uuid = $2 AND version = $3")
			.bind(oid)
			.bind(uuid)
			.bind(version)
			.execute(&mut *tx)
			.await?;
		tx.commit().await?;
		Ok(())
	}
}
