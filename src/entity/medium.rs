//! Media and the typed update mask that replaces a 64-bit bitfield of update
//! flags with a set of optional, named fields. We can't reject an illegal
//! combination like `nb_obj` + `nb_obj_add` at compile time without a
//! const-generic builder that would obscure more than it clarifies, so the
//! typed [`MediaUpdate`] instead rejects it at construction time via
//! [`MediaUpdate::validate`], returning `Invalid` rather than silently
//! picking a precedence between the two.

use crate::db::CatalogConnection;
use crate::entity::device::AdmStatus;
use crate::error::{DssResult, Error};
use crate::filter::{Filter, FieldDictionary, FieldKind};
use crate::id::{Family, PhoId};
use chrono::{DateTime, Utc};
use std::sync::OnceLock;

fn medium_dict() -> &'static FieldDictionary {
	static DICT: OnceLock<FieldDictionary> = OnceLock::new();
	DICT.get_or_init(|| {
		FieldDictionary::new(&[
			("DSS::MDA::family", "family", FieldKind::Text),
			("DSS::MDA::name", "name", FieldKind::Text),
			("DSS::MDA::library", "library", FieldKind::Text),
			("DSS::MDA::model", "model", FieldKind::Text),
			("DSS::MDA::adm_status", "adm_status", FieldKind::Text),
			("DSS::MDA::fs_type", "fs_type", FieldKind::Text),
			("DSS::MDA::fs_status", "fs_status", FieldKind::Text),
			("DSS::MDA::fs_label", "fs_label", FieldKind::Text),
			("DSS::MDA::addr_type", "addr_type", FieldKind::Text),
			("DSS::MDA::tags", "tags", FieldKind::Array),
			("DSS::MDA::groupings", "groupings", FieldKind::Array),
			("DSS::MDA::put_access", "put_access", FieldKind::Boolean),
			("DSS::MDA::get_access", "get_access", FieldKind::Boolean),
			("DSS::MDA::delete_access", "delete_access", FieldKind::Boolean),
		])
	})
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Medium {
	pub family: Family,
	pub name: String,
	pub library: String,
	pub model: Option<String>,
	pub adm_status: AdmStatus,
	pub fs_type: Option<String>,
	pub fs_status: Option<String>,
	pub fs_label: Option<String>,
	pub addr_type: Option<String>,
	pub nb_obj: i64,
	pub logc_spc_used: i64,
	pub phys_spc_used: i64,
	pub phys_spc_free: i64,
	pub nb_load: i64,
	pub nb_errors: i64,
	pub last_load: Option<DateTime<Utc>>,
	pub tags: Vec<String>,
	pub groupings: Vec<String>,
	pub put_access: bool,
	pub get_access: bool,
	pub delete_access: bool,
}

impl Medium {
	pub fn id(&self) -> DssResult<PhoId> {
		PhoId::new(self.family, self.name.clone(), self.library.clone())
	}
}

/// A sparse set of field updates. Every field is independently optional;
/// `validate` enforces the mutual-exclusion rules between a field's absolute
/// and additive forms.
#[derive(Debug, Clone, Default)]
pub struct MediaUpdate {
	pub adm_status: Option<AdmStatus>,
	pub fs_status: Option<String>,
	pub fs_label: Option<String>,
	pub nb_obj: Option<i64>,
	pub nb_obj_add: Option<i64>,
	pub logc_spc_used: Option<i64>,
	pub logc_spc_used_add: Option<i64>,
	pub phys_spc_used: Option<i64>,
	pub phys_spc_free: Option<i64>,
	pub tags: Option<Vec<String>>,
	pub groupings: Option<Vec<String>>,
	pub put_access: Option<bool>,
	pub get_access: Option<bool>,
	pub delete_access: Option<bool>,
}

impl MediaUpdate {
	pub fn validate(&self) -> DssResult<()> {
		if self.nb_obj.is_some() && self.nb_obj_add.is_some() {
			return Err(Error::invalid("NB_OBJ and NB_OBJ_ADD cannot both be set in the same update"));
		}
		if self.logc_spc_used.is_some() && self.logc_spc_used_add.is_some() {
			return Err(Error::invalid("LOGC_SPC_USED and LOGC_SPC_USED_ADD cannot both be set in the same update"));
		}
		Ok(())
	}

	fn is_empty(&self) -> bool {
		self.adm_status.is_none()
			&& self.fs_status.is_none()
			&& self.fs_label.is_none()
			&& self.nb_obj.is_none()
			&& self.nb_obj_add.is_none()
			&& self.logc_spc_used.is_none()
			&& self.logc_spc_used_add.is_none()
			&& self.phys_spc_used.is_none()
			&& self.phys_spc_free.is_none()
			&& self.tags.is_none()
			&& self.groupings.is_none()
			&& self.put_access.is_none()
			&& self.get_access.is_none()
			&& self.delete_access.is_none()
	}
}

pub struct MediumStore;

impl MediumStore {
	pub async fn get(conn: &CatalogConnection, filter: Option<&Filter>) -> DssResult<Vec<Medium>> {
		let mut qb = sqlx::QueryBuilder::new(
			"SELECT family, name, library, model, adm_status, fs_type, fs_status, fs_label, addr_type,
			        nb_obj, logc_spc_used, phys_spc_used, phys_spc_free, nb_load, nb_errors, last_load,
			        tags, groupings, put_access, get_access, delete_access
			 FROM media",
		);
		if let Some(filter) = filter {
			filter.append_where(&mut qb, medium_dict())?;
		}
		Ok(qb.build_query_as().fetch_all(conn.pool()).await?)
	}

	pub async fn get_one(conn: &CatalogConnection, id: &PhoId) -> DssResult<Medium> {
		sqlx::query_as(
			"SELECT family, name, library, model, adm_status, fs_type, fs_status, fs_label, addr_type,
			        nb_obj, logc_spc_used, phys_spc_used, phys_spc_free, nb_load, nb_errors, last_load,
			        tags, groupings, put_access, get_access, delete_access
			 FROM media WHERE family = $1 AND name = $2 AND library = $3",
		)
		.bind(id.family.as_str())
		.bind(&id.name)
		.bind(&id.library)
		.fetch_optional(conn.pool())
		.await?
		.ok_or_else(|| Error::not_found(format!("medium {}", id)))
	}

	pub async fn insert(conn: &CatalogConnection, medium: &Medium) -> DssResult<()> {
		sqlx::query(
			"INSERT INTO media (family, name, library, model, adm_status, fs_type, fs_status, fs_label, addr_type,
			                     nb_obj, logc_spc_used, phys_spc_used, phys_spc_free, nb_load, nb_errors, last_load,
			                     tags, groupings, put_access, get_access, delete_access)
			 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21)",
		)
		.bind(medium.family.as_str())
		.bind(&medium.name)
		.bind(&medium.library)
		.bind(&medium.model)
		.bind(medium.adm_status.as_str())
		.bind(&medium.fs_type)
		.bind(&medium.fs_status)
		.bind(&medium.fs_label)
		.bind(&medium.addr_type)
		.bind(medium.nb_obj)
		.bind(medium.logc_spc_used)
		.bind(medium.phys_spc_used)
		.bind(medium.phys_spc_free)
		.bind(medium.nb_load)
		.bind(medium.nb_errors)
		.bind(medium.last_load)
		.bind(&medium.tags)
		.bind(&medium.groupings)
		.bind(medium.put_access)
		.bind(medium.get_access)
		.bind(medium.delete_access)
		.execute(conn.pool())
		.await?;
		Ok(())
	}

	/// Applies `update` to the row identified by `id`. Every branch of the
	/// mask is folded into one `UPDATE ... SET` statement so the whole update
	/// — including additive stat deltas — commits as a single row-level
	/// atomic operation relative to concurrent readers.
	pub async fn update(conn: &CatalogConnection, id: &PhoId, update: &MediaUpdate) -> DssResult<()> {
		update.validate()?;
		if update.is_empty() {
			return Ok(());
		}

		let mut qb = sqlx::QueryBuilder::new("UPDATE media SET ");
		let mut first = true;
		macro_rules! set_clause {
			($sql:expr, $value:expr) => {{
				if !first {
					qb.push(", ");
				}
				first = false;
				qb.push($sql);
				qb.push_bind($value);
			}};
		}

		if let Some(v) = &update.adm_status {
			set_clause!("adm_status = ", v.as_str());
		}
		if let Some(v) = &update.fs_status {
			set_clause!("fs_status = ", v.clone());
		}
		if let Some(v) = &update.fs_label {
			set_clause!("fs_label = ", v.clone());
		}
		if let Some(v) = update.nb_obj {
			set_clause!("nb_obj = ", v);
		}
		if let Some(v) = update.nb_obj_add {
			set_clause!("nb_obj = nb_obj + ", v);
		}
		if let Some(v) = update.logc_spc_used {
			set_clause!("logc_spc_used = ", v);
		}
		if let Some(v) = update.logc_spc_used_add {
			set_clause!("logc_spc_used = logc_spc_used + ", v);
		}
		if let Some(v) = update.phys_spc_used {
			set_clause!("phys_spc_used = ", v);
		}
		if let Some(v) = update.phys_spc_free {
			set_clause!("phys_spc_free = ", v);
		}
		if let Some(v) = &update.tags {
			set_clause!("tags = ", v.clone());
		}
		if let Some(v) = &update.groupings {
			set_clause!("groupings = ", v.clone());
		}
		if let Some(v) = update.put_access {
			set_clause!("put_access = ", v);
		}
		if let Some(v) = update.get_access {
			set_clause!("get_access = ", v);
		}
		if let Some(v) = update.delete_access {
			set_clause!("delete_access = ", v);
		}

		qb.push(" WHERE family = ");
		qb.push_bind(id.family.as_str());
		qb.push(" AND name = ");
		qb.push_bind(id.name.clone());
		qb.push(" AND library = ");
		qb.push_bind(id.library.clone());

		let result = qb.build().execute(conn.pool()).await?;
		if result.rows_affected() == 0 {
			return Err(Error::not_found(format!("medium {}", id)));
		}
		Ok(())
	}

	pub async fn delete(conn: &CatalogConnection, id: &PhoId) -> DssResult<()> {
		sqlx::query("DELETE FROM media WHERE family = $1 AND name = $2 AND library = $3")
			.bind(id.family.as_str())
			.bind(&id.name)
			.bind(&id.library)
			.execute(conn.pool())
			.await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn nb_obj_and_nb_obj_add_together_is_invalid() {
		let update = MediaUpdate { nb_obj: Some(1), nb_obj_add: Some(1), ..Default::default() };
		let err = update.validate().unwrap_err();
		assert_eq!(err.kind(), crate::error::Kind::Invalid);
	}

	#[test]
	fn logc_spc_used_and_add_together_is_invalid() {
		let update = MediaUpdate { logc_spc_used: Some(1), logc_spc_used_add: Some(1), ..Default::default() };
		assert!(update.validate().is_err());
	}

	#[test]
	fn disjoint_fields_are_valid() {
		let update = MediaUpdate { nb_obj_add: Some(1), put_access: Some(false), ..Default::default() };
		assert!(update.validate().is_ok());
	}
}
