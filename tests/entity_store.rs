//! Entity Store integration tests. Must be connected to a local Postgres
//! instance; `#[sqlx::test]` provisions and migrates a throwaway database per
//! test from the connection string in `DATABASE_URL`.

use phobos_dss::db::CatalogConnection;
use phobos_dss::entity::device::{AdmStatus, Device, DeviceStore};
use phobos_dss::entity::layout::{Extent, Layout, LayoutDesc, LayoutStore};
use phobos_dss::entity::log::{Cause, LogStore, NewLogEntry};
use phobos_dss::entity::medium::{MediaUpdate, Medium, MediumStore};
use phobos_dss::entity::object::{MoveKey, ObjectStore};
use phobos_dss::entity::EntityKind;
use phobos_dss::id::{Family, PhoId};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

#[sqlx::test]
async fn put_get_delete_round_trip(pool: PgPool) {
	let conn = CatalogConnection::from_pool(pool);

	let created = ObjectStore::put(&conn, "o1", json!({"size": 42})).await.unwrap();
	assert_eq!(created.version, 1);

	let live = ObjectStore::get(&conn, None).await.unwrap();
	assert_eq!(live.len(), 1);
	assert_eq!(live[0].oid, "o1");

	ObjectStore::delete(&conn, "o1").await.unwrap();
	assert!(ObjectStore::get(&conn, None).await.unwrap().is_empty());

	let deprecated = ObjectStore::get_deprecated(&conn, None).await.unwrap();
	assert_eq!(deprecated.len(), 1);
	assert_eq!(deprecated[0].version, 1);
}

#[sqlx::test]
async fn put_twice_on_same_oid_is_already_exists(pool: PgPool) {
	let conn = CatalogConnection::from_pool(pool);
	ObjectStore::put(&conn, "o1", json!({})).await.unwrap();
	let err = ObjectStore::put(&conn, "o1", json!({})).await.unwrap_err();
	assert_eq!(err.kind(), phobos_dss::error::Kind::AlreadyExists);
}

#[sqlx::test]
async fn overwrite_preserves_history_and_bumps_version(pool: PgPool) {
	let conn = CatalogConnection::from_pool(pool);
	let first = ObjectStore::put(&conn, "o1", json!({"rev": 1})).await.unwrap();
	let second = ObjectStore::overwrite(&conn, "o1", json!({"rev": 2})).await.unwrap();

	assert_eq!(second.uuid, first.uuid);
	assert_eq!(second.version, first.version + 1);

	let deprecated = ObjectStore::get_deprecated(&conn, None).await.unwrap();
	assert_eq!(deprecated.len(), 1);
	assert_eq!(deprecated[0].version, first.version);
	assert_eq!(deprecated[0].user_md, json!({"rev": 1}));
}

#[sqlx::test]
async fn overwrite_without_a_live_row_is_not_found(pool: PgPool) {
	let conn = CatalogConnection::from_pool(pool);
	let err = ObjectStore::overwrite(&conn, "missing", json!({})).await.unwrap_err();
	assert_eq!(err.kind(), phobos_dss::error::Kind::NotFound);
}

#[sqlx::test]
async fn move_generation_round_trips_live_and_deprecated(pool: PgPool) {
	let conn = CatalogConnection::from_pool(pool);
	let created = ObjectStore::put(&conn, "o1", json!({"rev": 1})).await.unwrap();

	ObjectStore::move_generation(&conn, EntityKind::Object, EntityKind::DeprecatedObject, &[MoveKey::ByOid("o1".into())])
		.await
		.unwrap();
	assert!(ObjectStore::get(&conn, None).await.unwrap().is_empty());
	let deprecated = ObjectStore::get_deprecated(&conn, None).await.unwrap();
	assert_eq!(deprecated.len(), 1);
	assert_eq!(deprecated[0].uuid, created.uuid);

	ObjectStore::move_generation(
		&conn,
		EntityKind::DeprecatedObject,
		EntityKind::Object,
		&[MoveKey::ByUuidVersion(created.uuid, created.version)],
	)
	.await
	.unwrap();
	assert!(ObjectStore::get_deprecated(&conn, None).await.unwrap().is_empty());
	let live = ObjectStore::get(&conn, None).await.unwrap();
	assert_eq!(live.len(), 1);
	assert_eq!(live[0].oid, "o1");
	assert_eq!(live[0].uuid, created.uuid);
}

#[sqlx::test]
async fn move_generation_into_a_colliding_oid_is_already_exists(pool: PgPool) {
	let conn = CatalogConnection::from_pool(pool);
	let first = ObjectStore::put(&conn, "o1", json!({"rev": 1})).await.unwrap();
	ObjectStore::delete(&conn, "o1").await.unwrap();
	ObjectStore::put(&conn, "o1", json!({"rev": 2})).await.unwrap();

	// "o1" is live again under a new generation; restoring the deprecated
	// generation back onto the same oid must collide, not silently clobber it.
	let err = ObjectStore::move_generation(
		&conn,
		EntityKind::DeprecatedObject,
		EntityKind::Object,
		&[MoveKey::ByUuidVersion(first.uuid, first.version)],
	)
	.await
	.unwrap_err();
	assert_eq!(err.kind(), phobos_dss::error::Kind::AlreadyExists);

	// The failed move must not have touched either table.
	let deprecated = ObjectStore::get_deprecated(&conn, None).await.unwrap();
	assert_eq!(deprecated.len(), 1);
	let live = ObjectStore::get(&conn, None).await.unwrap();
	assert_eq!(live.len(), 1);
}

fn medium(name: &str) -> Medium {
	Medium {
		family: Family::Disk,
		name: name.into(),
		library: "legacy".into(),
		model: None,
		adm_status: AdmStatus::Unlocked,
		fs_type: None,
		fs_status: None,
		fs_label: None,
		addr_type: None,
		nb_obj: 0,
		logc_spc_used: 0,
		phys_spc_used: 0,
		phys_spc_free: 0,
		nb_load: 0,
		nb_errors: 0,
		last_load: None,
		tags: vec![],
		groupings: vec![],
		put_access: true,
		get_access: true,
		delete_access: true,
	}
}

#[sqlx::test]
async fn device_insert_update_and_delete_round_trip(pool: PgPool) {
	let conn = CatalogConnection::from_pool(pool);
	let id = PhoId::with_default_library(Family::Tape, "D1").unwrap();
	let device = Device {
		family: id.family,
		name: id.name.clone(),
		library: id.library.clone(),
		host: None,
		model: Some("LTO-8".into()),
		path: "/dev/st0".into(),
		adm_status: AdmStatus::Unlocked,
	};
	DeviceStore::insert(&conn, &device).await.unwrap();

	DeviceStore::update_adm_status(&conn, &id, AdmStatus::Locked).await.unwrap();
	DeviceStore::update_host(&conn, &id, Some("host-a")).await.unwrap();

	let found = DeviceStore::get(&conn, None).await.unwrap();
	assert_eq!(found.len(), 1);
	assert_eq!(found[0].adm_status, AdmStatus::Locked);
	assert_eq!(found[0].host.as_deref(), Some("host-a"));

	DeviceStore::delete(&conn, &id).await.unwrap();
	assert!(DeviceStore::get(&conn, None).await.unwrap().is_empty());
}

#[sqlx::test]
async fn device_update_on_a_missing_row_is_not_found(pool: PgPool) {
	let conn = CatalogConnection::from_pool(pool);
	let id = PhoId::with_default_library(Family::Tape, "ghost").unwrap();
	let err = DeviceStore::update_adm_status(&conn, &id, AdmStatus::Failed).await.unwrap_err();
	assert_eq!(err.kind(), phobos_dss::error::Kind::NotFound);
}

#[sqlx::test]
async fn medium_update_applies_absolute_and_additive_stat_fields(pool: PgPool) {
	let conn = CatalogConnection::from_pool(pool);
	let id = PhoId::with_default_library(Family::Disk, "M1").unwrap();
	MediumStore::insert(&conn, &medium("M1")).await.unwrap();

	let update = MediaUpdate { nb_obj: Some(10), ..Default::default() };
	MediumStore::update(&conn, &id, &update).await.unwrap();
	assert_eq!(MediumStore::get_one(&conn, &id).await.unwrap().nb_obj, 10);

	let update = MediaUpdate { nb_obj_add: Some(5), logc_spc_used_add: Some(100), ..Default::default() };
	MediumStore::update(&conn, &id, &update).await.unwrap();
	let row = MediumStore::get_one(&conn, &id).await.unwrap();
	assert_eq!(row.nb_obj, 15);
	assert_eq!(row.logc_spc_used, 100);

	MediumStore::delete(&conn, &id).await.unwrap();
	assert!(MediumStore::get(&conn, None).await.unwrap().is_empty());
}

#[sqlx::test]
async fn medium_update_on_a_missing_row_is_not_found(pool: PgPool) {
	let conn = CatalogConnection::from_pool(pool);
	let id = PhoId::with_default_library(Family::Disk, "ghost").unwrap();
	let update = MediaUpdate { put_access: Some(false), ..Default::default() };
	let err = MediumStore::update(&conn, &id, &update).await.unwrap_err();
	assert_eq!(err.kind(), phobos_dss::error::Kind::NotFound);
}

#[sqlx::test]
async fn layout_insert_get_and_delete_round_trip(pool: PgPool) {
	let conn = CatalogConnection::from_pool(pool);
	let uuid = Uuid::new_v4();
	let layout = Layout {
		oid: "o1".into(),
		uuid,
		version: 1,
		layout_desc: LayoutDesc { mod_name: "raid1".into(), major: 0, minor: 1, attrs: json!({}) },
		extents: vec![Extent {
			layout_oid: "o1".into(),
			layout_uuid: uuid,
			layout_version: 1,
			layout_idx: 0,
			medium_family: Family::Tape,
			medium_name: "T1".into(),
			medium_library: "legacy".into(),
			size: 1024,
			address: "0".into(),
		}],
	};
	LayoutStore::insert(&conn, &layout).await.unwrap();

	let found = LayoutStore::get(&conn, None).await.unwrap();
	assert_eq!(found.len(), 1);
	assert_eq!(found[0].extents.len(), 1);
	assert_eq!(found[0].extents[0].medium_name, "T1");

	LayoutStore::delete(&conn, "o1", uuid, 1).await.unwrap();
	assert!(LayoutStore::get(&conn, None).await.unwrap().is_empty());
}

#[sqlx::test]
async fn layout_insert_rejects_a_duplicate_layout_idx_before_touching_the_catalog(pool: PgPool) {
	let conn = CatalogConnection::from_pool(pool);
	let uuid = Uuid::new_v4();
	let extent = |idx: i32, name: &str| Extent {
		layout_oid: "o1".into(),
		layout_uuid: uuid,
		layout_version: 1,
		layout_idx: idx,
		medium_family: Family::Tape,
		medium_name: name.into(),
		medium_library: "legacy".into(),
		size: 1,
		address: "0".into(),
	};
	let layout = Layout {
		oid: "o1".into(),
		uuid,
		version: 1,
		layout_desc: LayoutDesc { mod_name: "raid1".into(), major: 0, minor: 1, attrs: json!({}) },
		extents: vec![extent(0, "T1"), extent(0, "T2")],
	};

	let err = LayoutStore::insert(&conn, &layout).await.unwrap_err();
	assert_eq!(err.kind(), phobos_dss::error::Kind::Invalid);
	assert!(LayoutStore::get(&conn, None).await.unwrap().is_empty());
}

#[sqlx::test]
async fn log_emit_get_and_delete_round_trip(pool: PgPool) {
	let conn = CatalogConnection::from_pool(pool);
	let device = PhoId::with_default_library(Family::Tape, "D1").unwrap();
	let medium = PhoId::with_default_library(Family::Tape, "T1").unwrap();
	LogStore::emit(
		&conn,
		NewLogEntry { device, medium, cause: Cause::DeviceLoad, errno: 0, message: json!({"ok": true}) },
	)
	.await
	.unwrap();

	let found = LogStore::get(&conn, None).await.unwrap();
	assert_eq!(found.len(), 1);
	assert_eq!(found[0].cause, Cause::DeviceLoad);

	let removed = LogStore::delete(&conn, None).await.unwrap();
	assert_eq!(removed, 1);
	assert!(LogStore::get(&conn, None).await.unwrap().is_empty());
}
