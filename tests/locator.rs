//! Medium Locator integration tests. Must be connected to a local Postgres
//! instance; `#[sqlx::test]` provisions and migrates a throwaway database per
//! test from the connection string in `DATABASE_URL`.

use phobos_dss::db::CatalogConnection;
use phobos_dss::entity::device::AdmStatus;
use phobos_dss::entity::medium::{Medium, MediumStore};
use phobos_dss::id::Family;
use phobos_dss::lock::{LockItem, LockManager, LockOwner};
use phobos_dss::locator::locate;
use sqlx::PgPool;

fn medium(family: Family, name: &str) -> Medium {
	Medium {
		family,
		name: name.to_string(),
		library: "legacy".to_string(),
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
async fn unlocated_tape_resolves_with_no_host(pool: PgPool) {
	let conn = CatalogConnection::from_pool(pool);
	let m = medium(Family::Tape, "T1");
	MediumStore::insert(&conn, &m).await.unwrap();

	let location = locate(&conn, &m.id().unwrap()).await.unwrap();
	assert!(location.hostname.is_none());
}

#[sqlx::test]
async fn loaded_tape_resolves_to_the_holding_host(pool: PgPool) {
	let conn = CatalogConnection::from_pool(pool);
	let m = medium(Family::Tape, "T1");
	MediumStore::insert(&conn, &m).await.unwrap();
	let id = m.id().unwrap();

	let owner = LockOwner { hostname: "drive-host".to_string(), owner: 42 };
	LockManager::acquire(&conn, &[LockItem::for_medium(&id)], &owner).await.unwrap();

	let location = locate(&conn, &id).await.unwrap();
	assert_eq!(location.hostname.as_deref(), Some("drive-host"));
}

#[sqlx::test]
async fn dir_family_without_a_serving_daemon_is_no_device(pool: PgPool) {
	let conn = CatalogConnection::from_pool(pool);
	let m = medium(Family::Dir, "D1");
	MediumStore::insert(&conn, &m).await.unwrap();

	let err = locate(&conn, &m.id().unwrap()).await.unwrap_err();
	assert_eq!(err.kind(), phobos_dss::error::Kind::NoDevice);
}

#[sqlx::test]
async fn administratively_locked_medium_is_permission_denied(pool: PgPool) {
	let conn = CatalogConnection::from_pool(pool);
	let mut m = medium(Family::Tape, "T1");
	m.adm_status = AdmStatus::Locked;
	MediumStore::insert(&conn, &m).await.unwrap();

	let err = locate(&conn, &m.id().unwrap()).await.unwrap_err();
	assert_eq!(err.kind(), phobos_dss::error::Kind::PermissionDenied);
}

#[sqlx::test]
async fn get_access_disabled_is_operation_not_permitted(pool: PgPool) {
	let conn = CatalogConnection::from_pool(pool);
	let mut m = medium(Family::Tape, "T1");
	m.get_access = false;
	MediumStore::insert(&conn, &m).await.unwrap();

	let err = locate(&conn, &m.id().unwrap()).await.unwrap_err();
	assert_eq!(err.kind(), phobos_dss::error::Kind::OperationNotPermitted);
}
