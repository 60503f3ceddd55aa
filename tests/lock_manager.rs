//! Lock Manager integration tests. Must be connected to a local Postgres
//! instance; `#[sqlx::test]` provisions and migrates a throwaway database per
//! test from the connection string in `DATABASE_URL`.

use phobos_dss::db::CatalogConnection;
use phobos_dss::entity::EntityKind;
use phobos_dss::lock::{first_error, LockItem, LockManager, LockOwner};
use sqlx::PgPool;

fn owner(tag: &str) -> LockOwner {
	LockOwner { hostname: format!("host-{}", tag), owner: 1 }
}

#[sqlx::test]
async fn all_or_nothing_acquire_rolls_back_on_first_conflict(pool: PgPool) {
	let conn = CatalogConnection::from_pool(pool);
	let a = LockItem { kind: EntityKind::Medium, identity: "tape:legacy:T1".into() };
	let b = LockItem { kind: EntityKind::Medium, identity: "tape:legacy:T2".into() };

	LockManager::acquire(&conn, &[a.clone()], &owner("x")).await.unwrap();

	let err = LockManager::acquire(&conn, &[b.clone(), a.clone()], &owner("y")).await.unwrap_err();
	assert_eq!(err.kind(), phobos_dss::error::Kind::AlreadyExists);

	// `b` must not have been left locked by the aborted batch.
	let statuses = LockManager::status(&conn, &[b]).await;
	assert!(matches!(statuses[0], Err(_)));
}

#[sqlx::test]
async fn refresh_from_a_different_host_is_permission_denied(pool: PgPool) {
	let conn = CatalogConnection::from_pool(pool);
	let item = LockItem { kind: EntityKind::Device, identity: "tape:legacy:D1".into() };
	LockManager::acquire(&conn, &[item.clone()], &owner("a")).await.unwrap();

	let results = LockManager::refresh(&conn, &[item], &owner("b"), false).await;
	assert_eq!(results[0].as_ref().unwrap_err().kind(), phobos_dss::error::Kind::PermissionDenied);
}

#[sqlx::test]
async fn refresh_missing_lock_is_not_locked(pool: PgPool) {
	let conn = CatalogConnection::from_pool(pool);
	let item = LockItem { kind: EntityKind::Device, identity: "tape:legacy:ghost".into() };
	let results = LockManager::refresh(&conn, &[item], &owner("a"), false).await;
	assert_eq!(first_error(&results).unwrap().kind(), phobos_dss::error::Kind::NotLocked);
}

#[sqlx::test]
async fn release_then_status_reports_not_locked(pool: PgPool) {
	let conn = CatalogConnection::from_pool(pool);
	let item = LockItem { kind: EntityKind::Medium, identity: "tape:legacy:T1".into() };
	LockManager::acquire(&conn, &[item.clone()], &owner("a")).await.unwrap();

	let released = LockManager::release(&conn, &[item.clone()], &owner("a"), false).await;
	assert!(released[0].is_ok());

	let statuses = LockManager::status(&conn, &[item]).await;
	assert_eq!(statuses[0].as_ref().unwrap_err().kind(), phobos_dss::error::Kind::NotLocked);
}

#[sqlx::test]
async fn force_release_ignores_ownership(pool: PgPool) {
	let conn = CatalogConnection::from_pool(pool);
	let item = LockItem { kind: EntityKind::Medium, identity: "tape:legacy:T1".into() };
	LockManager::acquire(&conn, &[item.clone()], &owner("a")).await.unwrap();

	let released = LockManager::release(&conn, &[item], &owner("someone-else"), true).await;
	assert!(released[0].is_ok());
}

#[sqlx::test]
async fn clean_all_removes_every_lock(pool: PgPool) {
	let conn = CatalogConnection::from_pool(pool);
	let a = LockItem { kind: EntityKind::Medium, identity: "tape:legacy:T1".into() };
	let b = LockItem { kind: EntityKind::Device, identity: "tape:legacy:D1".into() };
	LockManager::acquire(&conn, &[a, b], &owner("a")).await.unwrap();

	let removed = LockManager::clean_all(&conn).await.unwrap();
	assert_eq!(removed, 2);
}

#[sqlx::test]
async fn clean_devices_removes_locks_not_matching_the_given_owner(pool: PgPool) {
	let conn = CatalogConnection::from_pool(pool);
	let ours = LockItem { kind: EntityKind::Device, identity: "tape:legacy:D1".into() };
	let stale = LockItem { kind: EntityKind::Device, identity: "tape:legacy:D2".into() };
	let medium = LockItem { kind: EntityKind::Medium, identity: "tape:legacy:T1".into() };
	LockManager::acquire(&conn, &[ours.clone()], &owner("a")).await.unwrap();
	LockManager::acquire(&conn, &[stale], &owner("b")).await.unwrap();
	LockManager::acquire(&conn, &[medium.clone()], &owner("b")).await.unwrap();

	let removed = LockManager::clean_devices(&conn, &owner("a").hostname, owner("a").owner).await.unwrap();
	assert_eq!(removed, 1);

	let statuses = LockManager::status(&conn, &[ours, medium]).await;
	assert!(statuses[0].is_ok());
	assert!(statuses[1].is_ok());
}

#[sqlx::test]
async fn clean_media_keeps_listed_identities(pool: PgPool) {
	let conn = CatalogConnection::from_pool(pool);
	let keep = LockItem { kind: EntityKind::Medium, identity: "tape:legacy:T1".into() };
	let sweep = LockItem { kind: EntityKind::Medium, identity: "tape:legacy:T2".into() };
	LockManager::acquire(&conn, &[keep.clone(), sweep.clone()], &owner("a")).await.unwrap();

	let removed = LockManager::clean_media(&conn, &[keep.identity.clone()], &owner("a").hostname, owner("a").owner)
		.await
		.unwrap();
	assert_eq!(removed, 1);

	let statuses = LockManager::status(&conn, &[keep, sweep]).await;
	assert!(statuses[0].is_ok());
	assert!(statuses[1].is_err());
}

#[sqlx::test]
async fn clean_select_filters_by_host_and_kind(pool: PgPool) {
	let conn = CatalogConnection::from_pool(pool);
	let device = LockItem { kind: EntityKind::Device, identity: "tape:legacy:D1".into() };
	let medium = LockItem { kind: EntityKind::Medium, identity: "tape:legacy:T1".into() };
	LockManager::acquire(&conn, &[device.clone()], &owner("a")).await.unwrap();
	LockManager::acquire(&conn, &[medium.clone()], &owner("a")).await.unwrap();

	let removed =
		LockManager::clean_select(&conn, Some(&owner("a").hostname), Some(EntityKind::Device), None, None).await.unwrap();
	assert_eq!(removed, 1);

	let statuses = LockManager::status(&conn, &[device, medium]).await;
	assert!(statuses[0].is_err());
	assert!(statuses[1].is_ok());
}
