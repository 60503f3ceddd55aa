//! Medium Locator: answers "which host currently has this medium loaded",
//! consulting the medium's own access flags before asking the Lock Manager
//! who holds it.
//!
//! The lookup-then-side-effect shape here — resolve the authoritative answer
//! first, then fire off a best-effort `last_locate` refresh — keeps the
//! refresh from ever making a correct locate answer fail.

use crate::db::CatalogConnection;
use crate::entity::device::AdmStatus;
use crate::entity::medium::{Medium, MediumStore};
use crate::error::{DssResult, Error};
use crate::id::{Family, PhoId};
use crate::lock::{LockItem, LockManager, LockOwner};
use log::warn;

/// Result of a successful locate: the medium's catalog row, and the host
/// that currently holds its lock — `None` when no host has it loaded, which
/// is a normal outcome for any family except `dir`.
#[derive(Debug)]
pub struct Location {
	pub medium: Medium,
	pub hostname: Option<String>,
}

/// Finds where `id` currently lives. Refreshes `last_locate` on success as a
/// fire-and-forget side effect: a failure to refresh is logged and does not
/// fail the caller's request, since the locate answer itself is already
/// correct without it.
pub async fn locate(conn: &CatalogConnection, id: &PhoId) -> DssResult<Location> {
	let medium = MediumStore::get_one(conn, id).await?;

	if medium.adm_status != AdmStatus::Unlocked {
		return Err(Error::PermissionDenied(format!("medium {} is administratively locked", id)));
	}
	if !medium.get_access {
		return Err(Error::OperationNotPermitted(format!("medium {} has get access disabled", id)));
	}

	let item = LockItem::for_medium(id);
	let status = LockManager::status(conn, std::slice::from_ref(&item)).await.into_iter().next();

	let (hostname, owner) = match status {
		Some(Ok(status)) => (Some(status.hostname.clone()), Some(LockOwner { hostname: status.hostname, owner: status.owner })),
		Some(Err(_)) if id.family == Family::Dir => {
			// `dir` media have no physical drive to load them into; without
			// an active lock there is no process serving this directory at
			// all, which is a harder failure than "currently unlocated".
			return Err(Error::NoDevice(format!("no host is currently serving directory medium {}", id)));
		}
		Some(Err(_)) | None => (None, None),
	};

	if let Some(owner) = owner {
		if let Err(e) = LockManager::refresh(conn, std::slice::from_ref(&item), &owner, true).await.into_iter().next().unwrap_or(Ok(())) {
			warn!("last_locate refresh failed for medium {}: {}", id, e);
		}
	}

	Ok(Location { medium, hostname })
}
