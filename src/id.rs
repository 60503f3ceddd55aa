//! Identity primitives shared across every entity kind.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on an opaque name's length, mirrored from the C core's
/// `PHO_URI_MAX`. Names are validated against this at construction so a
/// caller can't silently truncate a too-long identity deep inside a query.
pub const PHO_URI_MAX: usize = 1024;

pub const DEFAULT_LIBRARY: &str = "legacy";

/// Kind of storage a [`PhoId`] names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum Family {
	Tape,
	Disk,
	Dir,
	RadosPool,
}

impl Family {
	pub fn as_str(&self) -> &'static str {
		match self {
			Family::Tape => "tape",
			Family::Disk => "disk",
			Family::Dir => "dir",
			Family::RadosPool => "rados_pool",
		}
	}

	/// Parses a family string, returning `None` on an unrecognised value.
	pub fn parse(s: &str) -> Option<Family> {
		match s {
			"tape" => Some(Family::Tape),
			"disk" => Some(Family::Disk),
			"dir" => Some(Family::Dir),
			"rados_pool" => Some(Family::RadosPool),
			_ => None,
		}
	}
}

impl fmt::Display for Family {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

/// `(family, name, library)`: identity of a [`Medium`](crate::entity::medium::Medium)
/// or [`Device`](crate::entity::device::Device).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhoId {
	pub family: Family,
	pub name: String,
	pub library: String,
}

impl PhoId {
	pub fn new(family: Family, name: impl Into<String>, library: impl Into<String>) -> crate::error::DssResult<PhoId> {
		let name = name.into();
		if name.is_empty() || name.len() > PHO_URI_MAX {
			return Err(crate::error::Error::invalid(format!(
				"medium/device name must be 1..={} bytes, got {}",
				PHO_URI_MAX,
				name.len()
			)));
		}
		Ok(PhoId { family, name, library: library.into() })
	}

	/// Builds a `PhoId` with the default library, as most callers do.
	pub fn with_default_library(family: Family, name: impl Into<String>) -> crate::error::DssResult<PhoId> {
		PhoId::new(family, name, DEFAULT_LIBRARY)
	}

	/// Canonical string form used as the Lock Manager's entity-identity
	/// serialisation: the manager keys on this string, never on the entity
	/// payload.
	pub fn canonical(&self) -> String {
		format!("{}:{}:{}", self.family, self.library, self.name)
	}
}

impl fmt::Display for PhoId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.canonical())
	}
}
