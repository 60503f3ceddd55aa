//! Error taxonomy for the Distributed State Service core.
//!
//! Every public operation returns [`DssResult`]. Callers (LRS, the admin
//! library, the CLI) match on [`Error::kind`] to decide retry vs abort and to
//! pick an exit code; they never need to inspect the `Display` string.

use std::env::VarError as EnvironmentError;

pub type DssResult<T> = Result<T, Error>;

/// The ten error kinds callers can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
	NotFound,
	AlreadyExists,
	Conflict,
	Invalid,
	PermissionDenied,
	NotLocked,
	NoDevice,
	OperationNotPermitted,
	Unsupported,
	Transport,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("not found: {0}")]
	NotFound(String),

	#[error("already exists: {0}")]
	AlreadyExists(String),

	#[error("conflict: {0}")]
	Conflict(String),

	#[error("invalid argument: {0}")]
	Invalid(String),

	#[error("permission denied: {0}")]
	PermissionDenied(String),

	#[error("not locked: {0}")]
	NotLocked(String),

	#[error("no device owns this medium: {0}")]
	NoDevice(String),

	#[error("operation not permitted: {0}")]
	OperationNotPermitted(String),

	#[error("unsupported: {0}")]
	Unsupported(String),

	#[error("catalog transport error: {0}")]
	Transport(String),
}

impl Error {
	pub fn kind(&self) -> Kind {
		match self {
			Error::NotFound(_) => Kind::NotFound,
			Error::AlreadyExists(_) => Kind::AlreadyExists,
			Error::Conflict(_) => Kind::Conflict,
			Error::Invalid(_) => Kind::Invalid,
			Error::PermissionDenied(_) => Kind::PermissionDenied,
			Error::NotLocked(_) => Kind::NotLocked,
			Error::NoDevice(_) => Kind::NoDevice,
			Error::OperationNotPermitted(_) => Kind::OperationNotPermitted,
			Error::Unsupported(_) => Kind::Unsupported,
			Error::Transport(_) => Kind::Transport,
		}
	}

	pub fn not_found<S: Into<String>>(s: S) -> Error {
		Error::NotFound(s.into())
	}

	pub fn invalid<S: Into<String>>(s: S) -> Error {
		Error::Invalid(s.into())
	}
}

impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Error {
		match err {
			sqlx::Error::RowNotFound => Error::NotFound("catalog row".to_string()),
			sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
				Error::AlreadyExists(db_err.to_string())
			}
			sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
				Error::Conflict(db_err.to_string())
			}
			other => Error::Transport(other.to_string()),
		}
	}
}

impl From<sqlx::migrate::MigrateError> for Error {
	fn from(err: sqlx::migrate::MigrateError) -> Error {
		Error::Transport(format!("migration failed: {}", err))
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Error {
		Error::Invalid(format!("malformed filter: {}", err))
	}
}

impl From<EnvironmentError> for Error {
	fn from(err: EnvironmentError) -> Error {
		Error::Invalid(format!("environment: {}", err))
	}
}

impl From<regex::Error> for Error {
	fn from(err: regex::Error) -> Error {
		Error::Invalid(format!("bad regex filter: {}", err))
	}
}
