//! Configuration surface consumed by the DSS core.
//!
//! The core does not parse `phobos.conf`; the configuration loader is an
//! external collaborator. What this module owns is the one item the core
//! actually reads — `dss.connect_string` — and the `PHOBOS_<SECTION>_<name>`
//! environment-override convention shared with the rest of the stack.

use crate::error::{DssResult, Error};
use std::env;

/// Builds the `PHOBOS_<SECTION>_<name>` environment variable name used for
/// every configuration item, including ones owned by other components
/// (`LRS_sync_time_ms`, `LAYOUT_RAID1_repl_count`, ...). Kept here so every
/// component that needs an override shares one naming rule.
pub fn env_var_name(section: &str, name: &str) -> String {
	format!("PHOBOS_{}_{}", section.to_uppercase(), name)
}

/// Reads an environment variable, logging (at `warn`) and falling back to
/// `default` when absent.
fn process_var(name: &str, default: Option<&str>) -> DssResult<Option<String>> {
	match env::var(name) {
		Ok(v) => Ok(Some(v)),
		Err(env::VarError::NotPresent) => {
			if let Some(default) = default {
				log::debug!("{} not set, using default", name);
				Ok(Some(default.to_string()))
			} else {
				log::warn!("{} is not present, and no default was given", name);
				Ok(None)
			}
		}
		Err(e @ env::VarError::NotUnicode(_)) => {
			log::error!("{} contains invalid unicode data", name);
			Err(Error::from(e))
		}
	}
}

/// The subset of `phobos.conf`'s `[dss]` section this core actually consumes.
#[derive(Debug, Clone)]
pub struct Config {
	pub connect_string: String,
}

impl Config {
	/// Resolve `dss.connect_string`, applying `.env` first via
	/// `dotenv().ok()`, then `PHOBOS_DSS_connect_string`, falling back to the
	/// plain `DSS_CONNECT_STRING` variable a caller may already set.
	pub fn from_env() -> DssResult<Config> {
		dotenv::dotenv().ok();
		let name = env_var_name("dss", "connect_string");
		let connect_string = process_var(&name, None)?
			.or(process_var("DSS_CONNECT_STRING", None)?)
			.ok_or_else(|| Error::invalid("dss.connect_string is not configured"))?;
		Ok(Config { connect_string })
	}

	pub fn with_connect_string<S: Into<String>>(connect_string: S) -> Config {
		Config { connect_string: connect_string.into() }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn env_var_name_follows_the_phobos_section_name_convention() {
		assert_eq!(env_var_name("dss", "connect_string"), "PHOBOS_DSS_connect_string");
		assert_eq!(env_var_name("lrs", "sync_time_ms"), "PHOBOS_LRS_sync_time_ms");
	}

	#[test]
	fn explicit_connect_string_bypasses_env() {
		let cfg = Config::with_connect_string("postgres://localhost/phobos");
		assert_eq!(cfg.connect_string, "postgres://localhost/phobos");
	}
}
