//! Logging front-end for local development and daemon-embedded use.
//!
//! Consumers (the LRS daemon, the CLI) own their own logging presentation;
//! this module just gives them one ready-made dispatcher in the same shape
//! the rest of the Phobos stack uses, gated behind the `logging` feature so
//! a consumer that wires its own `log` backend doesn't pay for `fern`.

#[cfg(feature = "logging")]
use fern::colors::{Color, ColoredLevelConfig};

/// Initialise a colored stdout logger plus a file sink at `file_path`.
///
/// `stdout_level` governs what reaches the terminal; `file_level` governs
/// the on-disk trace, which is typically more verbose (`debug` or `trace`)
/// since it is consulted only after the fact.
#[cfg(feature = "logging")]
pub fn init(stdout_level: log::LevelFilter, file_level: log::LevelFilter, file_path: &std::path::Path) -> Result<(), crate::error::Error> {
	let colors = ColoredLevelConfig::new()
		.info(Color::Green)
		.warn(Color::Yellow)
		.error(Color::Red)
		.debug(Color::Blue)
		.trace(Color::Magenta);

	if let Some(parent) = file_path.parent() {
		std::fs::create_dir_all(parent).map_err(|e| crate::error::Error::Transport(e.to_string()))?;
	}

	fern::Dispatch::new()
		.format(move |out, message, record| {
			out.finish(format_args!(
				"{} [{}][{}] {}",
				chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
				record.target(),
				colors.color(record.level()),
				message,
			))
		})
		.chain(
			fern::Dispatch::new()
				.level(log::LevelFilter::Info)
				.level_for("phobos_dss", file_level)
				.chain(fern::log_file(file_path).map_err(|e| crate::error::Error::Transport(e.to_string()))?),
		)
		.chain(fern::Dispatch::new().level(stdout_level).chain(std::io::stdout()))
		.apply()
		.map_err(|e| crate::error::Error::Transport(e.to_string()))?;
	Ok(())
}
