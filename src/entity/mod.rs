//! Entity Store: CRUD on the five persistent entity kinds, plus the `Lock`
//! tag the Lock Manager keys against. Each kind's query is parameterised at
//! runtime by a [`crate::filter::Filter`], so rows are hand-mapped through
//! `sqlx::FromRow` structs rather than a compile-time schema macro.

pub mod device;
pub mod layout;
pub mod log;
pub mod medium;
pub mod object;

/// The five persistent entity kinds plus the coordination-only `Lock` kind.
/// The Lock Manager is oblivious to everything about an entity except this
/// tag and its primary-key serialisation — this enum is what it keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
	Object,
	DeprecatedObject,
	Layout,
	Device,
	Medium,
	Log,
}

impl EntityKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			EntityKind::Object => "object",
			EntityKind::DeprecatedObject => "deprecated_object",
			EntityKind::Layout => "layout",
			EntityKind::Device => "device",
			EntityKind::Medium => "media",
			EntityKind::Log => "logs",
		}
	}

	pub fn parse(s: &str) -> Option<EntityKind> {
		match s {
			"object" => Some(EntityKind::Object),
			"deprecated_object" => Some(EntityKind::DeprecatedObject),
			"layout" => Some(EntityKind::Layout),
			"device" => Some(EntityKind::Device),
			"media" => Some(EntityKind::Medium),
			"logs" => Some(EntityKind::Log),
			_ => None,
		}
	}
}
