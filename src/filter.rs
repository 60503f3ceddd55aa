//! Predicate compiler: turns a structured filter document — nested
//! `$AND`/`$OR`/`$NOR`/`$NOT` logical nodes, comparison nodes, and
//! JSON-containment nodes — into a parameterised `sqlx` query fragment.
//!
//! No caller-supplied value ever reaches the query text; every leaf is bound
//! through `QueryBuilder::push_bind` rather than interpolated, the same
//! parameter-binding discipline every entity store in this crate follows.

use crate::error::{DssResult, Error};
use serde_json::Value as Json;
use sqlx::{Postgres, QueryBuilder};
use std::collections::HashMap;

/// Recursion limit for nested logical nodes, so a maliciously or accidentally
/// deep filter document fails fast instead of blowing the call stack.
pub const MAX_DEPTH: usize = 16;

/// How a public field name's value should be coerced and bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
	Text,
	Integer,
	Boolean,
	/// A JSON/JSONB column; `$XJSON`/`$INJSON` target these.
	Json,
	/// A Postgres text[] column; `$LIKE`/`$REGEXP` do not apply.
	Array,
}

/// One dictionary entry: the public field name's storage column and the
/// type used to coerce values bound against it.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
	pub column: &'static str,
	pub kind: FieldKind,
}

/// Per-entity-kind public→storage dictionary. Unknown field names are
/// rejected while the filter is being built, with `Error::Unsupported`,
/// never silently passed through to SQL.
#[derive(Debug, Clone)]
pub struct FieldDictionary(HashMap<&'static str, FieldSpec>);

impl FieldDictionary {
	pub fn new(entries: &[(&'static str, &'static str, FieldKind)]) -> FieldDictionary {
		let mut map = HashMap::with_capacity(entries.len());
		for (public, column, kind) in entries {
			map.insert(*public, FieldSpec { column, kind: *kind });
		}
		FieldDictionary(map)
	}

	fn resolve(&self, public_field: &str) -> DssResult<FieldSpec> {
		self.0
			.get(public_field)
			.copied()
			.ok_or_else(|| Error::Unsupported(format!("unknown filter field: {}", public_field)))
	}
}

/// A compiled, clonable predicate tree. `None` (the `null` filter) means "no
/// restriction" and is represented by the absence of a `Filter`, not a
/// variant here — callers pass `Option<Filter>` to the Entity Store.
#[derive(Debug, Clone)]
pub enum Filter {
	And(Vec<Filter>),
	Or(Vec<Filter>),
	Nor(Vec<Filter>),
	Not(Box<Filter>),
	Eq(String, Json),
	Ne(String, Json),
	Gt(String, Json),
	Gte(String, Json),
	Lt(String, Json),
	Lte(String, Json),
	Like(String, String),
	Regexp(String, String),
	XJson(String, Json),
	InJson(String, String),
}

impl Filter {
	/// Parses a structured filter document against `dict`, validating field
	/// names and recursion depth but not yet binding values — that happens
	/// in [`Filter::append_where`].
	pub fn build(pattern: &Json, dict: &FieldDictionary) -> DssResult<Filter> {
		Self::build_at_depth(pattern, dict, 0)
	}

	fn build_at_depth(pattern: &Json, dict: &FieldDictionary, depth: usize) -> DssResult<Filter> {
		if depth > MAX_DEPTH {
			return Err(Error::invalid(format!("filter nesting exceeds limit of {}", MAX_DEPTH)));
		}
		let obj = pattern
			.as_object()
			.ok_or_else(|| Error::invalid("filter node must be a JSON object"))?;
		if obj.len() != 1 {
			return Err(Error::invalid("filter node must have exactly one key"));
		}
		let (key, value) = obj.iter().next().expect("checked len == 1 above");

		let parse_list = |value: &Json| -> DssResult<Vec<Filter>> {
			value
				.as_array()
				.ok_or_else(|| Error::invalid(format!("{} expects an array of nodes", key)))?
				.iter()
				.map(|n| Self::build_at_depth(n, dict, depth + 1))
				.collect()
		};

		fn single_field_object<'a>(key: &str, dict: &FieldDictionary, value: &'a Json) -> DssResult<(String, &'a Json)> {
			let obj = value
				.as_object()
				.ok_or_else(|| Error::invalid(format!("{} expects a single-field object", key)))?;
			if obj.len() != 1 {
				return Err(Error::invalid(format!("{} expects exactly one field", key)));
			}
			let (field, value) = obj.iter().next().expect("checked len == 1 above");
			// Validate the field exists in the dictionary up front so typos
			// surface as FilterInvalid/Unsupported at compile time.
			dict.resolve(field)?;
			Ok((field.clone(), value))
		}

		match key.as_str() {
			"$AND" => Ok(Filter::And(parse_list(value)?)),
			"$OR" => Ok(Filter::Or(parse_list(value)?)),
			"$NOR" => Ok(Filter::Nor(parse_list(value)?)),
			"$NOT" => Ok(Filter::Not(Box::new(Self::build_at_depth(value, dict, depth + 1)?))),
			"$XJSON" => {
				let (field, value) = single_field_object(key, dict, value)?;
				Ok(Filter::XJson(field, value.clone()))
			}
			"$INJSON" => {
				let (field, value) = single_field_object(key, dict, value)?;
				let key = value.as_str().ok_or_else(|| Error::invalid("$INJSON value must be a string key"))?;
				Ok(Filter::InJson(field, key.to_string()))
			}
			"$LIKE" => {
				let (field, value) = single_field_object(key, dict, value)?;
				let glob = value.as_str().ok_or_else(|| Error::invalid("$LIKE value must be a string"))?;
				Ok(Filter::Like(field, glob.to_string()))
			}
			"$GT" => {
				let (field, value) = single_field_object(key, dict, value)?;
				Ok(Filter::Gt(field, value.clone()))
			}
			"$GTE" => {
				let (field, value) = single_field_object(key, dict, value)?;
				Ok(Filter::Gte(field, value.clone()))
			}
			"$LT" => {
				let (field, value) = single_field_object(key, dict, value)?;
				Ok(Filter::Lt(field, value.clone()))
			}
			"$LTE" => {
				let (field, value) = single_field_object(key, dict, value)?;
				Ok(Filter::Lte(field, value.clone()))
			}
			"$NE" => {
				let (field, value) = single_field_object(key, dict, value)?;
				Ok(Filter::Ne(field, value.clone()))
			}
			"$REGEXP" => {
				let (field, value) = single_field_object(key, dict, value)?;
				let pattern = value.as_str().ok_or_else(|| Error::invalid("$REGEXP value must be a string"))?;
				// Validated eagerly so a bad pattern fails at compile time,
				// not when the catalog rejects it mid-query.
				regex::Regex::new(pattern)?;
				Ok(Filter::Regexp(field, pattern.to_string()))
			}
			field if !field.starts_with('$') => {
				// `{field: value}` sugar for equality.
				dict.resolve(field)?;
				Ok(Filter::Eq(field.to_string(), value.clone()))
			}
			other => Err(Error::invalid(format!("unrecognised filter operator: {}", other))),
		}
	}

	/// Appends `WHERE <compiled predicate>` (or nothing, for an empty `AND`)
	/// to `qb`, recursively, binding every leaf value.
	pub fn append_where(&self, qb: &mut QueryBuilder<'_, Postgres>, dict: &FieldDictionary) -> DssResult<()> {
		qb.push(" WHERE ");
		self.append_expr(qb, dict)
	}

	fn append_expr(&self, qb: &mut QueryBuilder<'_, Postgres>, dict: &FieldDictionary) -> DssResult<()> {
		match self {
			Filter::And(items) => Self::append_conjunction(qb, dict, items, " AND "),
			Filter::Or(items) => Self::append_conjunction(qb, dict, items, " OR "),
			Filter::Nor(items) => {
				qb.push("NOT (");
				Self::append_conjunction(qb, dict, items, " OR ")?;
				qb.push(")");
				Ok(())
			}
			Filter::Not(inner) => {
				qb.push("NOT (");
				inner.append_expr(qb, dict)?;
				qb.push(")");
				Ok(())
			}
			Filter::Eq(field, value) => Self::append_cmp(qb, dict, field, value, "="),
			Filter::Ne(field, value) => Self::append_cmp(qb, dict, field, value, "<>"),
			Filter::Gt(field, value) => Self::append_cmp(qb, dict, field, value, ">"),
			Filter::Gte(field, value) => Self::append_cmp(qb, dict, field, value, ">="),
			Filter::Lt(field, value) => Self::append_cmp(qb, dict, field, value, "<"),
			Filter::Lte(field, value) => Self::append_cmp(qb, dict, field, value, "<="),
			Filter::Like(field, glob) => {
				let spec = dict.resolve(field)?;
				qb.push(spec.column).push(" LIKE ").push_bind(glob.clone());
				Ok(())
			}
			Filter::Regexp(field, pattern) => {
				let spec = dict.resolve(field)?;
				qb.push(spec.column).push(" ~ ").push_bind(pattern.clone());
				Ok(())
			}
			Filter::XJson(field, value) => {
				let spec = dict.resolve(field)?;
				qb.push(spec.column).push(" @> ").push_bind(value.clone());
				Ok(())
			}
			Filter::InJson(field, key) => {
				let spec = dict.resolve(field)?;
				qb.push(spec.column).push(" ? ").push_bind(key.clone());
				Ok(())
			}
		}
	}

	fn append_conjunction(
		qb: &mut QueryBuilder<'_, Postgres>,
		dict: &FieldDictionary,
		items: &[Filter],
		joiner: &str,
	) -> DssResult<()> {
		if items.is_empty() {
			// An empty $AND/$OR means "no restriction"; render a tautology
			// rather than invalid SQL.
			qb.push("TRUE");
			return Ok(());
		}
		qb.push("(");
		for (i, item) in items.iter().enumerate() {
			if i > 0 {
				qb.push(joiner);
			}
			item.append_expr(qb, dict)?;
		}
		qb.push(")");
		Ok(())
	}

	fn append_cmp(qb: &mut QueryBuilder<'_, Postgres>, dict: &FieldDictionary, field: &str, value: &Json, op: &str) -> DssResult<()> {
		let spec = dict.resolve(field)?;
		qb.push(spec.column).push(" ").push(op).push(" ");
		bind_coerced(qb, spec.kind, value)
	}
}

fn bind_coerced(qb: &mut QueryBuilder<'_, Postgres>, kind: FieldKind, value: &Json) -> DssResult<()> {
	match kind {
		FieldKind::Text => {
			let s = value.as_str().ok_or_else(|| Error::invalid("expected a string value"))?;
			qb.push_bind(s.to_string());
		}
		FieldKind::Integer => {
			let n = value.as_i64().ok_or_else(|| Error::invalid("expected an integer value"))?;
			qb.push_bind(n);
		}
		FieldKind::Boolean => {
			let b = value.as_bool().ok_or_else(|| Error::invalid("expected a boolean value"))?;
			qb.push_bind(b);
		}
		FieldKind::Json => {
			qb.push_bind(value.clone());
		}
		FieldKind::Array => {
			return Err(Error::Unsupported("array fields do not support scalar comparison".to_string()));
		}
	}
	Ok(())
}
