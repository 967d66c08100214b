// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Dot-path field access over item values.
//!
//! A dot path addresses a nested field: `a.b.2.c` resolves `a` as an object
//! key, `2` as an array index (object keys win when the container is an
//! object), and so on. The path `_` addresses the whole item. These utilities
//! are the contract third-party segments may assume.

use crate::error::Error;
use crate::message::Value;

/// The dot path addressing the whole item.
pub const WHOLE_ITEM: &str = "_";

fn step<'a>(value: &'a Value, part: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(part),
        Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Resolves `path` against `value`, failing with [`Error::FieldMissing`] when
/// any step does not resolve.
pub fn extract<'a>(value: &'a Value, path: &str) -> Result<&'a Value, Error> {
    if path == WHOLE_ITEM {
        return Ok(value);
    }

    let mut current = value;
    for part in path.split('.') {
        current = step(current, part).ok_or_else(|| Error::FieldMissing {
            path: path.to_owned(),
        })?;
    }
    Ok(current)
}

/// Resolves `path` against `value`, returning `default` instead of failing.
#[must_use]
pub fn extract_or<'a>(value: &'a Value, path: &str, default: &'a Value) -> &'a Value {
    extract(value, path).unwrap_or(default)
}

/// Assigns `new` at `path` inside `value`, creating intermediate objects as
/// needed.
///
/// The final step must land in a container: an object key (created if
/// absent) or an array index no greater than the array's length. Assigning
/// with path `_` replaces the whole value.
pub fn assign(value: &mut Value, path: &str, new: Value) -> Result<(), Error> {
    if path == WHOLE_ITEM {
        *value = new;
        return Ok(());
    }

    let parts: Vec<&str> = path.split('.').collect();
    let mut current = value;

    for part in &parts[..parts.len() - 1] {
        // Intermediate objects materialize on demand; anything else must
        // already be a container.
        if let Value::Object(map) = current {
            current = map
                .entry((*part).to_owned())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
        } else if let Value::Array(items) = current {
            let index = part.parse::<usize>().map_err(|_| Error::PathNotAddressable {
                path: path.to_owned(),
                step: (*part).to_owned(),
            })?;
            current = items.get_mut(index).ok_or_else(|| Error::PathNotAddressable {
                path: path.to_owned(),
                step: (*part).to_owned(),
            })?;
        } else {
            return Err(Error::PathNotAddressable {
                path: path.to_owned(),
                step: (*part).to_owned(),
            });
        }
    }

    let last = parts[parts.len() - 1];
    match current {
        Value::Object(map) => {
            let _ = map.insert(last.to_owned(), new);
            Ok(())
        }
        Value::Array(items) => {
            let index = last.parse::<usize>().map_err(|_| Error::PathNotAddressable {
                path: path.to_owned(),
                step: last.to_owned(),
            })?;
            if index < items.len() {
                items[index] = new;
                Ok(())
            } else if index == items.len() {
                items.push(new);
                Ok(())
            } else {
                Err(Error::PathNotAddressable {
                    path: path.to_owned(),
                    step: last.to_owned(),
                })
            }
        }
        _ => Err(Error::PathNotAddressable {
            path: path.to_owned(),
            step: last.to_owned(),
        }),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Formats an item against a field spec: a comma-separated list of
/// `source:label` pairs, rendered as `label: value` and joined with a single
/// space. A pair without a label uses the path itself; the source `_` means
/// the whole item.
pub fn format_item(value: &Value, field_spec: &str) -> Result<String, Error> {
    let mut rendered = Vec::new();

    for pair in field_spec.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }

        let (source, label) = match pair.split_once(':') {
            Some((source, label)) => (source.trim(), label.trim()),
            None => (pair, pair),
        };

        let field = extract(value, source)?;
        rendered.push(format!("{label}: {}", render(field)));
    }

    Ok(rendered.join(" "))
}
