//! Payload decoding for typed update handlers.
//!
//! When the `tracing` feature is enabled, fields the target type does not capture are
//! logged as warnings (the firmware tends to grow new status fields), and decode
//! failures report the JSON path that failed.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Decode an update payload, warning about unknown fields.
///
/// Unknown fields never fail decoding; missing or mistyped fields do.
#[cfg(feature = "tracing")]
pub fn deserialize_with_warnings<T: DeserializeOwned>(value: &Value) -> crate::Result<T> {
    use std::any::type_name;

    let mut unknown_paths: Vec<String> = Vec::new();

    let result: T = serde_ignored::deserialize(value, |path| {
        unknown_paths.push(path.to_string());
    })
    .inspect_err(|_| {
        let path_result: Result<T, _> = serde_path_to_error::deserialize(value);
        if let Err(path_err) = path_result {
            let path = path_err.path().to_string();
            tracing::warn!(
                type_name = %type_name::<T>(),
                path = %path,
                value = %format_value(lookup_value(value, &path)),
                error = %path_err.inner(),
                "payload decoding failed"
            );
        }
    })?;

    for path in unknown_paths {
        tracing::warn!(
            type_name = %type_name::<T>(),
            field = %path,
            value = %format_value(lookup_value(value, &path)),
            "unknown field in update payload"
        );
    }

    Ok(result)
}

/// Pass-through decoding when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub fn deserialize_with_warnings<T: DeserializeOwned>(value: &Value) -> crate::Result<T> {
    Ok(serde::Deserialize::deserialize(value)?)
}

/// Resolve a `serde_ignored` / `serde_path_to_error` path (`a.b`, `a[0].b`, `a.?.b`).
#[cfg(any(feature = "tracing", test))]
fn lookup_value<'value>(value: &'value Value, path: &str) -> Option<&'value Value> {
    path.split(['.', '[', ']'])
        .filter(|segment| !segment.is_empty() && *segment != "?")
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?),
            _ => None,
        })
}

#[cfg(any(feature = "tracing", test))]
fn format_value(value: Option<&Value>) -> String {
    value.map_or_else(|| "<unable to retrieve>".to_owned(), Value::to_string)
}
