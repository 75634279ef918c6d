//! Unwrapping of `{Status, Value, ErrorDescription}` response envelopes.
//!
//! Servers wrap call results in a status envelope, but a few endpoints reply
//! with bare values. Anything without a `Status` key is passed through
//! verbatim, so this layer stays compatible with both shapes.

use crate::error::{ApiError, Error, Result};
use serde_json::Value;

const STATUS_SUCCESS: &str = "Success";

/// Reduces a raw response to the caller-visible result.
///
/// A success envelope yields its `Value` field (or `Null` when the field is
/// absent). A failure envelope yields [`Error::Api`] built from its
/// `ErrorDescription` array, with non-string elements rendered as JSON. A
/// failure envelope without a usable description is reported as
/// [`Error::MalformedResponse`].
pub(crate) fn unwrap_response(raw: Value) -> Result<Value> {
    let mut envelope = match raw {
        Value::Object(map) if map.contains_key("Status") => map,
        other => return Ok(other),
    };

    let success = matches!(
        envelope.get("Status"),
        Some(Value::String(status)) if status == STATUS_SUCCESS
    );
    if success {
        return Ok(envelope.remove("Value").unwrap_or(Value::Null));
    }

    match envelope.get("ErrorDescription") {
        Some(Value::Array(items)) if !items.is_empty() => {
            let description = items.iter().cloned().map(stringify).collect();
            Err(ApiError::new(description).into())
        }
        _ => Err(Error::MalformedResponse(format!(
            "failure status without an ErrorDescription array: {}",
            Value::Object(envelope)
        ))),
    }
}

fn stringify(item: Value) -> String {
    match item {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
