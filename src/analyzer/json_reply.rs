//! Lenient decoding of model replies that should contain a JSON object

use serde_json::Value;

use crate::errors::{BackendError, BackendResult};

/// Decode a reply into a JSON object.
///
/// Models sometimes wrap the object in a markdown fence or surround it
/// with prose; both are tolerated. Anything that still does not yield an
/// object is an error.
pub fn parse_json_reply(reply: &str) -> BackendResult<Value> {
    let text = strip_code_fence(reply.trim());

    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(text) {
        return Ok(value);
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}'))
        && start < end
        && let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&text[start..=end])
    {
        return Ok(value);
    }

    let preview: String = text.chars().take(120).collect();
    Err(BackendError::invalid_response(format!(
        "reply is not a JSON object: {preview}"
    )))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
