//! Structured-payload extraction from model output.
//!
//! Models often wrap the requested JSON object in narrative text. We locate
//! the first balanced `{ ... }` span (ignoring braces inside JSON strings)
//! and decode that substring strictly. Any failure is a typed
//! [`ArtMatchError::Format`]; callers decide how to degrade.

use serde::de::DeserializeOwned;

use artmatch_shared::{ArtMatchError, Result};

/// Return the first balanced `{ ... }` span of `text`.
pub fn extract_json_object(text: &str) -> Result<&str> {
    let start = text
        .find('{')
        .ok_or_else(|| ArtMatchError::format("model response contains no '{'"))?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    Err(ArtMatchError::format("model response has unbalanced braces"))
}

/// Extract the first JSON object from `text` and decode it into `T`.
pub fn decode_object<T: DeserializeOwned>(text: &str) -> Result<T> {
    let span = extract_json_object(text)?;
    serde_json::from_str(span)
        .map_err(|e| ArtMatchError::format(format!("invalid JSON object in model response: {e}")))
}
