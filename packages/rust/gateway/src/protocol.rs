//! Wire types for the completions upstream.
//!
//! Deployments answer in one of two shapes: a completions-style
//! `{"choices": [{"text": ...}]}` or a wrapper's `{"generated_text": ...}`.
//! Both are normalized here, once, into a single string.

use serde::{Deserialize, Serialize};

use artmatch_shared::{ArtMatchError, Result};

/// Request body sent to the upstream.
#[derive(Debug, Serialize)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// One completion in a completions-style answer.
#[derive(Debug, Deserialize)]
pub struct Choice {
    pub text: String,
}

/// The accepted response shapes. `generated_text` wins when both are present.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CompletionResponse {
    Generated { generated_text: String },
    Completions { choices: Vec<Choice> },
}

impl CompletionResponse {
    /// The generated text, trimmed.
    pub fn into_text(self) -> Result<String> {
        let text = match self {
            Self::Generated { generated_text } => generated_text,
            Self::Completions { choices } => choices
                .into_iter()
                .next()
                .map(|choice| choice.text)
                .ok_or_else(|| ArtMatchError::format("response has an empty 'choices' list"))?,
        };
        Ok(text.trim().to_string())
    }
}

/// Decode a raw response body into the generated text.
pub fn parse_completion(body: &str) -> Result<String> {
    let response: CompletionResponse = serde_json::from_str(body).map_err(|_| {
        ArtMatchError::format(format!(
            "response has neither 'generated_text' nor 'choices': {}",
            excerpt(body, 200)
        ))
    })?;
    response.into_text()
}

/// First `max_chars` characters of `text`, on a char boundary.
pub fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_all_fields() {
        let req = CompletionRequest {
            model: "llama2",
            prompt: "hi",
            temperature: 0.5,
            max_tokens: 128,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "llama2");
        assert_eq!(json["prompt"], "hi");
        assert_eq!(json["temperature"], 0.5);
        assert_eq!(json["max_tokens"], 128);
    }

    #[test]
    fn parses_completions_shape() {
        let body = r#"{"id":"cmpl-1","object":"text_completion","choices":[{"text":"  {\"a\": 1}\n","index":0}]}"#;
        assert_eq!(parse_completion(body).unwrap(), r#"{"a": 1}"#);
    }

    #[test]
    fn parses_generated_text_shape() {
        let body = r#"{"generated_text":"hello"}"#;
        assert_eq!(parse_completion(body).unwrap(), "hello");
    }

    #[test]
    fn generated_text_preferred_over_choices() {
        let body = r#"{"generated_text":"wrapper","choices":[{"text":"inner"}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "wrapper");
    }

    #[test]
    fn empty_choices_is_format_error() {
        let err = parse_completion(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, ArtMatchError::Format { .. }));
    }

    #[test]
    fn unknown_shape_is_format_error() {
        let err = parse_completion(r#"{"output":"x"}"#).unwrap_err();
        assert!(err.to_string().contains("neither"));
        let err = parse_completion("not json").unwrap_err();
        assert!(matches!(err, ArtMatchError::Format { .. }));
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        assert_eq!(excerpt("héllo", 2), "hé");
        assert_eq!(excerpt("abc", 10), "abc");
    }
}
