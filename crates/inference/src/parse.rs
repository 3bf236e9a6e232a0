//! Tolerant response decoding.
//!
//! Providers disagree on shapes and sometimes answer with plain text.
//! Anything unrecognised is kept in `provider_metadata.raw` rather than
//! failing the call.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use talewright_core::{HttpResponse, InferenceError};
use tracing::warn;

use crate::types::{AudioResponse, ImageResponse, MediaResponse, TextResponse};

/// Non-2xx becomes [`InferenceError::HttpFailure`] with the body verbatim.
pub fn ensure_success(provider: &str, response: &HttpResponse) -> Result<(), InferenceError> {
    if response.is_success() {
        return Ok(());
    }
    Err(InferenceError::HttpFailure {
        provider: provider.into(),
        status: response.status,
        payload: response.text(),
    })
}

/// Hugging Face text: `[{"generated_text": ..}]`, `{"generated_text": ..}`,
/// `{"text": ..}`, a bare string, or plain text.
pub fn hf_text(response: &HttpResponse) -> TextResponse {
    let raw = response.text();
    let Ok(document) = serde_json::from_str::<Value>(&raw) else {
        return TextResponse {
            text: raw,
            tokens_used: None,
            provider_metadata: json!({}),
        };
    };

    let text = match &document {
        Value::Array(items) => items.iter().find_map(text_field),
        other => text_field(other),
    };
    TextResponse {
        text: text.unwrap_or_default(),
        tokens_used: None,
        provider_metadata: json!({ "raw": document }),
    }
}

fn text_field(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("generated_text")
            .or_else(|| map.get("text"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

pub fn openai_text(response: &HttpResponse) -> TextResponse {
    let raw = response.text();
    let Ok(document) = serde_json::from_str::<Value>(&raw) else {
        return TextResponse {
            text: raw,
            tokens_used: None,
            provider_metadata: json!({}),
        };
    };

    let text = document
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let tokens_used = document
        .pointer("/usage/total_tokens")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok());
    TextResponse {
        text,
        tokens_used,
        provider_metadata: json!({
            "id": document.get("id").cloned().unwrap_or(Value::Null),
            "model": document.get("model").cloned().unwrap_or(Value::Null),
        }),
    }
}

pub fn ollama_text(response: &HttpResponse) -> TextResponse {
    let raw = response.text();
    let Ok(document) = serde_json::from_str::<Value>(&raw) else {
        return TextResponse {
            text: raw,
            tokens_used: None,
            provider_metadata: json!({}),
        };
    };

    let text = document
        .get("response")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let count = |key: &str| document.get(key).and_then(Value::as_u64);
    let tokens_used = match (count("prompt_eval_count"), count("eval_count")) {
        (None, None) => None,
        (prompt, eval) => u32::try_from(prompt.unwrap_or(0) + eval.unwrap_or(0)).ok(),
    };
    TextResponse {
        text,
        tokens_used,
        provider_metadata: json!({
            "model": document.get("model").cloned().unwrap_or(Value::Null),
            "done": document.get("done").cloned().unwrap_or(Value::Null),
        }),
    }
}

/// Binary payload or JSON pointing at one.
struct Payload {
    bytes: Option<Vec<u8>>,
    uri: Option<String>,
    metadata: Value,
}

fn binary_or_json(response: &HttpResponse, binary_prefix: &[&str]) -> Payload {
    let content_type = response.content_type().unwrap_or_default();
    if binary_prefix.iter().any(|p| content_type.starts_with(p)) {
        return Payload {
            bytes: Some(response.body.clone()),
            uri: None,
            metadata: json!({ "content_type": content_type }),
        };
    }

    let Ok(document) = serde_json::from_slice::<Value>(&response.body) else {
        return Payload {
            bytes: None,
            uri: None,
            metadata: json!({ "raw": response.text() }),
        };
    };

    let encoded = ["/bytes_base64", "/b64_json", "/data/0/b64_json", "/audio_base64"]
        .iter()
        .find_map(|p| document.pointer(p).and_then(Value::as_str));
    let bytes = encoded.and_then(|data| match STANDARD.decode(data.trim()) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!(error = %e, "Provider returned invalid base64 payload");
            None
        }
    });
    let uri = ["/uri", "/url", "/data/0/url"]
        .iter()
        .find_map(|p| document.pointer(p).and_then(Value::as_str))
        .map(str::to_string);

    Payload {
        bytes,
        uri,
        metadata: json!({ "raw": document }),
    }
}

pub fn image(response: &HttpResponse) -> ImageResponse {
    let payload = binary_or_json(response, &["image/"]);
    ImageResponse {
        bytes: payload.bytes,
        uri: payload.uri,
        provider_metadata: payload.metadata,
    }
}

pub fn speech(response: &HttpResponse) -> AudioResponse {
    let payload = binary_or_json(response, &["audio/", "application/octet-stream"]);
    AudioResponse {
        audio_bytes: payload.bytes,
        transcript: None,
        provider_metadata: payload.metadata,
    }
}

/// `{"text": ..}`, `[{"text": ..}]` or plain text.
pub fn transcript(response: &HttpResponse) -> AudioResponse {
    let raw = response.text();
    let (transcript, metadata) = match serde_json::from_str::<Value>(&raw) {
        Ok(document) => {
            let text = match &document {
                Value::Array(items) => items.iter().find_map(text_field),
                other => text_field(other),
            };
            (text, json!({ "raw": document }))
        }
        Err(_) => (Some(raw), json!({})),
    };
    AudioResponse {
        audio_bytes: None,
        transcript,
        provider_metadata: metadata,
    }
}

pub fn media(response: &HttpResponse) -> MediaResponse {
    let payload = binary_or_json(response, &["video/", "audio/", "application/octet-stream"]);
    MediaResponse {
        bytes: payload.bytes,
        uri: payload.uri,
        provider_metadata: payload.metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_success_keeps_payload_verbatim() {
        let response = HttpResponse::new(400, r#"{"error":"bad input"}"#);
        match ensure_success("huggingface", &response) {
            Err(InferenceError::HttpFailure { provider, status, payload }) => {
                assert_eq!(provider, "huggingface");
                assert_eq!(status, 400);
                assert_eq!(payload, r#"{"error":"bad input"}"#);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(ensure_success("x", &HttpResponse::new(204, "")).is_ok());
    }

    #[test]
    fn hf_text_shapes() {
        let array = hf_text(&HttpResponse::new(200, r#"[{"generated_text":"a"}]"#));
        assert_eq!(array.text, "a");
        assert_eq!(array.provider_metadata["raw"][0]["generated_text"], "a");

        assert_eq!(hf_text(&HttpResponse::new(200, r#"{"text":"b"}"#)).text, "b");
        assert_eq!(hf_text(&HttpResponse::new(200, r#""c""#)).text, "c");
        assert_eq!(hf_text(&HttpResponse::new(200, "plain words")).text, "plain words");
        assert_eq!(hf_text(&HttpResponse::new(200, "[]")).text, "");
    }

    #[test]
    fn openai_text_reads_choice_and_usage() {
        let body = r#"{"id":"c1","model":"gpt-4o","choices":[{"message":{"content":"hi"}}],"usage":{"total_tokens":12}}"#;
        let response = openai_text(&HttpResponse::new(200, body));
        assert_eq!(response.text, "hi");
        assert_eq!(response.tokens_used, Some(12));
        assert_eq!(response.provider_metadata["id"], "c1");
    }

    #[test]
    fn ollama_text_sums_counts() {
        let body = r#"{"model":"llama3","response":"ok","done":true,"prompt_eval_count":5,"eval_count":7}"#;
        let response = ollama_text(&HttpResponse::new(200, body));
        assert_eq!(response.text, "ok");
        assert_eq!(response.tokens_used, Some(12));
    }

    #[test]
    fn image_bytes_base64_and_uri() {
        let raw = image(&HttpResponse::new(200, vec![0x89, b'P', b'N', b'G']).with_header("Content-Type", "image/png"));
        assert_eq!(raw.bytes.as_deref(), Some(&[0x89, b'P', b'N', b'G'][..]));

        let encoded = image(&HttpResponse::new(200, r#"{"bytes_base64":"aGVsbG8="}"#));
        assert_eq!(encoded.bytes.as_deref(), Some(&b"hello"[..]));

        let openai = image(&HttpResponse::new(200, r#"{"data":[{"url":"https://img/1.png"}]}"#));
        assert_eq!(openai.uri.as_deref(), Some("https://img/1.png"));
        assert!(openai.bytes.is_none());

        let unknown = image(&HttpResponse::new(200, "???"));
        assert!(unknown.bytes.is_none() && unknown.uri.is_none());
        assert_eq!(unknown.provider_metadata["raw"], "???");
    }

    #[test]
    fn transcripts_and_speech() {
        assert_eq!(
            transcript(&HttpResponse::new(200, r#"{"text":"hello there"}"#)).transcript.as_deref(),
            Some("hello there")
        );
        assert_eq!(transcript(&HttpResponse::new(200, "raw words")).transcript.as_deref(), Some("raw words"));

        let audio = speech(&HttpResponse::new(200, vec![1, 2, 3]).with_header("content-type", "audio/mpeg"));
        assert_eq!(audio.audio_bytes, Some(vec![1, 2, 3]));
    }

    #[test]
    fn media_accepts_video_bytes() {
        let video = media(&HttpResponse::new(200, vec![9, 9]).with_header("Content-Type", "video/mp4"));
        assert_eq!(video.bytes, Some(vec![9, 9]));
    }
}
