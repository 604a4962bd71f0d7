//! Axum middleware that rewraps raw 400/422 rejection bodies (from
//! `axum::Json<T>` extractors over `deny_unknown_fields` DTOs) into the
//! `{success, data, error}` envelope, grounded on the teacher's
//! `api/src/middleware_layer/json_extractor.rs`.

use axum::body::{Body, Bytes};
use axum::http::{HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;

use crate::response::{ApiErrorDetail, ApiResponse};

async fn take_body(res: Response) -> (axum::http::response::Parts, Bytes) {
    let (parts, body) = res.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
    (parts, bytes)
}

fn guess_path_from_serde_msg(msg: &str) -> Option<String> {
    for key in ["kind", "action", "project_id", "iid", "note_id", "oldrev"] {
        if msg.contains(key) {
            return Some(key.to_string());
        }
    }
    None
}

fn ensure_request_id(parts: &mut axum::http::response::Parts) -> String {
    if let Some(h) = parts.headers.get("X-Request-Id") {
        if let Ok(v) = h.to_str() {
            if !v.trim().is_empty() {
                return v.to_string();
            }
        }
    }
    let nanos = Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_else(|| Utc::now().timestamp_micros() * 1000);
    let id = format!("req-{nanos}");
    parts.headers.insert("X-Request-Id", HeaderValue::from_str(&id).unwrap());
    id
}

pub async fn json_error_mapper(req: Request<Body>, next: Next) -> Response {
    let res = next.run(req).await;
    let status = res.status();

    if !(status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY) {
        return res;
    }

    let (mut parts, bytes) = take_body(res).await;

    // `AppError`'s own `IntoResponse` already produces the envelope (e.g.
    // `webhook_handler`'s `AppError::BadRequest` on a parse failure) — only
    // rewrap bodies that didn't go through it, like a bare axum extractor
    // rejection.
    if bytes.starts_with(b"{\"success\"") {
        return Response::from_parts(parts, bytes.into());
    }

    let original = String::from_utf8_lossy(&bytes);
    let _req_id = ensure_request_id(&mut parts);

    let detail = ApiErrorDetail {
        path: guess_path_from_serde_msg(&original),
        hint: if original.contains("unknown field") {
            Some("Unknown field in the request body; this endpoint rejects fields it does not recognize.".into())
        } else if original.contains("missing field") {
            Some("A required field is missing from the request body.".into())
        } else {
            None
        },
    };

    let envelope = ApiResponse::<()>::error(
        if status == StatusCode::BAD_REQUEST { "BAD_REQUEST" } else { "UNPROCESSABLE_ENTITY" },
        original.trim(),
        vec![detail],
    );

    let body = match serde_json::to_vec(&envelope) {
        Ok(v) => v,
        Err(_) => bytes.to_vec(),
    };

    parts.headers.insert(axum::http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Response::from_parts(parts, body.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guess_path_finds_a_known_field_name() {
        assert_eq!(guess_path_from_serde_msg("unknown field `oldrev`"), Some("oldrev".to_string()));
        assert_eq!(guess_path_from_serde_msg("totally unrelated message"), None);
    }

    #[test]
    fn already_enveloped_body_is_not_rewrapped() {
        let body = br#"{"success":false,"error":{"code":"BAD_REQUEST","message":"x","details":[]}}"#;
        assert!(body.starts_with(b"{\"success\""));
    }
}
