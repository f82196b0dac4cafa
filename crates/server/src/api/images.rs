//! Media serving with content negotiation.
//!
//! `GET /media/{path}` serves the best representation of an original the
//! client accepts: an existing artifact, an on-demand conversion, or the
//! original itself as fallback.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::warn;

use optipress_core::{negotiate, ConversionMode, ImageFormat, SinkEvent, SourceKind};

use crate::metrics::{IMAGES_SERVED_TOTAL, NOT_MODIFIED_TOTAL};
use crate::state::AppState;

const CACHE_CONTROL_VALUE: &str = "public, max-age=31536000, immutable";

pub async fn serve_image(
    State(state): State<Arc<AppState>>,
    Path(raw_path): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(subject) = sanitize(&raw_path) else {
        return StatusCode::FORBIDDEN.into_response();
    };
    if !allowed_extension(&subject) {
        return StatusCode::FORBIDDEN.into_response();
    }

    let original = state.library().resolve(&subject);
    match tokio::fs::metadata(&original).await {
        Ok(meta) if meta.is_file() => {}
        _ => return StatusCode::NOT_FOUND.into_response(),
    }

    let source_kind = original
        .extension()
        .and_then(|e| e.to_str())
        .and_then(SourceKind::from_extension);

    let conversion = &state.config().conversion;
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let negotiated = if source_kind.is_some() && conversion.enabled {
        negotiate::select_format(accept, &conversion.enabled_formats())
    } else {
        None
    };

    if let Some(format) = negotiated {
        let artifacts = state.optimizer().artifacts();
        if artifacts.artifact_exists(&original, format).await {
            let artifact = artifacts.artifact_path(&original, format);
            IMAGES_SERVED_TOTAL
                .with_label_values(&[format.extension(), "artifact"])
                .inc();
            return serve_file(&artifact, format.mime_type(), &headers).await;
        }

        if conversion.mode != ConversionMode::CliOnly {
            match state.optimizer().convert_on_demand(&original, format).await {
                Ok(artifact) => {
                    IMAGES_SERVED_TOTAL
                        .with_label_values(&[format.extension(), "on_demand"])
                        .inc();
                    return serve_file(&artifact, format.mime_type(), &headers).await;
                }
                Err(e) => {
                    warn!("On-demand conversion of {} failed: {}", subject, e);
                    state
                        .events()
                        .emit(SinkEvent::ServeFallback {
                            subject: subject.clone(),
                            error: e.to_string(),
                        })
                        .await;
                    IMAGES_SERVED_TOTAL
                        .with_label_values(&[format.extension(), "fallback"])
                        .inc();
                    return serve_file(&original, original_mime(&original, source_kind), &headers)
                        .await;
                }
            }
        }
    }

    IMAGES_SERVED_TOTAL
        .with_label_values(&["none", "original"])
        .inc();
    serve_file(&original, original_mime(&original, source_kind), &headers).await
}

fn original_mime(path: &std::path::Path, source_kind: Option<SourceKind>) -> &'static str {
    if let Some(kind) = source_kind {
        return kind.mime_type();
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => ImageFormat::parse(ext)
            .map(|f| f.mime_type())
            .unwrap_or("application/octet-stream"),
        None => "application/octet-stream",
    }
}

/// Only image originals and their conversion artifacts may be served.
fn allowed_extension(subject: &str) -> bool {
    match std::path::Path::new(subject)
        .extension()
        .and_then(|e| e.to_str())
    {
        Some(ext) => SourceKind::from_extension(ext).is_some() || ImageFormat::parse(ext).is_some(),
        None => false,
    }
}

/// Rejects traversal attempts; returns the cleaned root-relative subject.
fn sanitize(raw: &str) -> Option<String> {
    if raw.contains('\\') || raw.contains('\0') {
        return None;
    }
    let mut clean = Vec::new();
    for component in raw.split('/') {
        match component {
            "" | "." => continue,
            ".." => return None,
            component => clean.push(component),
        }
    }
    if clean.is_empty() {
        return None;
    }
    Some(clean.join("/"))
}

async fn serve_file(path: &std::path::Path, mime: &'static str, headers: &HeaderMap) -> Response {
    let meta = match tokio::fs::metadata(path).await {
        Ok(meta) => meta,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };
    let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    let etag = compute_etag(path, mtime, meta.len());
    let last_modified = format_http_date(mtime);

    if let Some(if_none_match) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    {
        if etag_matches(if_none_match, &etag) {
            NOT_MODIFIED_TOTAL.with_label_values(&["etag"]).inc();
            return not_modified(&etag, &last_modified);
        }
    } else if let Some(if_modified_since) = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
    {
        if let Ok(since) = DateTime::parse_from_rfc2822(if_modified_since) {
            let mtime_utc: DateTime<Utc> = mtime.into();
            if mtime_utc.timestamp() <= since.timestamp() {
                NOT_MODIFIED_TOTAL
                    .with_label_values(&["last_modified"])
                    .inc();
                return not_modified(&etag, &last_modified);
            }
        }
    }

    let body = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };

    let mut response = Response::new(Body::from(body));
    let response_headers = response.headers_mut();
    response_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(mime));
    insert_cache_headers(response_headers, &etag, &last_modified);
    response
}

fn not_modified(etag: &str, last_modified: &str) -> Response {
    let mut response = StatusCode::NOT_MODIFIED.into_response();
    insert_cache_headers(response.headers_mut(), etag, last_modified);
    response
}

fn insert_cache_headers(headers: &mut HeaderMap, etag: &str, last_modified: &str) {
    if let Ok(value) = HeaderValue::from_str(etag) {
        headers.insert(header::ETAG, value);
    }
    if let Ok(value) = HeaderValue::from_str(last_modified) {
        headers.insert(header::LAST_MODIFIED, value);
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(CACHE_CONTROL_VALUE),
    );
    headers.insert(header::VARY, HeaderValue::from_static("Accept"));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
}

fn compute_etag(path: &std::path::Path, mtime: SystemTime, size: u64) -> String {
    let mtime_secs = mtime
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let digest = Sha256::digest(format!("{}|{}|{}", path.display(), mtime_secs, size).as_bytes());
    format!("\"{:x}\"", digest)
}

fn format_http_date(time: SystemTime) -> String {
    let time: DateTime<Utc> = time.into();
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    if_none_match.split(',').any(|candidate| {
        let candidate = candidate.trim();
        let candidate = candidate.strip_prefix("W/").unwrap_or(candidate);
        candidate == "*" || candidate == etag
    })
}
