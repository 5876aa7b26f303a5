//! Read-only handlers serving thumbnails and public objects from local disk.

use crate::{
    errors::AppError,
    models::stored_object::StoredObject,
    services::object_store::{ObjectAcl, ObjectStoreError},
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

/// `GET /assets/{name}`: a stored thumbnail.
pub async fn get_asset(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
        return Err(AppError::not_found("Asset not found"));
    }

    let path = state.config.assets_root.join(&name);
    let file = File::open(&path)
        .await
        .map_err(|_| AppError::not_found("Asset not found"))?;
    let len = file.metadata().await.map(|m| m.len()).ok();

    let content_type = match name.rsplit_once('.').map(|(_, ext)| ext) {
        Some("jpg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    };

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Some(len) = len {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }
    Ok(response)
}

/// `GET /objects/{bucket}/{*key}`: a public-read object as a streaming response.
pub async fn get_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let (meta, file) = state
        .objects
        .get_object_reader(&bucket, &key)
        .await
        .map_err(object_error)?;
    ensure_public(&meta)?;

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);
    Ok(response)
}

/// `HEAD /objects/{bucket}/{*key}`: same headers as GET but no body.
pub async fn head_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let (meta, _file) = state
        .objects
        .get_object_reader(&bucket, &key)
        .await
        .map_err(object_error)?;
    ensure_public(&meta)?;

    let mut response = Response::new(Body::empty());
    set_object_headers(response.headers_mut(), &meta);
    Ok(response)
}

/// Private objects are indistinguishable from missing ones.
fn ensure_public(meta: &StoredObject) -> Result<(), AppError> {
    if ObjectAcl::parse(&meta.acl) == Some(ObjectAcl::PublicRead) {
        Ok(())
    } else {
        Err(AppError::not_found("Object not found"))
    }
}

fn object_error(err: ObjectStoreError) -> AppError {
    match err {
        ObjectStoreError::NotFound { .. } | ObjectStoreError::InvalidKey(_) => {
            AppError::not_found("Object not found")
        }
        other => {
            tracing::error!(error = %other, "failed to read object");
            AppError::internal("Couldn't read object")
        }
    }
}

fn set_object_headers(headers: &mut HeaderMap, meta: &StoredObject) {
    let content_type = meta
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(meta.size_bytes.max(0)),
    );

    if let Some(etag) = meta.etag.as_ref() {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", etag)) {
            headers.insert(header::ETAG, value);
        }
    }

    if let Ok(value) = HeaderValue::from_str(&meta.last_modified.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}
