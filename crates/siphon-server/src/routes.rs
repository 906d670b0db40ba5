use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use siphon_core::ModelId;
use siphon_net::byte_stream;
use siphon_proxy::{classify, tee, Capture, RouteTarget};
use siphon_store::{Distribution, EntryPath, ModelIndexInfo};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::config::RefreshPolicy;
use crate::error::AppError;
use crate::state::AppState;

/// Liveness only; says nothing about cache state.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// `GET /api/models/{owner}/{name}/info/{version}` — served from the local
/// facade, never proxied.
pub async fn model_info(
    State(state): State<AppState>,
    Path((owner, name, version)): Path<(String, String, String)>,
) -> Result<Json<ModelIndexInfo>, AppError> {
    let model = ModelId::from_parts(&owner, &name)?;
    let info = state.distribution.repo_info(&model, &version)?;
    Ok(Json(info))
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    path: Option<String>,
}

/// `PUT /api/models/{owner}/{name}?path={filename}` — direct upload
/// bypassing proxy capture.
pub async fn upload_file(
    State(state): State<AppState>,
    Path((owner, name)): Path<(String, String)>,
    Query(params): Query<UploadParams>,
    body: bytes::Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let model = ModelId::from_parts(&owner, &name)?;
    let filename = params
        .path
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::BadRequest("missing path parameter".to_string()))?;

    let stored = state
        .distribution
        .store_file(&model, &filename, &mut body.as_ref())?;
    Ok(Json(serde_json::json!({"path": stored.to_string_lossy()})))
}

/// `GET /api/models/{owner}/{name}/revision/{version}` — fetch/refresh the
/// model index through the upstream, capturing the response.
pub async fn model_index(
    State(state): State<AppState>,
    uri: Uri,
    Path((owner, name, version)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let model = ModelId::from_parts(&owner, &name)?;

    if state.config.refresh_policy == RefreshPolicy::IfMissing {
        let index_path = state.sink.store().layout().index_path(&model);
        match std::fs::read(&index_path) {
            Ok(doc) => {
                debug!(model = %model, "serving persisted model index");
                return Response::builder()
                    .status(StatusCode::OK)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(doc))
                    .map_err(|e| AppError::Internal(e.to_string()));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(AppError::Internal(e.to_string())),
        }
    }

    let resp = state
        .client
        .forward(Method::GET, path_and_query(&uri), &headers)
        .await?;
    let status = resp.status();
    let resp_headers = resp.headers().clone();

    let target = RouteTarget::Index {
        model,
        revision: version,
    };
    let capture = classify(&target, &Method::GET, status, &resp_headers);

    let body = match capture {
        Some(Capture::Index(spec)) => match state.sink.begin_index(&spec).await {
            Ok(capture) => Body::from_stream(tee(byte_stream(resp), capture)),
            Err(e) => {
                warn!(error = %e, "index capture setup failed, passing through");
                Body::from_stream(byte_stream(resp))
            }
        },
        _ => Body::from_stream(byte_stream(resp)),
    };

    Ok(passthrough_response(status, &resp_headers, body))
}

/// `GET|HEAD /{owner}/{name}/resolve/{sha}/{filename}` — serve from the
/// cache when the snapshot entry exists, otherwise fall back to proxying
/// the upstream and capturing the response.
pub async fn resolve_file(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    Path((owner, name, sha_or_revision, filename)): Path<(String, String, String, String)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let model = ModelId::from_parts(&owner, &name)?;
    let entry = EntryPath::new(&filename).map_err(AppError::from)?;

    let sha = state.distribution.repo_sha(&model, &sha_or_revision);
    if let Some(stat) = state.distribution.file_exists(&model, &sha, &filename)? {
        debug!(model = %model, sha = %sha, file = %filename, "cache hit");
        let etag = state.distribution.file_etag(&model, &sha, &filename);
        return cached_file_response(&state, &model, &sha, &filename, stat.size, etag, &method);
    }

    if !state.config.fallback_proxy {
        return Err(AppError::NotFound(format!("{model}/{filename}")));
    }

    debug!(model = %model, file = %filename, "cache miss, proxying upstream");
    let resp = state
        .client
        .forward(method.clone(), path_and_query(&uri), &headers)
        .await?;
    let status = resp.status();
    let resp_headers = resp.headers().clone();

    let target = RouteTarget::File {
        model,
        sha_or_revision,
        entry,
    };

    let body = match classify(&target, &method, status, &resp_headers) {
        Some(Capture::Redirect { spec, location }) => {
            state.fetcher.spawn(spec, location);
            Body::from_stream(byte_stream(resp))
        }
        Some(Capture::File(spec)) if method == Method::GET => {
            match state.sink.begin_file(&spec).await {
                Ok(capture) => Body::from_stream(tee(byte_stream(resp), capture)),
                Err(e) => {
                    warn!(error = %e, "file capture setup failed, passing through");
                    Body::from_stream(byte_stream(resp))
                }
            }
        }
        _ => Body::from_stream(byte_stream(resp)),
    };

    Ok(passthrough_response(status, &resp_headers, body))
}

/// Response for a snapshot entry served from the local cache.
fn cached_file_response(
    state: &AppState,
    model: &ModelId,
    sha: &str,
    filename: &str,
    size: u64,
    etag: Option<String>,
    method: &Method,
) -> Result<Response, AppError> {
    let file_name = filename.rsplit('/').next().unwrap_or(filename);
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header("x-repo-commit", header_value(sha)?)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, size)
        .header(
            header::CONTENT_DISPOSITION,
            header_value(&format!("inline; filename=\"{file_name}\""))?,
        );
    if let Some(etag) = etag {
        builder = builder.header(header::ETAG, header_value(&etag)?);
    }

    if method == Method::HEAD {
        return builder
            .body(Body::empty())
            .map_err(|e| AppError::Internal(e.to_string()));
    }

    let file = state.distribution.get_file(model, sha, filename)?;
    let stream = ReaderStream::new(tokio::fs::File::from_std(file));
    builder
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// Relay an upstream response: status and headers pass through with
/// hop-by-hop headers stripped, body as provided.
fn passthrough_response(status: StatusCode, headers: &HeaderMap, body: Body) -> Response {
    let mut resp = Response::new(body);
    *resp.status_mut() = status;
    *resp.headers_mut() = siphon_net::strip_hop_by_hop(headers);
    resp
}

fn path_and_query(uri: &Uri) -> &str {
    uri.path_and_query().map_or(uri.path(), |pq| pq.as_str())
}

fn header_value(s: &str) -> Result<HeaderValue, AppError> {
    HeaderValue::from_str(s).map_err(|e| AppError::Internal(format!("invalid header value: {e}")))
}

/// 404 for anything outside the hub-compatible URL shapes.
pub async fn fallback_not_found() -> impl IntoResponse {
    AppError::NotFound("no such route".to_string())
}
