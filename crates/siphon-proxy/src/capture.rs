use reqwest::header::{HeaderMap, LOCATION};
use reqwest::{Method, StatusCode};
use siphon_core::ModelId;
use siphon_net::header_str;
use siphon_store::EntryPath;
use tracing::warn;
use url::Url;

/// What the inbound route was asking for, before the upstream answered.
#[derive(Clone, Debug)]
pub enum RouteTarget {
    /// `/api/models/{model}/revision/{version}` — an index fetch.
    Index { model: ModelId, revision: String },
    /// `/{model}/resolve/{sha}/{filename}` — a file fetch.
    File {
        model: ModelId,
        sha_or_revision: String,
        entry: EntryPath,
    },
}

/// Capture plan for an index response.
#[derive(Clone, Debug)]
pub struct IndexSpec {
    pub model: ModelId,
    pub revision: String,
    /// Content-set id from `x-repo-commit`, when the upstream sent one.
    pub sha: Option<String>,
}

/// Capture plan for file content.
#[derive(Clone, Debug)]
pub struct FileSpec {
    pub model: ModelId,
    pub sha: String,
    pub entry: EntryPath,
    pub etag: String,
}

/// How an upstream response gets captured, decided exactly once at the
/// boundary and then dispatched structurally.
#[derive(Clone, Debug)]
pub enum Capture {
    /// Persist the body verbatim as the model index and record the ref.
    Index(IndexSpec),
    /// Tee the body into the blob store and snapshot index.
    File(FileSpec),
    /// Fetch `location` out of band and persist it as a snapshot entry.
    Redirect { spec: FileSpec, location: Url },
}

/// Extract the content-set id and content id from upstream response headers.
///
/// The etag comes from `x-linked-etag`, falling back to `etag`, with
/// surrounding quotes stripped.
pub fn commit_and_etag(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let commit = header_str(headers, "x-repo-commit")
        .map(str::to_string)
        .filter(|s| !s.is_empty());
    let etag = header_str(headers, "x-linked-etag")
        .filter(|s| !s.is_empty())
        .or_else(|| header_str(headers, "etag"))
        .map(|s| s.replace('"', ""))
        .filter(|s| !s.is_empty());
    (commit, etag)
}

/// Decide how (and whether) to capture an upstream response.
///
/// Returns `None` when nothing should be cached: error statuses, redirects
/// on plain GETs, or responses missing the identifying headers. The
/// pass-through to the client is unaffected either way.
pub fn classify(
    target: &RouteTarget,
    method: &Method,
    status: StatusCode,
    headers: &HeaderMap,
) -> Option<Capture> {
    let (commit, etag) = commit_and_etag(headers);

    if let RouteTarget::File {
        model,
        sha_or_revision,
        entry,
    } = target
    {
        // Upstream's pattern for "here is where the actual bytes live".
        if method == Method::HEAD {
            if let Some(location) = header_str(headers, LOCATION.as_str()) {
                let Some(etag) = etag else {
                    warn!(model = %model, file = %entry.as_str(), "redirect without etag header, skipping capture");
                    return None;
                };
                let location = match Url::parse(location) {
                    Ok(url) => url,
                    Err(e) => {
                        warn!(location, error = %e, "unparseable redirect location, skipping capture");
                        return None;
                    }
                };
                return Some(Capture::Redirect {
                    spec: FileSpec {
                        model: model.clone(),
                        sha: commit.unwrap_or_else(|| sha_or_revision.clone()),
                        entry: entry.clone(),
                        etag,
                    },
                    location,
                });
            }
        }

        if !status.is_success() {
            return None;
        }
        let Some(etag) = etag else {
            warn!(model = %model, file = %entry.as_str(), "file response without etag header, skipping capture");
            return None;
        };
        return Some(Capture::File(FileSpec {
            model: model.clone(),
            sha: commit.unwrap_or_else(|| sha_or_revision.clone()),
            entry: entry.clone(),
            etag,
        }));
    }

    let RouteTarget::Index { model, revision } = target else {
        return None;
    };
    if !status.is_success() {
        return None;
    }
    Some(Capture::Index(IndexSpec {
        model: model.clone(),
        revision: revision.clone(),
        sha: commit,
    }))
}
