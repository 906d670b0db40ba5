#![forbid(unsafe_code)]

//! `siphon-proxy`
//!
//! The capture half of the gateway: classifies upstream exchanges once at
//! the HTTP boundary, tees response bodies into the cache while they stream
//! to the client, and runs supervised background fetches for redirect
//! responses.
//!
//! The client-facing contract is "you always get what upstream sent" —
//! every capture failure here is logged and swallowed, never surfaced.

use siphon_net::NetError;
use siphon_store::StoreError;
use thiserror::Error;

mod background;
mod capture;
mod sink;
mod tee;

pub use background::BackgroundFetcher;
pub use capture::{classify, commit_and_etag, Capture, FileSpec, IndexSpec, RouteTarget};
pub use sink::{CaptureSink, CaptureWrite, FileCapture, IndexCapture};
pub use tee::tee;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("network error: {0}")]
    Net(#[from] NetError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CaptureResult<T> = Result<T, CaptureError>;
