#![forbid(unsafe_code)]

//! `siphon-net`
//!
//! Outbound HTTP plumbing for the siphon gateway: a pass-through client that
//! preserves redirect responses for the caller, a redirect-following
//! download client for background captures, and explicit connection tuning.

mod client;
mod error;
mod options;

pub use client::{byte_stream, header_str, strip_hop_by_hop, ByteStream, HubClient};
pub use error::{NetError, NetResult};
pub use options::NetOptions;
