#![forbid(unsafe_code)]

//! Shared test utilities for the siphon workspace.

pub mod http_server;

pub use http_server::TestHttpServer;
