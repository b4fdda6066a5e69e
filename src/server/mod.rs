//! HTTP server for Rally

pub mod http;

pub use http::{run, AppState, Backends, BoxBody};
