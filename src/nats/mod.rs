//! NATS messaging for evidence validation requests

pub mod client;

pub use client::NatsClient;
