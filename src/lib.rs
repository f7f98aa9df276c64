//! Imagegate - on-demand image transformation gateway
//!
//! This library crate exposes the core functionality for integration testing.

pub mod cache;
pub mod config;
pub mod naming;
pub mod negotiate;
pub mod origin;
pub mod request;
pub mod server;
pub mod transform;
