//! Portfolio Backend Library
//!
//! Exposes the authentication slice for the server binary and tests:
//! token service, request gate, credential store, HTTP surface, and the
//! client session guard.

pub mod auth;
pub mod client;
pub mod config;
pub mod middleware;
