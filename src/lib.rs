//! Library crate for arena-back, exposing modules for binaries and integration tests.

/// Runtime configuration loaded from JSON.
pub mod config;
/// Persistence contract, entities and storage backends.
pub mod dao;
/// Request, response and realtime payloads.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// HTTP, WebSocket and SSE routers.
pub mod routes;
/// Business operations behind the routes.
pub mod services;
/// Shared application state and the realtime registry.
pub mod state;
