//! Core data models for the video upload service.
//!
//! Records map to SQLite rows via `sqlx::FromRow` and serialize as JSON
//! through `serde` for API responses.

pub mod stored_object;
pub mod video;
