//! # Guardpost
//!
//! A multi-tenant back office for security-guard and facility-management
//! operations, usable both as a standalone binary and as a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! guardpost = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use guardpost::server::{AppState, create_router};
//! use guardpost::store::{SqliteStore, Store};
//!
//! let store = SqliteStore::new("./data/guardpost.db").unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState::new(Arc::new(store)));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `guardpost` binary. Disable with
//!   `default-features = false`.

pub mod auth;
pub mod config;
pub mod error;
pub mod repository;
pub mod schema;
pub mod server;
pub mod service;
pub mod store;
pub mod types;
