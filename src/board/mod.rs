//! RMW request board.
//!
//! ## Overview
//!
//! Production lines raise requests for material, warehouse staff fulfill
//! them (optionally a few PO numbers at a time), and administrators watch
//! the flow and report downtime per department. Every client keeps a live
//! mirror of the `requests` table and renders elapsed timers corrected by a
//! one-shot server clock offset.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────────┐  HTTP  ┌───────────────────────────────────────────────┐
//! │  CLI client  │ ─────> │  server.rs  (axum Router, ServerConfig)       │
//! │  http.rs     │ <───── │    ├─ api.rs  (route handlers, AppState)      │
//! └──────────────┘        │    └─ ws.rs   (change feed over WebSocket)    │
//!        │                │         │                                     │
//!        │ RequestTable   │         │ RequestTable + ChangeFeed           │
//!        v                │         v                                     │
//! ┌──────────────┐        │  backend.rs  (LocalBackend)                   │
//! │  store.rs    │        │         │                                     │
//! │ RequestStore │        │         v                                     │
//! └──────────────┘        │  db.rs  (BoardDb behind DbHandle)             │
//!                         └───────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module    | Responsibility                                          |
//! |-----------|---------------------------------------------------------|
//! | `models`  | `Request`, `RequestStatus`, drafts, patches, analytics  |
//! | `po`      | PO token parsing and fulfillment splits                 |
//! | `feed`    | `ChangeEvent` and the broadcast publish helper          |
//! | `clock`   | `Clock`, `SyncedClock`, offset estimate, formatting     |
//! | `roles`   | `Role` → view and capabilities, `RoleStore` seam        |
//!
//! ## Partial completion
//!
//! 1. `RequestStore::complete_partial` splits the record's tokens.
//! 2. A new `completed` record with the selected tokens is inserted,
//!    carrying the original `created_at`.
//! 3. Only if that insert succeeded is the original shrunk to the
//!    remaining tokens; its status is left alone.
//! 4. Both writes echo back through the change feed and land in the
//!    store's cache in arrival order.

pub mod api;
pub mod backend;
pub mod clock;
pub mod db;
pub mod feed;
pub mod http;
pub mod models;
pub mod po;
pub mod roles;
pub mod server;
pub mod store;
pub mod ws;
