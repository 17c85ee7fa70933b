//! Services module - persistence collaborators for the console core.
//!
//! # Components
//!
//! - [`ApiClient`]: the REST collaborator over the console's fixed endpoint
//!   contracts (`/config`, `/servers/{id}/config`, channel listings,
//!   relationship records). Bodies are opaque documents; the client never
//!   interprets server schema.
//!
//! - [`AutosavePolicy`]: the coalescing persistence engine. Scalar edits
//!   replace a single pending-write slot with a reset-on-edit timer;
//!   firing persists the full document via [`ConfigSink`]
//!   (last-writer-wins). Writes are suppressed while the server reports a
//!   restart, and failures surface as [`SaveNotice`]s instead of retries.
//!
//! # Design Philosophy
//!
//! The services are framework-agnostic: no UI dependencies, explicit
//! injected collaborators (the sink seam exists so tests run without a
//! network), and all I/O failures become local state, never panics.

pub mod api;
pub mod autosave;

pub use api::{ApiClient, ApiError};
pub use autosave::{AutosavePolicy, ConfigSink, DEFAULT_SAVE_DELAY, SaveNotice};
