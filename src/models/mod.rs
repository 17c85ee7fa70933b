//! Data models for the botdeck console core.
//!
//! This module contains the types shared across components:
//! - [`ConfigValue`]: the configuration document tree, insertion-ordered and
//!   `Arc`-shared so path-addressed rebuilds preserve sibling identity
//! - [`ServerEvent`]: the push-channel wire contract (`status`,
//!   `logSnapshot`, `logLine`, `dbLogLine`)
//! - [`ChannelEvent`]: transport transitions plus decoded server frames
//!
//! # Architecture Note
//!
//! The document type is deliberately schema-agnostic: the client treats the
//! server's configuration as an opaque object with named sections and
//! string-list leaves, so server-side schema changes never require a client
//! release. Structural rules (object sharing, string-only lists) are the
//! only invariants enforced here.

pub mod document;
pub mod events;

pub use document::ConfigValue;
pub use events::{ChannelEvent, ServerEvent};
