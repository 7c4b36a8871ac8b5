#![deny(missing_docs)]

//! Core library for the indicator desk: document ingestion, dual-backend persistence, and
//! grounded question answering over municipal indicator files.

/// REST store server.
pub mod api;
/// Text-completion provider boundary.
pub mod completion;
/// Environment-driven configuration management.
pub mod config;
/// Grounding context assembly.
pub mod context;
/// Conversation turns.
pub mod conversation;
/// Document format detection and text extraction.
pub mod ingest;
/// Model output interpretation.
pub mod interpret;
/// Structured logging and tracing setup.
pub mod logging;
/// Shared records.
pub mod model;
/// Catalog and transcript persistence.
pub mod store;
