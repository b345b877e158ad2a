//! Unit tests for snapshot-manager
//!
//! Pure logic: config loading, notification cascade, retention,
//! templating and sanitisation.

mod cascade;
mod config;
mod retention;
mod sanitize;
mod template;
