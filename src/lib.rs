//! psdb: command-line client for a managed database platform
//!
//! Layers, outermost first:
//! - [`cli`]: argument parsing, dispatch, handlers and output
//! - [`application`]: error classification and bounded polling
//! - [`infrastructure`]: HTTP client, API traits and the DI container
//! - [`domain`]: payload types
//! - [`config`]: layered settings and atomic config-file writes

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
