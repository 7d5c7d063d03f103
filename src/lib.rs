//! Belgic - launches R web applications on free local ports
//!
//! This library provides the backend lifecycle for serving an ambiorix or
//! shiny application from several R processes:
//! - Allocates a free loopback port for each backend
//! - Builds the R expression that starts the app bound to that port
//! - Launches the interpreter in the background and publishes the base URL
//! - Guards each backend's port and URL behind its own read-write lock
//!
//! Routing, load balancing and restarting crashed backends are left to the
//! layer that consumes the published URLs.

pub mod backend;
pub mod config;
pub mod error;
pub mod invocation;
pub mod launcher;
pub mod port;
pub mod supervisor;
