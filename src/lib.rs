//! Chatgate is the access and entitlement layer for a hosted chat service.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns session state and persistence, the one-shot policy
//!   synchronization, per-tier quota tracking, the route guard, and the
//!   shared model catalog.
//! - [`auth`] exchanges account credentials for a session token and handles
//!   logout.
//! - [`api`] defines the control-plane wire payloads, the [`api::AccessApi`]
//!   transport seam, and its `reqwest` implementation.
//! - [`cli`] exposes the library through a small command-line binary.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::run`].

pub mod api;
pub mod auth;
pub mod cli;
pub mod core;
pub mod utils;
