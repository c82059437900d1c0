//! reqflow - guided requirements gathering.
//!
//! A session moves from a user's goal and project context, through either a
//! question interview or a free-form draft, to a generated requirements
//! document. The [`workflow::SessionEngine`] owns the session state machine;
//! the chat-side [`navigation::Navigator`] and the HTTP [`rest`] surface both
//! drive it.

pub mod config;
pub mod console;
pub mod domain;
pub mod error;
pub mod gateways;
pub mod lifecycle;
pub mod logging;
pub mod navigation;
pub mod notifications;
pub mod ratelimit;
pub mod rest;
pub mod store;
pub mod workflow;
