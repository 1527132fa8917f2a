//! # fiber-node
//!
//! Responder for encrypted work requests over plain HTTP.
//!
//! A requester fetches the node's X25519 public key, seals a random 32-byte
//! session key to it, and then sends XChaCha20-Poly1305 encrypted tasks. The
//! node decrypts, hands the task to an inference backend, and returns the
//! result encrypted under the same session key.
//!
//! ## Design Principles
//! * Async-first: tokio runtime, axum handlers, async backend trait.
//! * Volatile state: identity and sessions live in memory only; a restart
//!   forces every peer to re-handshake.
//! * No oracle: a missing, expired or undecryptable session all yield the same
//!   401 `requires_handshake` signal carrying the current public key.
//! * Admission before crypto: readiness and concurrency gates run before any
//!   session lookup.
//! * Event-driven instrumentation (JSON line audit log + console).
//!
//! ## Key Modules
//! * `security` – identity, session store, handshake controller, payload cipher.
//! * `admission` – readiness gate + poller, concurrency limiter.
//! * `challenge` – decrypt, dispatch, encrypt.
//! * `backend` – inference collaborators (mock, OpenAI-compatible).
//! * `network` – HTTP routes, wire DTOs, peer resolution.
//! * `client` – requester side, used by `fiber-ctl` and the tests.
//! * `events` – structured logging/events dispatcher.
//! * `config` – TOML configuration and resolved settings.

pub mod admission;
pub mod backend;
pub mod challenge;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod network;
pub mod node;
pub mod security;

pub use node::{BackgroundTasks, FiberNode};
