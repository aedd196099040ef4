//! Client core for the LockAI chat and paper-generation backend.
//!
//! This crate owns the protocol side of the client: decoding the server's
//! event streams, reducing them into chat/paper state machines, reconciling
//! local session and record identifiers with server-confirmed state, and
//! persisting completed exchanges. Rendering is left to the consumer.

pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod paper;
pub mod paths;
pub mod store;
pub mod title;
pub mod workspace;

pub use error::{ClientError, ClientResult, ErrorKind};
