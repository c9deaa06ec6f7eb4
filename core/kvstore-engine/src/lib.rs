//! In-memory typed store (C3) and command API (C5) for the kvstore.
//!
//! [`TypedStore`] is the sharded, lock-ordered index over CRDT-backed
//! [`kvstore_crdt::Value`]s, persisted through [`kvstore_storage`].
//! [`Commands`] layers Redis-semantically-aligned operations on top of it,
//! and is the single path both locally issued writes and replayed remote
//! operations go through — see [`Commands::apply_operation`].

mod commands;
mod error;
mod store;

pub use commands::{Commands, ExpireSpec, SetOptions};
pub use error::{EngineError, EngineResult};
pub use store::TypedStore;
