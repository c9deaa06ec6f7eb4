//! CRDT merge algebra for the kvstore datatypes.
//!
//! Each Redis-style datatype is backed by a conflict-free replicated data
//! type whose `merge` is commutative, associative, and idempotent, so
//! replicas can apply remote operations in any order (and replay the same
//! operation twice) and still converge:
//!
//! - `String` — last-writer-wins at value granularity, inline in [`Value::merge`]
//! - `Counter` — [`PnCounter`], a pair of G-Counters
//! - `List` — [`ListCrdt`], entries ordered by a signed rank
//! - `Set` — [`OrSet`], an add-wins observed-remove set
//! - `Hash` — [`HashCrdt`], per-field LWW
//! - `SortedSet` — [`SortedSetCrdt`], per-member LWW score with a derived index
//!
//! [`Value`] is the tagged envelope stored under every key, dispatching
//! `merge` across whichever payload variant it holds.

mod error;
mod hash_crdt;
mod list_crdt;
mod or_set;
mod pn_counter;
mod sorted_set_crdt;
mod tag;
mod value;

pub use error::{Error, Result};
pub use hash_crdt::HashCrdt;
pub use list_crdt::{ElementId, ListCrdt, Side};
pub use or_set::OrSet;
pub use pn_counter::PnCounter;
pub use sorted_set_crdt::SortedSetCrdt;
pub use tag::Tag;
pub use value::{Payload, Value};
