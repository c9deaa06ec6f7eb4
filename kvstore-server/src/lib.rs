//! RESP wire adapter and process wiring for a kvstore replica.
//!
//! This crate is the binary's supporting library: a RESP2 codec
//! ([`resp`]), the command dispatcher that bridges parsed RESP commands to
//! [`kvstore_engine::Commands`] ([`dispatch`]), the TCP listener
//! ([`server`]), and the optional background workers from the concurrency
//! model ([`background`]). `main.rs` is only CLI parsing and process
//! wiring; everything testable lives here.

pub mod background;
pub mod dispatch;
pub mod resp;
pub mod server;
