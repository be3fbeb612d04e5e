//! Scenario tests spanning the fundkit crates.
//!
//! Tests drive a full [`fundkit_wallet::Toolkit`] against the in-memory
//! chain in [`helpers`], which stands in for both discovery and the
//! previous-transaction explorer. `tests/esplora.rs` runs the same flow
//! over HTTP against a local mock Esplora server.

pub mod helpers;
