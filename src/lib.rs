//! Purpose: Library crate behind the `hellodev` greeting pseudo-device and its CLI harness.
//! Exports: `core` (greeting buffer, sessions, hosts, errors) and `api` (stable re-exports).
//! Role: Keeps the buffer protocol independent of how a host publishes it.
//! Invariants: One `GreetingStore` per device; sessions carry only a cursor.
//! Invariants: Buffer operations never fail; only host registration returns errors.
pub mod api;
pub mod core;
