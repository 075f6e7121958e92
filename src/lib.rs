//! Purpose: Shared library crate behind the `dsview` CLI, HTTP server, and tests.
//! Exports: `core` (sources, filtering, pagination, errors) and `api` (request facade).
//! Role: Dataset access and query layer; the binary adds CLI and HTTP plumbing only.
//! Invariants: Every request rebuilds its table from source; no state outlives a call.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
