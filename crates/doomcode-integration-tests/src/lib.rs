//! Integration test crate for the DoomCode relay/controller protocol.
//!
//! This crate has no library code of its own beyond [`support`], a small
//! harness shared by the end-to-end scenario tests under `tests/` — each
//! file there exercises exactly one end-to-end scenario against a real
//! in-process relay, one flow per file.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p doomcode-integration-tests
//! ```

pub mod support;
