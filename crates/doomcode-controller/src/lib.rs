//! # doomcode-controller
//!
//! The desktop-side runtime (§4.5): pairs with the relay, supervises a
//! PTY-attached assistant subprocess, scans its output for permission
//! prompts and diffs, and tracks accepted patches for deterministic undo.
//!
//! ## Modules
//!
//! - [`cli`] — `start`/`connect` subcommands (§6)
//! - [`config`] — environment-driven runtime tuning (§6)
//! - [`session_cache`] — `.doomcode/session.json` persistence (§4.5.1)
//! - [`pairing`] — session bootstrap and pairing-payload rendering (§4.5.1)
//! - [`wire`] — the duplex relay connection (§4.5.1, §6)
//! - [`pty`] — the PTY provider abstraction and its two backends (§4.5.2, §9)
//! - [`input`] — enter-mode and typewrite input-injection discipline (§4.5.2)
//! - [`scanners`] — the permission detector and diff extractor (§4.5.3)
//! - [`diff_parser`] — the standalone unified-diff parser (§4.5.4)
//! - [`patch_tracker`] — deterministic undo bookkeeping (§4.5.5)
//! - [`supervisor`] — ties the above into one state machine (§4.5.2-§4.5.6)
//! - [`error`] — controller-side error kinds (§7)

pub mod cli;
pub mod config;
pub mod diff_parser;
pub mod error;
pub mod input;
pub mod pairing;
pub mod patch_tracker;
pub mod pty;
pub mod scanners;
pub mod session_cache;
pub mod supervisor;
pub mod wire;

pub use error::{ControllerError, Result};
