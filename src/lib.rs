//! fwbuild library exports.
//!
//! The binary in `main.rs` is a thin CLI over these modules; integration
//! tests drive them directly with a recording [`process::ToolRunner`].

pub mod artifact;
pub mod build;
pub mod cache;
pub mod component;
pub mod config;
pub mod error;
pub mod firmware;
pub mod inventory;
pub mod matrix;
pub mod options;
pub mod preflight;
pub mod probe;
pub mod process;
pub mod qa;
pub mod schedule;
pub mod state;
pub mod toolchain;

pub use error::{Error, Result};
