//! Command handlers.
//!
//! Each handler receives what it needs from the composition root and
//! returns `anyhow::Result`; [`crate::CliError`] values inside carry the
//! exit code.

pub mod check;
pub mod status;
pub mod supervise;
