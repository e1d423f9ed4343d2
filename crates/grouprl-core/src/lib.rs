//! Shared foundations for the grouprl workspace.
//!
//! `grouprl-core` holds the pieces every other crate needs: the error
//! taxonomy ([`RlError`]) and the run configuration ([`RlConfig`]).

pub mod config;
pub mod error;

pub use config::RlConfig;
pub use error::{Result, RlError};
