//! Shared types, errors, traits and configuration for the ragdb workspace.
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod config;
pub mod error;
pub mod hashing;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
