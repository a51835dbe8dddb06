//! Odds and ends shared by the graupel crates.

#![warn(missing_docs)]

pub mod logger;
pub mod version;
