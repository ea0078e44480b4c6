//! CLI command implementations.

pub mod build;
pub mod image;
pub mod upgrade;
pub mod version;
