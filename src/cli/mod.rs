//! CLI command implementations.

pub mod provision;
pub mod routes;
pub mod start;
pub mod validate;
