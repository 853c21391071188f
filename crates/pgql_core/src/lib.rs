//! Parallel grouping and aggregation over graph query result rows.

pub mod config;
pub mod expr;
pub mod functions;
pub mod grouping;
pub mod runtime;
pub mod scalar;
pub mod table;
