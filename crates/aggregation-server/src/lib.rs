//! Binary crate wiring: CLI, telemetry init, and a minimal `axum` HTTP
//! surface over the aggregation layer core.

pub mod cli;
pub mod routes;
pub mod widgets;
