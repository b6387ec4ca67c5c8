//! Second-opinion case orchestration for oncology tumor boards: lifecycle, physician
//! assignment, and committee consensus behind an HTTP service.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
