//! Foundation layer: math types and the logging collaborator

pub mod logging;
pub mod math;
