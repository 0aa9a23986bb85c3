pub mod filters;
pub mod tracing;
