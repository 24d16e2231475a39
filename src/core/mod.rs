pub mod config;
pub mod deadline;
pub mod errors;
pub mod logging;
