pub mod chain;
pub mod config;
pub mod deploy;
pub mod errors;
pub mod hatch_config;
pub mod logging;
pub mod params;
pub mod record;
pub mod ui;
