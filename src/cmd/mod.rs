//! CLI command implementations.
//!
//! | Module    | Commands handled |
//! |-----------|------------------|
//! | `deploy`  | `Deploy`         |
//! | `apps`    | `Apps`           |
//! | `params`  | `Params`         |
//! | `runs`    | `Runs`           |
//! | `config`  | `Config`         |

pub mod apps;
pub mod config;
pub mod deploy;
pub mod params;
pub mod runs;

pub use apps::cmd_apps;
pub use config::cmd_config;
pub use deploy::cmd_deploy;
pub use params::cmd_params;
pub use runs::cmd_runs;
