pub mod config;
pub mod replay;
pub mod stress;

pub use config::handle_config_command;
pub use replay::run_replay;
pub use stress::run_stress;
