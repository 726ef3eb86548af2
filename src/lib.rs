pub mod config;
pub mod error;
pub mod layer;

pub use config::get_config_path;
pub use config::load_config;
pub use config::load_config_from;
pub use config::save_config;
pub use config::save_config_to;
pub use config::Config;
pub use config::EngineConfig;
pub use config::LogConfig;

pub use error::{LayerError, Result};

pub use layer::{
    Change, ChangeKind, InodeHandle, LayerRegistry, LayerStore, Mode, PathResolver, Reaper,
    Reclaimer, RemovePolicy, SweepReport,
};
