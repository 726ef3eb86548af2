pub mod paths;
pub mod persistence;
pub mod schema;

pub use paths::*;
pub use persistence::*;
pub use schema::*;

fn default_reclaim_interval_ms() -> u64 {
    0
}

fn default_log_filter() -> String {
    "info".to_string()
}
