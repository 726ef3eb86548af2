use thiserror::Error;

pub type Result<T> = std::result::Result<T, LayerError>;

#[derive(Error, Debug)]
pub enum LayerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Parent layer not found: {0}")]
    ParentNotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Allocation failed: {0}")]
    Allocation(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Layer '{ancestor}' is not an ancestor of '{layer}'")]
    NotAncestor { layer: String, ancestor: String },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(std::io::Error),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Script error: {0}")]
    Script(String),
}

impl LayerError {
    /// The errno a transport layer should report for this error.
    pub fn errno(&self) -> i32 {
        match self {
            LayerError::NotFound(_) | LayerError::ParentNotFound(_) => libc::ENOENT,
            LayerError::AlreadyExists(_) => libc::EEXIST,
            LayerError::Allocation(_) => libc::ENOMEM,
            LayerError::InvalidPath(_)
            | LayerError::NotAncestor { .. }
            | LayerError::InvalidOperation(_)
            | LayerError::Config(_)
            | LayerError::Script(_) => libc::EINVAL,
            LayerError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            LayerError::Json(_) => libc::EIO,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LayerError::NotFound(_) | LayerError::ParentNotFound(_)
        )
    }
}

impl From<std::io::Error> for LayerError {
    fn from(err: std::io::Error) -> Self {
        LayerError::Io(err)
    }
}

impl From<serde_json::Error> for LayerError {
    fn from(err: serde_json::Error) -> Self {
        LayerError::Json(err.to_string())
    }
}
