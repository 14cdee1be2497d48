use std::path::PathBuf;
use thiserror::Error;

/// Boundary failures. Selection-state code never returns these; everything
/// here is produced at an I/O or parse boundary and recorded rather than
/// propagated into the tri-state machinery.
#[derive(Debug, Error)]
pub enum Error {
    #[error("path rejected: {0}")]
    PathRejected(String),

    #[error("not found or permission denied: {}", .path.display())]
    NotFoundOrPermission {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
