//! Path-related error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    /// The platform has no local data directory and none was configured.
    #[error("No local data directory on this platform; set TOOLHOST_DATA_DIR")]
    NoDataDir,

    #[error("Directory path is empty")]
    EmptyPath,

    #[error("{} exists but is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// Missing and the creation strategy forbids creating it.
    #[error("Directory {} does not exist", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("Cannot create directory {}", path.display())]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Directory {} is not writable", path.display())]
    NotWritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
