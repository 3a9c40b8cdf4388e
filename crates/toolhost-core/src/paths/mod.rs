//! Path utilities for toolhost data directories.
//!
//! - Returns `PathBuf` and `PathError` for clear error handling
//! - No interactive/terminal I/O

mod ensure;
mod error;
mod platform;

pub use ensure::{DirectoryCreationStrategy, ensure_directory, verify_writable};
pub use error::PathError;
pub use platform::{data_root, resolve_data_dir};
