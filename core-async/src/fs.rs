//! Async file-system helpers.
//!
//! Used by the download engine to write partial files. Everything else in the
//! core goes through `bridge_traits::storage::FileSystemAccess`.

pub use tokio::fs::{
    create_dir_all, metadata, remove_file, rename, try_exists, File, OpenOptions,
};
