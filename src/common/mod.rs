//! Common filesystem helpers shared by the fetch engine and the subdir materializer

pub mod copy;

pub use copy::{FileManifest, copy_dir_recursive, copy_folder_contents_with_filter};
