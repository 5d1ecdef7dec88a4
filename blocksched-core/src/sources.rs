use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::CoreError;

/// File extension of block listing sources.
pub const SOURCE_EXTENSION: &str = "blk";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path relative to the directory that was searched; the file name
    /// alone when a single file was loaded.
    pub path: PathBuf,
    pub contents: String,
}

/// Load a single `.blk` file, or every `.blk` file below a directory in
/// path order.
pub fn load_sources(root: impl AsRef<Path>) -> Result<Vec<SourceFile>, CoreError> {
    let root = root.as_ref();
    if root.is_file() {
        let contents = fs::read_to_string(root)?;
        let path = root
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| root.to_path_buf());
        return Ok(vec![SourceFile { path, contents }]);
    }
    if !root.is_dir() {
        return Err(CoreError::MissingSources(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == SOURCE_EXTENSION) {
            let contents = fs::read_to_string(path)?;
            let relative = path.strip_prefix(root).unwrap_or(path).to_path_buf();
            files.push(SourceFile {
                path: relative,
                contents,
            });
        }
    }

    if files.is_empty() {
        return Err(CoreError::MissingSources(root.to_path_buf()));
    }
    Ok(files)
}
