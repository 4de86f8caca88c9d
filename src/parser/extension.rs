//! File-extension classifier.
//!
//! Maps a quadlet source path to its [`QuadletType`] by the extension after
//! the last dot of the file name, matched case-insensitively.

use std::path::Path;

use crate::errors::{QuadletError, QuadletResult};
use crate::model::QuadletType;

/// Classify `path` by its file extension.
///
/// Fails with [`QuadletError::UnrecognizedExtension`] for anything outside
/// the supported set; callers treat that as local to the one file.
pub fn quadlet_type_from_path(path: &str) -> QuadletResult<QuadletType> {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.rsplit('.').next())
        .and_then(QuadletType::from_extension)
        .ok_or_else(|| QuadletError::UnrecognizedExtension(path.to_string()))
}
