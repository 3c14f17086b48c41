//! `.kpy` files: the raw editor buffer as plain UTF-8 text.
//!
//! Nothing here touches the rewriter; what is saved is exactly what was typed.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use tracing::debug;

use crate::{Error, Result, TRACE_TARGET_SCRIPT, config::Messages, transcript::Transcript};

pub const EXTENSION: &str = "kpy";

fn has_kpy_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(EXTENSION))
}

/// `name` with `.kpy` appended unless it already ends in it.
#[must_use]
pub fn with_extension(name: &str) -> String {
    if has_kpy_extension(Path::new(name)) {
        name.to_string()
    } else {
        format!("{name}.{EXTENSION}")
    }
}

/// Default file name for a save made at `now`.
#[must_use]
pub fn suggest_file_name<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: core::fmt::Display,
{
    format!("hangpy_{}.{EXTENSION}", now.format("%Y%m%d_%H%M"))
}

/// Write `text` to `dir/name`, adding the extension when missing.
///
/// # Errors
/// Returns [`Error::Io`] if the file cannot be written.
pub async fn save(dir: &Path, name: &str, text: &str) -> Result<PathBuf> {
    let path = dir.join(with_extension(name));
    tokio::fs::write(&path, text).await?;
    debug!(target: TRACE_TARGET_SCRIPT, path = %path.display(), bytes = text.len(), "saved buffer");
    Ok(path)
}

/// Read a `.kpy` file.
///
/// # Errors
/// Returns [`Error::InvalidExtension`] for any other file, [`Error::Io`]
/// if it cannot be read.
pub async fn load(path: &Path) -> Result<String> {
    if !has_kpy_extension(path) {
        return Err(Error::InvalidExtension {
            path: path.to_path_buf(),
        });
    }
    let text = tokio::fs::read_to_string(path).await?;
    debug!(target: TRACE_TARGET_SCRIPT, path = %path.display(), bytes = text.len(), "loaded buffer");
    Ok(text)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

pub fn notice_saved(transcript: &Transcript, messages: &Messages, path: &Path) {
    transcript.append_line(&format!("\n{} {}", messages.saved, display_name(path)));
}

pub fn notice_loaded(transcript: &Transcript, messages: &Messages, path: &Path) {
    transcript.append_line(&format!("\n{} {}", messages.loaded, display_name(path)));
}
