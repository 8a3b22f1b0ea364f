//! Persisting rendered frames.
//!
//! Turning a view into pixels belongs to an external renderer; the crate
//! ships [`TextFrameCapture`], which stores the view as plain text.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to write frame {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to render frame: {0}")]
    Render(String),
}

pub type Result<T> = std::result::Result<T, CaptureError>;

/// Writes one rendered view to a file.
pub trait FrameCapture: Send {
    /// File extension, without the dot.
    fn extension(&self) -> &str;

    fn capture(&mut self, view: &str, path: &Path) -> Result<()>;
}

/// Stores the rendered view as UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFrameCapture;

impl FrameCapture for TextFrameCapture {
    fn extension(&self) -> &str {
        "txt"
    }

    fn capture(&mut self, view: &str, path: &Path) -> Result<()> {
        fs::write(path, view).map_err(|source| CaptureError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
