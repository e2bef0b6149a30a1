//! Waveform decoding seam.
//!
//! The session materializes waveform files; turning them into traces is up
//! to a [`WaveformDecoder`] supplied by the caller. A file the decoder does
//! not recognize is skipped, never fatal.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Reasons a materialized file could not be decoded.
#[derive(Debug, Error)]
pub enum WaveformDecodeError {
    /// Not a waveform format this decoder understands.
    #[error("Unrecognized waveform format: {}", .0.display())]
    UnrecognizedFormat(PathBuf),

    /// The file could not be read.
    #[error("I/O error reading waveform: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads one materialized file into a trace.
pub trait WaveformDecoder {
    /// Decoded trace type.
    type Trace;

    /// Decode the file at `path`.
    fn decode(&self, path: &Path) -> Result<Self::Trace, WaveformDecodeError>;
}

impl<D: WaveformDecoder + ?Sized> WaveformDecoder for &D {
    type Trace = D::Trace;

    fn decode(&self, path: &Path) -> Result<Self::Trace, WaveformDecodeError> {
        (**self).decode(path)
    }
}

/// Files and decoded traces for one event.
#[derive(Debug, Clone)]
pub struct WaveformResult<T> {
    /// Files materialized for the event, in the order the server sent them.
    pub files: Vec<PathBuf>,
    /// Successfully decoded traces.
    pub traces: Vec<T>,
    /// Files the decoder could not read.
    pub skipped: Vec<PathBuf>,
}

impl<T> WaveformResult<T> {
    /// Result holding only file paths.
    pub fn from_files(files: Vec<PathBuf>) -> Self {
        Self {
            files,
            traces: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<T> Default for WaveformResult<T> {
    fn default() -> Self {
        Self::from_files(Vec::new())
    }
}

/// Decode every file, optionally removing each one afterwards.
///
/// Unrecognized or unreadable files are skipped and listed in
/// [`WaveformResult::skipped`].
pub fn decode_files<D: WaveformDecoder>(
    decoder: &D,
    files: Vec<PathBuf>,
    keep_files: bool,
) -> WaveformResult<D::Trace> {
    let mut result = WaveformResult::from_files(files);

    for path in &result.files {
        match decoder.decode(path) {
            Ok(trace) => result.traces.push(trace),
            Err(WaveformDecodeError::UnrecognizedFormat(_)) => {
                tracing::debug!(path = %path.display(), "Unknown waveform format, skipping");
                result.skipped.push(path.clone());
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "Skipping waveform file: {}", e);
                result.skipped.push(path.clone());
            }
        }

        if !keep_files && path.is_file() {
            tracing::debug!(path = %path.display(), "Removing waveform file after reading");
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!(path = %path.display(), "Failed to remove waveform file: {}", e);
            }
        }
    }

    tracing::info!("Processed {} waveform traces", result.traces.len());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Accepts files starting with `WAVE`, returns their length.
    struct LengthDecoder;

    impl WaveformDecoder for LengthDecoder {
        type Trace = usize;

        fn decode(&self, path: &Path) -> Result<usize, WaveformDecodeError> {
            let data = fs::read(path)?;
            if data.starts_with(b"WAVE") {
                Ok(data.len())
            } else {
                Err(WaveformDecodeError::UnrecognizedFormat(path.to_path_buf()))
            }
        }
    }

    #[test]
    fn test_unrecognized_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.sac");
        let bad = dir.path().join("readme.txt");
        fs::write(&good, b"WAVE1234").unwrap();
        fs::write(&bad, b"hello").unwrap();

        let result = decode_files(&LengthDecoder, vec![good.clone(), bad.clone()], true);

        assert_eq!(result.traces, vec![8]);
        assert_eq!(result.skipped, vec![bad.clone()]);
        assert_eq!(result.files, vec![good.clone(), bad.clone()]);
        assert!(good.exists());
        assert!(bad.exists());
    }

    #[test]
    fn test_files_removed_unless_kept() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.sac");
        fs::write(&good, b"WAVE").unwrap();

        let result = decode_files(&LengthDecoder, vec![good.clone()], false);
        assert_eq!(result.traces, vec![4]);
        assert!(!good.exists());
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.sac");
        let result = decode_files(&&LengthDecoder, vec![missing.clone()], false);
        assert!(result.traces.is_empty());
        assert_eq!(result.skipped, vec![missing]);
    }
}
