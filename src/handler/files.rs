//! File materializer: turns `DIR`/`FILE`/`DATA` directives into files.
//!
//! The materializer owns an [`OutputCursor`] (current directory plus the one
//! open output file) and the list of files written during the exchange.
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use stp_client::handler::{FileMaterializer, ResponseHandler};
//! use stp_client::protocol::ResponseEvent;
//!
//! let mut files = FileMaterializer::new("/tmp/stp");
//! files.begin_exchange();
//! files.handle(&ResponseEvent::Directory("12345".into())).unwrap();
//! files.handle(&ResponseEvent::File("a.sac".into())).unwrap();
//! files.handle(&ResponseEvent::DataChunk(Bytes::from_static(b"\x01\x02"))).unwrap();
//! files.handle(&ResponseEvent::Over).unwrap();
//!
//! assert_eq!(files.recent_files().len(), 1);
//! ```

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use super::ResponseHandler;
use crate::error::{Result, StpError};
use crate::protocol::ResponseEvent;

/// Output file currently receiving `DATA` payloads.
struct OpenFile {
    path: PathBuf,
    writer: BufWriter<File>,
}

/// Current output directory and open output file.
///
/// The directory starts at `root` and is reset to it at every exchange
/// boundary. At most one file is open at a time.
pub struct OutputCursor {
    root: PathBuf,
    current_dir: PathBuf,
    file: Option<OpenFile>,
}

impl OutputCursor {
    /// Create a cursor rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            current_dir: root.clone(),
            root,
            file: None,
        }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory new files are created in.
    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }

    /// Path of the open output file, if any.
    pub fn open_file(&self) -> Option<&Path> {
        self.file.as_ref().map(|f| f.path.as_path())
    }

    /// Change the root. The current directory follows it.
    pub fn set_root(&mut self, root: impl Into<PathBuf>) {
        self.root = root.into();
        self.current_dir = self.root.clone();
    }

    /// Close the open file and return to the root directory.
    pub fn reset(&mut self) -> Result<()> {
        self.current_dir = self.root.clone();
        self.close_file()
    }

    /// Flush and close the open file, if any.
    pub fn close_file(&mut self) -> Result<()> {
        if let Some(mut open) = self.file.take() {
            open.writer.flush()?;
        }
        Ok(())
    }

    fn enter_dir(&mut self, name: &str) -> Result<()> {
        self.current_dir.push(name);
        match fs::create_dir(&self.current_dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(source) => Err(StpError::DirectoryCreate {
                path: self.current_dir.clone(),
                source,
            }),
        }
    }

    fn open(&mut self, path: PathBuf) -> Result<()> {
        match File::create(&path) {
            Ok(file) => {
                self.file = Some(OpenFile {
                    path,
                    writer: BufWriter::new(file),
                });
                Ok(())
            }
            Err(source) => Err(StpError::FileOpen { path, source }),
        }
    }
}

/// Consumer of directory/file/data events.
pub struct FileMaterializer {
    cursor: OutputCursor,
    recent_files: Vec<PathBuf>,
    dropped_chunks: usize,
}

impl FileMaterializer {
    /// Create a materializer writing under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            cursor: OutputCursor::new(root),
            recent_files: Vec::new(),
            dropped_chunks: 0,
        }
    }

    /// Change the output root for subsequent exchanges.
    pub fn set_root(&mut self, root: impl Into<PathBuf>) {
        self.cursor.set_root(root);
    }

    /// Output cursor (read-only).
    pub fn cursor(&self) -> &OutputCursor {
        &self.cursor
    }

    /// Files opened during the current (or last finished) exchange, in order.
    pub fn recent_files(&self) -> &[PathBuf] {
        &self.recent_files
    }

    /// Number of `DATA` payloads dropped because no file was open.
    pub fn dropped_chunks(&self) -> usize {
        self.dropped_chunks
    }

    /// Number of open output files (0 or 1).
    pub fn open_file_count(&self) -> usize {
        usize::from(self.cursor.file.is_some())
    }

    /// Prepare for a new exchange: clear recent files, reset the cursor.
    pub fn begin_exchange(&mut self) {
        self.recent_files.clear();
        self.dropped_chunks = 0;
        if let Err(e) = self.cursor.reset() {
            tracing::warn!("Failed to close output file: {}", e);
        }
    }

    /// Close any open file and return to the root directory.
    ///
    /// Recent files are kept for the caller until the next exchange begins.
    pub fn finish_exchange(&mut self) -> Result<()> {
        self.cursor.reset()
    }

    fn on_directory(&mut self, name: &str) -> Result<()> {
        check_component(name)?;
        self.cursor.enter_dir(name)?;
        tracing::debug!(dir = %self.cursor.current_dir().display(), "Entered output directory");
        Ok(())
    }

    fn on_file(&mut self, name: &str) -> Result<()> {
        if let Err(e) = self.cursor.close_file() {
            tracing::warn!("Failed to close previous output file: {}", e);
        }

        let path = self.cursor.current_dir().join(name);
        self.recent_files.push(path.clone());
        check_component(name).map_err(|e| StpError::FileOpen {
            path: path.clone(),
            source: std::io::Error::new(ErrorKind::InvalidInput, e.to_string()),
        })?;

        tracing::debug!(path = %path.display(), "Opening output file");
        self.cursor.open(path)
    }

    fn on_data(&mut self, data: &[u8]) -> Result<()> {
        let Some(open) = self.cursor.file.as_mut() else {
            self.dropped_chunks += 1;
            tracing::warn!(len = data.len(), "DATA without an open file, dropping");
            return Ok(());
        };

        if let Err(e) = open.writer.write_all(data) {
            let path = open.path.clone();
            // Stop writing to a file that already failed once.
            self.cursor.file = None;
            return Err(StpError::FileOpen { path, source: e });
        }
        Ok(())
    }
}

impl ResponseHandler for FileMaterializer {
    fn handle(&mut self, event: &ResponseEvent) -> Result<()> {
        match event {
            ResponseEvent::Directory(name) => self.on_directory(name),
            ResponseEvent::File(name) => self.on_file(name),
            ResponseEvent::DataChunk(data) => self.on_data(data),
            ResponseEvent::Over => self.finish_exchange(),
            ResponseEvent::Message(_) | ResponseEvent::EndData | ResponseEvent::Error(_) => Ok(()),
        }
    }
}

/// Reject names that would escape the output directory.
fn check_component(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(StpError::Protocol(format!(
            "Refusing unsafe output name {:?}",
            name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn chunk(data: &'static [u8]) -> ResponseEvent {
        ResponseEvent::DataChunk(Bytes::from_static(data))
    }

    #[test]
    fn test_chunks_concatenate_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = FileMaterializer::new(dir.path());
        files.begin_exchange();

        files.handle(&ResponseEvent::File("a.sac".into())).unwrap();
        files.handle(&chunk(b"\x01\x02")).unwrap();
        files.handle(&chunk(b"")).unwrap();
        files.handle(&chunk(b"\x03")).unwrap();
        files.handle(&ResponseEvent::EndData).unwrap();
        files.handle(&ResponseEvent::Over).unwrap();

        let written = fs::read(dir.path().join("a.sac")).unwrap();
        assert_eq!(written, vec![1, 2, 3]);
        assert_eq!(files.recent_files(), &[dir.path().join("a.sac")]);
        assert_eq!(files.open_file_count(), 0);
    }

    #[test]
    fn test_new_file_closes_previous() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = FileMaterializer::new(dir.path());
        files.begin_exchange();

        files.handle(&ResponseEvent::File("a".into())).unwrap();
        files.handle(&chunk(b"first")).unwrap();
        assert_eq!(files.open_file_count(), 1);

        files.handle(&ResponseEvent::File("b".into())).unwrap();
        assert_eq!(files.open_file_count(), 1);
        assert_eq!(files.cursor().open_file(), Some(dir.path().join("b").as_path()));
        // Previous file was flushed on close.
        assert_eq!(fs::read(dir.path().join("a")).unwrap(), b"first");

        files.handle(&chunk(b"second")).unwrap();
        files.handle(&ResponseEvent::Over).unwrap();
        assert_eq!(fs::read(dir.path().join("b")).unwrap(), b"second");
    }

    #[test]
    fn test_directories_nest_and_reset_on_over() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = FileMaterializer::new(dir.path());
        files.begin_exchange();

        files.handle(&ResponseEvent::Directory("12345".into())).unwrap();
        files.handle(&ResponseEvent::Directory("CI".into())).unwrap();
        files.handle(&ResponseEvent::File("x.sac".into())).unwrap();
        files.handle(&chunk(b"z")).unwrap();
        files.handle(&ResponseEvent::Over).unwrap();

        let expected = dir.path().join("12345").join("CI").join("x.sac");
        assert_eq!(fs::read(&expected).unwrap(), b"z");
        assert_eq!(files.cursor().current_dir(), dir.path());
        // Kept after Over, cleared when the next exchange starts.
        assert_eq!(files.recent_files(), &[expected]);
        files.begin_exchange();
        assert!(files.recent_files().is_empty());
    }

    #[test]
    fn test_existing_directory_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("ev")).unwrap();
        let mut files = FileMaterializer::new(dir.path());
        files.begin_exchange();
        files.handle(&ResponseEvent::Directory("ev".into())).unwrap();
    }

    #[test]
    fn test_directory_create_failure() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ev"), b"not a directory").unwrap();
        let mut files = FileMaterializer::new(dir.path());
        files.begin_exchange();

        let err = files
            .handle(&ResponseEvent::Directory("ev".into()))
            .unwrap_err();
        assert!(matches!(err, StpError::DirectoryCreate { ref path, .. } if path == &dir.path().join("ev")));

        // Files under the failed directory cannot be opened; their data is dropped.
        let err = files.handle(&ResponseEvent::File("a.sac".into())).unwrap_err();
        assert!(matches!(err, StpError::FileOpen { .. }));
        files.handle(&chunk(b"lost")).unwrap();
        assert_eq!(files.dropped_chunks(), 1);

        files.handle(&ResponseEvent::Over).unwrap();
        assert_eq!(files.cursor().current_dir(), dir.path());
        assert_eq!(fs::read(dir.path().join("ev")).unwrap(), b"not a directory");
    }

    #[test]
    fn test_data_without_file_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = FileMaterializer::new(dir.path());
        files.begin_exchange();

        files.handle(&chunk(b"orphan")).unwrap();
        assert_eq!(files.dropped_chunks(), 1);
        assert!(files.recent_files().is_empty());
    }

    #[test]
    fn test_failed_open_drops_chunks_until_next_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = FileMaterializer::new(dir.path().join("missing"));
        files.begin_exchange();

        let err = files.handle(&ResponseEvent::File("a".into())).unwrap_err();
        assert!(matches!(err, StpError::FileOpen { .. }));
        files.handle(&chunk(b"lost")).unwrap();
        assert_eq!(files.dropped_chunks(), 1);

        // Recorded even though the open failed.
        assert_eq!(files.recent_files(), &[dir.path().join("missing").join("a")]);

        files.set_root(dir.path());
        files.begin_exchange();
        files.handle(&ResponseEvent::File("b".into())).unwrap();
        files.handle(&chunk(b"kept")).unwrap();
        files.handle(&ResponseEvent::Over).unwrap();
        assert_eq!(fs::read(dir.path().join("b")).unwrap(), b"kept");
    }

    #[test]
    fn test_file_is_truncated_on_create() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), b"old contents").unwrap();
        let mut files = FileMaterializer::new(dir.path());
        files.begin_exchange();

        files.handle(&ResponseEvent::File("a".into())).unwrap();
        files.handle(&chunk(b"new")).unwrap();
        files.handle(&ResponseEvent::Over).unwrap();
        assert_eq!(fs::read(dir.path().join("a")).unwrap(), b"new");
    }

    #[test]
    fn test_zero_length_chunk_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = FileMaterializer::new(dir.path());
        files.begin_exchange();
        files.handle(&ResponseEvent::File("empty".into())).unwrap();
        files.handle(&chunk(b"")).unwrap();
        files.handle(&ResponseEvent::Over).unwrap();
        assert!(fs::read(dir.path().join("empty")).unwrap().is_empty());
    }

    #[test]
    fn test_unsafe_names_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = FileMaterializer::new(dir.path());
        files.begin_exchange();

        assert!(files.handle(&ResponseEvent::Directory("..".into())).is_err());
        assert!(files
            .handle(&ResponseEvent::File("../escape".into()))
            .is_err());
        assert_eq!(files.open_file_count(), 0);
    }
}
