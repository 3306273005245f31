use std::fs::File;
use std::io::{self, Cursor, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use super::SinkStream;

/// A factory for a single-use write stream. May be opened more than once
/// across retries.
pub trait ByteSink: Send + Sync {
    fn open_stream(&self) -> io::Result<Box<dyn SinkStream>>;

    /// Tells the sink how many bytes the upcoming write is expected to
    /// contain. May arrive after the stream has been opened, and may differ
    /// from the eventual size actually written.
    fn set_expected_length(&self, _length: u64) {}
}

/// Writes to a file on disk, with optional atomic-rename-on-success and
/// delete-on-abort semantics.
pub struct FileByteSink {
    filename: PathBuf,
    temp_name_during_writes: bool,
    delete_on_abort: bool,
    expected_length: Mutex<Option<u64>>,
}

impl FileByteSink {
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        FileByteSink {
            filename: filename.into(),
            temp_name_during_writes: false,
            delete_on_abort: false,
            expected_length: Mutex::new(None),
        }
    }

    /// Write to `<filename>.part` and atomically rename into place on a clean close.
    pub fn with_temp_name_during_writes(mut self, enabled: bool) -> Self {
        self.temp_name_during_writes = enabled;
        self
    }

    /// Delete the output file if the stream is aborted instead of closed.
    pub fn with_delete_on_abort(mut self, enabled: bool) -> Self {
        self.delete_on_abort = enabled;
        self
    }

    fn actual_filename(&self) -> PathBuf {
        if self.temp_name_during_writes {
            let mut name = self.filename.clone().into_os_string();
            name.push(".part");
            PathBuf::from(name)
        } else {
            self.filename.clone()
        }
    }
}

impl ByteSink for FileByteSink {
    fn open_stream(&self) -> io::Result<Box<dyn SinkStream>> {
        let file = File::create(self.actual_filename())?;
        Ok(Box::new(FileSinkStream {
            file: Some(file),
            final_name: self.filename.clone(),
            actual_name: self.actual_filename(),
            temp_name_during_writes: self.temp_name_during_writes,
            delete_on_abort: self.delete_on_abort,
        }))
    }

    fn set_expected_length(&self, length: u64) {
        *self.expected_length.lock().unwrap() = Some(length);
    }
}

struct FileSinkStream {
    file: Option<File>,
    final_name: PathBuf,
    actual_name: PathBuf,
    temp_name_during_writes: bool,
    delete_on_abort: bool,
}

impl Write for FileSinkStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.as_mut().expect("stream already closed").write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.as_mut().expect("stream already closed").flush()
    }
}

impl SinkStream for FileSinkStream {
    fn close(mut self: Box<Self>) -> io::Result<()> {
        self.file.take();
        if self.temp_name_during_writes {
            if self.final_name.exists() {
                std::fs::remove_file(&self.final_name)?;
            }
            std::fs::rename(&self.actual_name, &self.final_name)?;
        }
        Ok(())
    }

    fn abort(mut self: Box<Self>) -> io::Result<()> {
        self.file.take();
        if self.delete_on_abort {
            std::fs::remove_file(&self.actual_name)?;
        }
        Ok(())
    }
}

/// Writes to an in-memory buffer, retrievable after the stream closes.
pub struct MemoryByteSink {
    data: Arc<Mutex<Option<Vec<u8>>>>,
}

impl Default for MemoryByteSink {
    fn default() -> Self {
        MemoryByteSink {
            data: Arc::new(Mutex::new(None)),
        }
    }
}

impl MemoryByteSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written by the last completed stream, if any.
    pub fn bytes(&self) -> Option<Vec<u8>> {
        self.data.lock().unwrap().clone()
    }
}

impl ByteSink for MemoryByteSink {
    fn open_stream(&self) -> io::Result<Box<dyn SinkStream>> {
        Ok(Box::new(MemorySinkStream {
            buffer: Cursor::new(Vec::new()),
            data: self.data.clone(),
        }))
    }
}

struct MemorySinkStream {
    buffer: Cursor<Vec<u8>>,
    data: Arc<Mutex<Option<Vec<u8>>>>,
}

impl Write for MemorySinkStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.buffer.flush()
    }
}

impl SinkStream for MemorySinkStream {
    fn close(self: Box<Self>) -> io::Result<()> {
        *self.data.lock().unwrap() = Some(self.buffer.into_inner());
        Ok(())
    }

    fn abort(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_round_trips() {
        let sink = MemoryByteSink::new();
        let mut stream = sink.open_stream().unwrap();
        stream.write_all(b"hello").unwrap();
        stream.close().unwrap();
        assert_eq!(sink.bytes().unwrap(), b"hello");
    }

    #[test]
    fn file_sink_renames_temp_file_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");
        let sink = FileByteSink::new(&target).with_temp_name_during_writes(true);
        let mut stream = sink.open_stream().unwrap();
        stream.write_all(b"data").unwrap();
        assert!(!target.exists());
        stream.close().unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"data");
    }

    #[test]
    fn file_sink_deletes_on_abort() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");
        let sink = FileByteSink::new(&target).with_delete_on_abort(true);
        let mut stream = sink.open_stream().unwrap();
        stream.write_all(b"data").unwrap();
        stream.abort().unwrap();
        assert!(!target.exists());
    }
}
