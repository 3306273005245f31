use std::fs::File;
use std::io::Cursor;
use std::path::PathBuf;

use super::SourceStream;

/// A factory for a single-use, seekable-from-zero read stream, plus the
/// stream's total length (needed upfront so adapters can set `Content-Length`
/// before the first byte is sent).
pub trait ByteSource: Send + Sync {
    /// Opens a fresh read stream. May be called more than once across retries.
    fn open_stream(&self) -> std::io::Result<Box<dyn SourceStream>>;

    /// Total number of bytes this source will yield.
    fn length(&self) -> std::io::Result<u64>;
}

/// A byte source backed by a file on disk.
pub struct FileByteSource {
    filename: PathBuf,
}

impl FileByteSource {
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        FileByteSource {
            filename: filename.into(),
        }
    }
}

impl ByteSource for FileByteSource {
    fn open_stream(&self) -> std::io::Result<Box<dyn SourceStream>> {
        Ok(Box::new(File::open(&self.filename)?))
    }

    fn length(&self) -> std::io::Result<u64> {
        Ok(std::fs::metadata(&self.filename)?.len())
    }
}

impl std::fmt::Display for FileByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FileByteSource {:?}", self.filename)
    }
}

/// A byte source backed by an in-memory buffer.
pub struct MemoryByteSource {
    data: Vec<u8>,
}

impl MemoryByteSource {
    pub fn new(data: Vec<u8>) -> Self {
        MemoryByteSource { data }
    }
}

impl ByteSource for MemoryByteSource {
    fn open_stream(&self) -> std::io::Result<Box<dyn SourceStream>> {
        Ok(Box::new(Cursor::new(self.data.clone())))
    }

    fn length(&self) -> std::io::Result<u64> {
        Ok(self.data.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn memory_source_reports_length_and_content() {
        let src = MemoryByteSource::new(b"hello".to_vec());
        assert_eq!(src.length().unwrap(), 5);
        let mut buf = Vec::new();
        src.open_stream().unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hello");
    }

    #[test]
    fn file_source_reports_length_and_content() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        tmp.write_all(b"contents").unwrap();
        let src = FileByteSource::new(tmp.path());
        assert_eq!(src.length().unwrap(), 8);
        let mut buf = Vec::new();
        src.open_stream().unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"contents");
    }
}
