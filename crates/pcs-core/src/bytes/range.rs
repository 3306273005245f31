use std::io::{self, Read};
use std::sync::Arc;

use super::source::ByteSource;
use super::SourceStream;

/// A view over a byte range of an underlying source.
///
/// Only one `RangeByteSource` should appear in a given pipeline: it consumes
/// (discards) leading bytes of the underlying stream to reach `start_offset`,
/// which only makes sense once per open stream.
pub struct RangeByteSource {
    source: Arc<dyn ByteSource>,
    start: u64,
    length: u64,
}

impl RangeByteSource {
    /// `length` of `None` means "from `start_offset` to the end of the source".
    pub fn new(
        source: Arc<dyn ByteSource>,
        start_offset: u64,
        length: Option<u64>,
    ) -> io::Result<Self> {
        let source_length = source.length()?;
        if start_offset >= source_length {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("start_offset {start_offset} is past source length {source_length}"),
            ));
        }
        let length = match length {
            Some(len) => {
                if start_offset + len > source_length {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!(
                            "range end {} is past source length {source_length}",
                            start_offset + len
                        ),
                    ));
                }
                len
            }
            None => source_length - start_offset,
        };
        Ok(RangeByteSource {
            source,
            start: start_offset,
            length,
        })
    }
}

impl ByteSource for RangeByteSource {
    fn open_stream(&self) -> io::Result<Box<dyn SourceStream>> {
        let mut inner = self.source.open_stream()?;
        if self.start > 0 {
            io::copy(&mut (&mut inner).take(self.start), &mut io::sink())?;
        }
        Ok(Box::new(inner.take(self.length)))
    }

    fn length(&self) -> io::Result<u64> {
        Ok(self.length)
    }
}

#[cfg(test)]
mod tests {
    use super::super::source::MemoryByteSource;
    use super::*;

    #[test]
    fn reads_middle_window() {
        let src: Arc<dyn ByteSource> = Arc::new(MemoryByteSource::new(b"0123456789".to_vec()));
        let range = RangeByteSource::new(src, 2, Some(4)).unwrap();
        let mut buf = Vec::new();
        range.open_stream().unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"2345");
    }

    #[test]
    fn open_ended_length_reads_to_end() {
        let src: Arc<dyn ByteSource> = Arc::new(MemoryByteSource::new(b"0123456789".to_vec()));
        let range = RangeByteSource::new(src, 7, None).unwrap();
        let mut buf = Vec::new();
        range.open_stream().unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"789");
    }

    #[test]
    fn rejects_start_past_end() {
        let src: Arc<dyn ByteSource> = Arc::new(MemoryByteSource::new(b"abc".to_vec()));
        assert!(RangeByteSource::new(src, 10, None).is_err());
    }
}
