use std::io::{self, Read, Write};
use std::sync::Arc;

use super::progress::ProgressListener;
use super::sink::ByteSink;
use super::source::ByteSource;
use super::{SinkStream, SourceStream};

/// Wraps a [`ByteSource`] so every byte read fires `progress_listener.progress(..)`.
///
/// Used internally by [`crate::domain::UploadRequest`] when a progress listener
/// has been attached; adapters should not normally construct this directly.
pub struct ProgressByteSource {
    source: Arc<dyn ByteSource>,
    listener: Arc<dyn ProgressListener>,
}

impl ProgressByteSource {
    pub fn new(source: Arc<dyn ByteSource>, listener: Arc<dyn ProgressListener>) -> Self {
        ProgressByteSource { source, listener }
    }
}

impl ByteSource for ProgressByteSource {
    fn open_stream(&self) -> io::Result<Box<dyn SourceStream>> {
        let inner = self.source.open_stream()?;
        let total = self.source.length().ok();
        self.listener.set_progress_total(total);
        self.listener.progress(0);
        Ok(Box::new(ProgressReadStream {
            inner,
            listener: self.listener.clone(),
            current: 0,
        }))
    }

    fn length(&self) -> io::Result<u64> {
        self.source.length()
    }
}

struct ProgressReadStream {
    inner: Box<dyn SourceStream>,
    listener: Arc<dyn ProgressListener>,
    current: u64,
}

impl Read for ProgressReadStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.current += n as u64;
            self.listener.progress(self.current);
        }
        Ok(n)
    }
}

/// Wraps a [`ByteSink`] so every byte written fires `progress_listener.progress(..)`.
pub struct ProgressByteSink {
    sink: Arc<dyn ByteSink>,
    listener: Arc<dyn ProgressListener>,
}

impl ProgressByteSink {
    pub fn new(sink: Arc<dyn ByteSink>, listener: Arc<dyn ProgressListener>) -> Self {
        ProgressByteSink { sink, listener }
    }
}

impl ByteSink for ProgressByteSink {
    fn open_stream(&self) -> io::Result<Box<dyn SinkStream>> {
        let inner = self.sink.open_stream()?;
        Ok(Box::new(ProgressWriteStream {
            inner: Some(inner),
            listener: self.listener.clone(),
            current: 0,
        }))
    }

    fn set_expected_length(&self, length: u64) {
        self.listener.set_progress_total(Some(length));
        self.sink.set_expected_length(length);
    }
}

struct ProgressWriteStream {
    inner: Option<Box<dyn SinkStream>>,
    listener: Arc<dyn ProgressListener>,
    current: u64,
}

impl Write for ProgressWriteStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.as_mut().expect("stream already closed").write(buf)?;
        if n > 0 {
            self.current += n as u64;
            self.listener.progress(self.current);
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.as_mut().expect("stream already closed").flush()
    }
}

impl SinkStream for ProgressWriteStream {
    fn close(mut self: Box<Self>) -> io::Result<()> {
        self.inner.take().expect("stream already closed").close()
    }

    fn abort(mut self: Box<Self>) -> io::Result<()> {
        self.listener.aborted();
        self.inner.take().expect("stream already closed").abort()
    }
}

#[cfg(test)]
mod tests {
    use super::super::source::MemoryByteSource;
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingListener {
        calls: Mutex<Vec<u64>>,
    }

    impl ProgressListener for RecordingListener {
        fn progress(&self, current: u64) {
            self.calls.lock().unwrap().push(current);
        }
    }

    #[test]
    fn reports_progress_while_reading() {
        let listener = Arc::new(RecordingListener::default());
        let source = ProgressByteSource::new(
            Arc::new(MemoryByteSource::new(b"abcdef".to_vec())),
            listener.clone(),
        );
        let mut stream = source.open_stream().unwrap();
        let mut buf = [0u8; 3];
        stream.read(&mut buf).unwrap();
        stream.read(&mut buf).unwrap();
        assert_eq!(*listener.calls.lock().unwrap(), vec![0, 3, 6]);
    }
}
