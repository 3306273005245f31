//! The byte pipeline: source/sink factories, range windows, and progress reporting.
//!
//! Grounded on `bytes_io.py`. Sources and sinks are *factories*: `open_stream`/
//! `open_stream_for_write` may be called more than once across retries, so each
//! call must produce a fresh, independently-closeable stream and the source
//! must be able to report its length upfront (providers need `Content-Length`
//! before the first byte is sent). This mirrors why the Python version
//! separates `ByteSource` (the reusable factory) from the one-shot stream it
//! opens.

mod decorator;
mod progress;
mod range;
mod sink;
mod source;

pub use decorator::{ProgressByteSink, ProgressByteSource};
pub use progress::{NullProgressListener, ProgressListener, StdoutProgressListener};
pub use range::RangeByteSource;
pub use sink::{ByteSink, FileByteSink, MemoryByteSink};
pub use source::{ByteSource, FileByteSource, MemoryByteSource};

use std::io::{Read, Write};

/// A single-use, seekable-from-zero read stream produced by a [`ByteSource`].
pub trait SourceStream: Read + Send {}
impl<T: Read + Send> SourceStream for T {}

/// A single-use write stream produced by a [`ByteSink`].
///
/// `abort()` must be called instead of letting the stream drop when the
/// transfer fails partway through; `close()` finalizes a successful transfer.
/// Calling `close()` after `abort()` (or vice versa) is a logic error in the
/// caller and is not guarded against here, mirroring the Python contract.
pub trait SinkStream: Write + Send {
    /// Finalizes a successful write (e.g. renaming a temp file into place).
    fn close(self: Box<Self>) -> std::io::Result<()>;

    /// Abandons a partial write (e.g. deleting a temp file).
    fn abort(self: Box<Self>) -> std::io::Result<()>;
}
