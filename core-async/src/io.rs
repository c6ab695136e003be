//! Async I/O traits.
//!
//! Download byte streams and cache writes are expressed with these traits so
//! bridge implementations and tests can hand in any tokio-compatible reader.

pub use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
    BufWriter, ReadBuf,
};

pub use tokio_util::io::StreamReader;
