//! Stream (TCP) side of the transport: dialing with a deadline and the
//! line-oriented token reader shared by every protocol worker.

use crate::{CHUNK_SIZE, MAX_TOKEN, TransportError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, ToSocketAddrs};

/// Dials `addr`, failing with [`TransportError::Timeout`] if the connection
/// is not established within `deadline`.
pub async fn connect<A: ToSocketAddrs>(
    addr: A,
    deadline: Duration,
) -> Result<TcpStream, TransportError> {
    match tokio::time::timeout(deadline, TcpStream::connect(addr)).await {
        Ok(stream) => Ok(stream?),
        Err(_) => Err(TransportError::Timeout),
    }
}

/// Buffered reader for the line-oriented half of the protocol.
///
/// Tokens are read up to (and excluding) any byte of a separator set; the
/// separator itself is consumed. The reader never consumes past the
/// separator, so a raw file body following a header stays readable through
/// the same reader via [`LineReader::copy_exact`] or
/// [`LineReader::read_byte`].
pub struct LineReader<R> {
    inner: BufReader<R>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
        }
    }

    /// Reads one token terminated by any byte in `seps`.
    ///
    /// The terminating separator is consumed but not returned. Yields
    /// [`TransportError::Closed`] if the stream ends before a separator and
    /// [`TransportError::TokenTooLong`] past [`MAX_TOKEN`] bytes.
    pub async fn read_token(&mut self, seps: &[u8]) -> Result<String, TransportError> {
        let mut token = Vec::new();
        loop {
            let (consumed, done) = {
                let buf = self.inner.fill_buf().await?;
                if buf.is_empty() {
                    return Err(TransportError::Closed);
                }
                match buf.iter().position(|b| seps.contains(b)) {
                    Some(at) => {
                        token.extend_from_slice(&buf[..at]);
                        (at + 1, true)
                    }
                    None => {
                        token.extend_from_slice(buf);
                        (buf.len(), false)
                    }
                }
            };
            self.inner.consume(consumed);
            if token.len() > MAX_TOKEN {
                return Err(TransportError::TokenTooLong(MAX_TOKEN));
            }
            if done {
                return String::from_utf8(token).map_err(|_| TransportError::NotUtf8);
            }
        }
    }

    /// Reads a single byte, typically the separator after a file body.
    pub async fn read_byte(&mut self) -> Result<u8, TransportError> {
        let byte = {
            let buf = self.inner.fill_buf().await?;
            if buf.is_empty() {
                return Err(TransportError::Closed);
            }
            buf[0]
        };
        self.inner.consume(1);
        Ok(byte)
    }

    /// Copies exactly `len` payload bytes into `dst`, moving at most
    /// [`CHUNK_SIZE`] bytes per read.
    pub async fn copy_exact<W: AsyncWrite + Unpin>(
        &mut self,
        dst: &mut W,
        len: u64,
    ) -> Result<(), TransportError> {
        let mut chunk = [0u8; CHUNK_SIZE];
        let mut remaining = len;
        while remaining > 0 {
            let want = remaining.min(CHUNK_SIZE as u64) as usize;
            let got = self.inner.read(&mut chunk[..want]).await?;
            if got == 0 {
                return Err(TransportError::Closed);
            }
            dst.write_all(&chunk[..got]).await?;
            remaining -= got as u64;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(bytes: &[u8]) -> LineReader<&[u8]> {
        LineReader::new(bytes)
    }

    #[tokio::test]
    async fn token_stops_at_any_separator() {
        let mut r = reader(b"AUT 12345 abcd1234\n");
        assert_eq!(r.read_token(b" \n").await.unwrap(), "AUT");
        assert_eq!(r.read_token(b" ").await.unwrap(), "12345");
        assert_eq!(r.read_token(b"\n").await.unwrap(), "abcd1234");
    }

    #[tokio::test]
    async fn raw_bytes_survive_token_reads() {
        // Header tokens followed by a 5-byte body and the trailing newline.
        let mut r = reader(b"f.bin 5 \x00\x01\x02\x03\x04\n");
        assert_eq!(r.read_token(b" ").await.unwrap(), "f.bin");
        assert_eq!(r.read_token(b" ").await.unwrap(), "5");
        let mut body = Vec::new();
        r.copy_exact(&mut body, 5).await.unwrap();
        assert_eq!(body, [0, 1, 2, 3, 4]);
        assert_eq!(r.read_byte().await.unwrap(), b'\n');
    }

    #[tokio::test]
    async fn empty_token_when_separator_leads() {
        let mut r = reader(b" x\n");
        assert_eq!(r.read_token(b" ").await.unwrap(), "");
        assert_eq!(r.read_token(b"\n").await.unwrap(), "x");
    }

    #[tokio::test]
    async fn eof_is_closed() {
        let mut r = reader(b"dangling");
        assert!(matches!(
            r.read_token(b"\n").await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn oversized_token_is_rejected() {
        let big = vec![b'a'; MAX_TOKEN + 1];
        let mut r = LineReader::new(big.as_slice());
        assert!(matches!(
            r.read_token(b"\n").await,
            Err(TransportError::TokenTooLong(_))
        ));
    }

    #[tokio::test]
    async fn copy_exact_of_zero_bytes_reads_nothing() {
        let mut r = reader(b"\n");
        let mut out = Vec::new();
        r.copy_exact(&mut out, 0).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(r.read_byte().await.unwrap(), b'\n');
    }
}
