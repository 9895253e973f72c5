/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncRead, ReadBuf};

use crate::parse::{HttpChunkedLine, HttpLineParseError};

#[derive(Debug, Error)]
pub enum HttpChunkError {
    #[error("bad chunk size line: {0}")]
    BadChunkLine(#[from] HttpLineParseError),
    #[error("bad chunk: no CRLF after chunk data")]
    BadChunkEnd,
    #[error("bad chunk: invalid trailer line")]
    BadTrailer,
    #[error("chunk line too long (> {0})")]
    LineTooLong(usize),
}

impl From<HttpChunkError> for io::Error {
    fn from(e: HttpChunkError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, e)
    }
}

enum DecodeState {
    ChunkSize,
    ChunkData(u64),
    ChunkDataEnd,
    Trailer,
    Done,
}

struct ChunkedDecodeReaderInternal {
    body_line_max_size: usize,
    state: DecodeState,
    line: Vec<u8>,
    in_extension: bool,
    extension_last_byte: u8,
    chunk_end_cr: bool,
}

impl ChunkedDecodeReaderInternal {
    fn new(body_line_max_size: usize) -> Self {
        ChunkedDecodeReaderInternal {
            body_line_max_size,
            state: DecodeState::ChunkSize,
            line: Vec::with_capacity(32),
            in_extension: false,
            extension_last_byte: 0,
            chunk_end_cr: false,
        }
    }

    fn finished(&self) -> bool {
        matches!(self.state, DecodeState::Done)
    }

    fn poll_size_line<R>(
        &mut self,
        cx: &mut Context<'_>,
        mut reader: Pin<&mut R>,
    ) -> Poll<io::Result<()>>
    where
        R: AsyncBufRead + Unpin,
    {
        loop {
            let r_buf = ready!(reader.as_mut().poll_fill_buf(cx))?;
            if r_buf.is_empty() {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "reader closed while reading chunk size line",
                )));
            }
            let (found, used) = match memchr::memchr(b'\n', r_buf) {
                Some(p) => (true, p + 1),
                None => (false, r_buf.len()),
            };

            if self.in_extension {
                // extension content is discarded, only the line ending is kept for the check
                let content = if found { &r_buf[..used - 1] } else { r_buf };
                if let Some(c) = content.last() {
                    self.extension_last_byte = *c;
                }
                reader.as_mut().consume(used);
                if found {
                    if self.extension_last_byte == b'\r' {
                        self.line.extend_from_slice(b"\r\n");
                    } else {
                        self.line.push(b'\n');
                    }
                    return Poll::Ready(Ok(()));
                }
                continue;
            }

            if let Some(p) = memchr::memchr(b';', &r_buf[..used]) {
                if self.line.len() + p + 1 > self.body_line_max_size {
                    return Poll::Ready(Err(HttpChunkError::LineTooLong(
                        self.body_line_max_size,
                    )
                    .into()));
                }
                self.line.extend_from_slice(&r_buf[..=p]);
                reader.as_mut().consume(p + 1);
                self.in_extension = true;
                self.extension_last_byte = b';';
                continue;
            }

            if self.line.len() + used > self.body_line_max_size {
                return Poll::Ready(Err(HttpChunkError::LineTooLong(
                    self.body_line_max_size,
                )
                .into()));
            }
            self.line.extend_from_slice(&r_buf[..used]);
            reader.as_mut().consume(used);
            if found {
                return Poll::Ready(Ok(()));
            }
        }
    }

    fn poll_trailer_line<R>(
        &mut self,
        cx: &mut Context<'_>,
        mut reader: Pin<&mut R>,
    ) -> Poll<io::Result<()>>
    where
        R: AsyncBufRead + Unpin,
    {
        loop {
            let r_buf = ready!(reader.as_mut().poll_fill_buf(cx))?;
            if r_buf.is_empty() {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "reader closed while reading chunk trailer",
                )));
            }
            let (found, used) = match memchr::memchr(b'\n', r_buf) {
                Some(p) => (true, p + 1),
                None => (false, r_buf.len()),
            };
            if self.line.len() + used > self.body_line_max_size {
                return Poll::Ready(Err(HttpChunkError::LineTooLong(
                    self.body_line_max_size,
                )
                .into()));
            }
            self.line.extend_from_slice(&r_buf[..used]);
            reader.as_mut().consume(used);
            if found {
                return Poll::Ready(Ok(()));
            }
        }
    }

    fn poll_decode<R>(
        &mut self,
        cx: &mut Context<'_>,
        mut reader: Pin<&mut R>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>>
    where
        R: AsyncBufRead + Unpin,
    {
        // keep looping over chunks while data is buffered, so that many small chunks
        // are delivered as one block
        loop {
            match self.state {
                DecodeState::Done => return Poll::Ready(Ok(())),
                DecodeState::ChunkSize => {
                    ready!(self.poll_size_line(cx, reader.as_mut()))?;
                    let chunk = HttpChunkedLine::parse(&self.line).map_err(HttpChunkError::from)?;
                    self.line.clear();
                    self.in_extension = false;
                    if chunk.chunk_size == 0 {
                        self.state = DecodeState::Trailer;
                    } else {
                        self.state = DecodeState::ChunkData(chunk.chunk_size);
                    }
                }
                DecodeState::ChunkData(left) => {
                    if buf.remaining() == 0 {
                        return Poll::Ready(Ok(()));
                    }

                    let r_buf = ready!(reader.as_mut().poll_fill_buf(cx))?;
                    if r_buf.is_empty() {
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "reader closed while reading chunk data",
                        )));
                    }
                    let to_copy = usize::try_from(left)
                        .unwrap_or(usize::MAX)
                        .min(r_buf.len())
                        .min(buf.remaining());
                    buf.put_slice(&r_buf[..to_copy]);
                    reader.as_mut().consume(to_copy);
                    let left = left - to_copy as u64;
                    if left == 0 {
                        self.state = DecodeState::ChunkDataEnd;
                    } else {
                        self.state = DecodeState::ChunkData(left);
                    }
                }
                DecodeState::ChunkDataEnd => {
                    let r_buf = ready!(reader.as_mut().poll_fill_buf(cx))?;
                    if r_buf.is_empty() {
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "reader closed while reading chunk data end",
                        )));
                    }
                    if self.chunk_end_cr {
                        if r_buf[0] != b'\n' {
                            return Poll::Ready(Err(HttpChunkError::BadChunkEnd.into()));
                        }
                        reader.as_mut().consume(1);
                        self.chunk_end_cr = false;
                        self.state = DecodeState::ChunkSize;
                    } else {
                        if r_buf[0] != b'\r' {
                            return Poll::Ready(Err(HttpChunkError::BadChunkEnd.into()));
                        }
                        reader.as_mut().consume(1);
                        self.chunk_end_cr = true;
                    }
                }
                DecodeState::Trailer => {
                    ready!(self.poll_trailer_line(cx, reader.as_mut()))?;
                    if !self.line.ends_with(b"\r\n") {
                        return Poll::Ready(Err(HttpChunkError::BadTrailer.into()));
                    }
                    let is_end = self.line.len() == 2;
                    self.line.clear();
                    if is_end {
                        self.state = DecodeState::Done;
                    }
                }
            }
        }
    }
}

/// Decode a chunked body, the output contains only the chunk data.
pub struct ChunkedDecodeReader<'a, R> {
    reader: &'a mut R,
    internal: ChunkedDecodeReaderInternal,
}

impl<'a, R> ChunkedDecodeReader<'a, R> {
    pub fn new(reader: &'a mut R, body_line_max_size: usize) -> Self {
        ChunkedDecodeReader {
            reader,
            internal: ChunkedDecodeReaderInternal::new(body_line_max_size),
        }
    }

    pub fn finished(&self) -> bool {
        self.internal.finished()
    }
}

impl<R> AsyncRead for ChunkedDecodeReader<'_, R>
where
    R: AsyncBufRead + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let me = &mut *self;

        let old_remaining = buf.remaining();
        match me.internal.poll_decode(cx, Pin::new(&mut *me.reader), buf) {
            Poll::Pending => {
                if old_remaining > buf.remaining() {
                    Poll::Ready(Ok(()))
                } else {
                    Poll::Pending
                }
            }
            Poll::Ready(r) => Poll::Ready(r),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, BufReader};

    async fn decode_all(stream: tokio_test::io::Mock) -> io::Result<Vec<u8>> {
        let mut buf_stream = BufReader::new(stream);
        let mut decoder = ChunkedDecodeReader::new(&mut buf_stream, 1024);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).await?;
        assert!(decoder.finished());
        Ok(out)
    }

    #[tokio::test]
    async fn single_chunk() {
        let stream = tokio_test::io::Builder::new()
            .read(b"5\r\nhello\r\n0\r\n\r\n")
            .build();
        let data = decode_all(stream).await.unwrap();
        assert_eq!(data.as_slice(), b"hello");
    }

    #[tokio::test]
    async fn split_everywhere() {
        let stream = tokio_test::io::Builder::new()
            .read(b"5")
            .read(b";ext=1")
            .read(b"\r")
            .read(b"\nhel")
            .read(b"lo\r")
            .read(b"\n1")
            .read(b"0\r\n0123456789abcdef\r\n0\r")
            .read(b"\nX-Trailer: a\r\n\r")
            .read(b"\n")
            .build();
        let data = decode_all(stream).await.unwrap();
        assert_eq!(data.as_slice(), b"hello0123456789abcdef");
    }

    #[tokio::test]
    async fn coalesce_small_chunks() {
        let mut content = Vec::new();
        for _ in 0..1000 {
            content.extend_from_slice(b"1\r\na\r\n");
        }
        content.extend_from_slice(b"0\r\n\r\n");
        let stream = tokio_test::io::Builder::new().read(&content).build();
        let mut buf_stream = BufReader::with_capacity(content.len(), stream);
        let mut decoder = ChunkedDecodeReader::new(&mut buf_stream, 1024);

        let mut buf = [0u8; 2048];
        let len = decoder.read(&mut buf).await.unwrap();
        assert_eq!(len, 1000);
        assert!(buf[..len].iter().all(|c| *c == b'a'));
        let len = decoder.read(&mut buf).await.unwrap();
        assert_eq!(len, 0);
        assert!(decoder.finished());
    }

    #[tokio::test]
    async fn lone_lf_after_data() {
        let stream = tokio_test::io::Builder::new()
            .read(b"5\r\nhello\n0\r\n\r\n")
            .build();
        let e = decode_all(stream).await.unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn lone_lf_in_size_line() {
        let stream = tokio_test::io::Builder::new()
            .read(b"5\nhello\r\n0\r\n\r\n")
            .build();
        let e = decode_all(stream).await.unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn lone_lf_after_extension() {
        let stream = tokio_test::io::Builder::new()
            .read(b"5;a=b\nhello\r\n0\r\n\r\n")
            .build();
        let e = decode_all(stream).await.unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn truncated() {
        let stream = tokio_test::io::Builder::new().read(b"5\r\nhel").build();
        let e = decode_all(stream).await.unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn long_extension_is_not_limited() {
        let mut content = b"3;".to_vec();
        content.extend(std::iter::repeat_n(b'x', 4096));
        content.extend_from_slice(b"\r\nabc\r\n0\r\n\r\n");
        let stream = tokio_test::io::Builder::new().read(&content).build();
        let data = decode_all(stream).await.unwrap();
        assert_eq!(data.as_slice(), b"abc");
    }

    #[tokio::test]
    async fn too_long_size_line() {
        let mut content = vec![b'0'; 2048];
        content.extend_from_slice(b"1\r\na\r\n0\r\n\r\n");
        let stream = tokio_test::io::Builder::new().read(&content).build();
        let e = decode_all(stream).await.unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::InvalidData);
    }
}
