/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncBufRead, AsyncRead, ReadBuf};

/// Pass through a `multipart/byteranges` body sent without a length.
///
/// All bytes are forwarded verbatim, the body ends after the `--<boundary>--` line.
pub struct MultipartByteRangesReader<'a, R> {
    reader: &'a mut R,
    tracker: EndLineTracker,
    finished: bool,
}

impl<'a, R> MultipartByteRangesReader<'a, R> {
    pub fn new(reader: &'a mut R, boundary: &str) -> Self {
        let mut end_line = Vec::with_capacity(boundary.len() + 4);
        end_line.extend_from_slice(b"--");
        end_line.extend_from_slice(boundary.as_bytes());
        end_line.extend_from_slice(b"--");
        MultipartByteRangesReader {
            reader,
            tracker: EndLineTracker {
                end_line,
                line: Vec::with_capacity(64),
                line_overflow: false,
            },
            finished: false,
        }
    }

    pub fn finished(&self) -> bool {
        self.finished
    }
}

struct EndLineTracker {
    end_line: Vec<u8>,
    line: Vec<u8>,
    line_overflow: bool,
}

impl EndLineTracker {
    fn track(&mut self, data: &[u8], line_end: bool) -> bool {
        if !self.line_overflow {
            if self.line.len() + data.len() > self.end_line.len() + 2 {
                self.line_overflow = true;
                self.line.clear();
            } else {
                self.line.extend_from_slice(data);
            }
        }
        if !line_end {
            return false;
        }

        let is_end = !self.line_overflow && {
            let line = self.line.strip_suffix(b"\n").unwrap_or(&self.line);
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            line == self.end_line.as_slice()
        };
        self.line.clear();
        self.line_overflow = false;
        is_end
    }
}

impl<R> AsyncRead for MultipartByteRangesReader<'_, R>
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

        while !me.finished && buf.remaining() > 0 {
            let r_buf = match Pin::new(&mut *me.reader).poll_fill_buf(cx) {
                Poll::Ready(Ok(b)) => b,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => {
                    return if old_remaining > buf.remaining() {
                        Poll::Ready(Ok(()))
                    } else {
                        Poll::Pending
                    };
                }
            };
            if r_buf.is_empty() {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "reader closed before the multipart end boundary",
                )));
            }

            let limit = r_buf.len().min(buf.remaining());
            let (found, used) = match memchr::memchr(b'\n', &r_buf[..limit]) {
                Some(p) => (true, p + 1),
                None => (false, limit),
            };
            buf.put_slice(&r_buf[..used]);
            if me.tracker.track(&r_buf[..used], found) {
                me.finished = true;
            }
            Pin::new(&mut *me.reader).consume(used);
        }
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, BufReader};

    #[tokio::test]
    async fn pass_through() {
        let body = b"--XYZ\r\n\
            Content-Type: text/plain\r\n\
            Content-Range: bytes 0-3/10\r\n\
            \r\n\
            abcd\r\n\
            --XYZ--\r\n";
        let mut content = body.to_vec();
        content.extend_from_slice(b"GET / HTTP/1.1\r\n");
        let stream = tokio_test::io::Builder::new()
            .read(&content[..20])
            .read(&content[20..])
            .build();
        let mut buf_stream = BufReader::new(stream);
        let mut reader = MultipartByteRangesReader::new(&mut buf_stream, "XYZ");
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert!(reader.finished());
        assert_eq!(out.as_slice(), body.as_slice());

        let mut left = Vec::new();
        buf_stream.read_to_end(&mut left).await.unwrap();
        assert_eq!(left.as_slice(), b"GET / HTTP/1.1\r\n");
    }

    #[tokio::test]
    async fn closed_early() {
        let stream = tokio_test::io::Builder::new()
            .read(b"--XYZ\r\nabcd\r\n")
            .build();
        let mut buf_stream = BufReader::new(stream);
        let mut reader = MultipartByteRangesReader::new(&mut buf_stream, "XYZ");
        let mut out = Vec::new();
        let e = reader.read_to_end(&mut out).await.unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof);
    }
}
