/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::io::{AsyncBufRead, AsyncRead, ReadBuf};

use super::{ChunkedDecodeReader, HttpBodyType, MultipartByteRangesReader};

enum BodyReaderInner<'a, R> {
    ContentLength { reader: &'a mut R, left: u64 },
    Chunked(ChunkedDecodeReader<'a, R>),
    ReadUntilEnd { reader: &'a mut R, finished: bool },
    MultipartByteRanges(MultipartByteRangesReader<'a, R>),
}

/// Read the decoded body of a HTTP message.
pub struct HttpBodyReader<'a, R> {
    inner: BodyReaderInner<'a, R>,
}

impl<'a, R> HttpBodyReader<'a, R> {
    pub fn new(reader: &'a mut R, body_type: &HttpBodyType, body_line_max_size: usize) -> Self {
        let inner = match body_type {
            HttpBodyType::ContentLength(len) => BodyReaderInner::ContentLength {
                reader,
                left: *len,
            },
            HttpBodyType::Chunked => {
                BodyReaderInner::Chunked(ChunkedDecodeReader::new(reader, body_line_max_size))
            }
            HttpBodyType::ReadUntilEnd => BodyReaderInner::ReadUntilEnd {
                reader,
                finished: false,
            },
            HttpBodyType::MultipartByteRanges(boundary) => BodyReaderInner::MultipartByteRanges(
                MultipartByteRangesReader::new(reader, boundary),
            ),
        };
        HttpBodyReader { inner }
    }

    pub fn finished(&self) -> bool {
        match &self.inner {
            BodyReaderInner::ContentLength { left, .. } => *left == 0,
            BodyReaderInner::Chunked(r) => r.finished(),
            BodyReaderInner::ReadUntilEnd { finished, .. } => *finished,
            BodyReaderInner::MultipartByteRanges(r) => r.finished(),
        }
    }
}

impl<R> AsyncRead for HttpBodyReader<'_, R>
where
    R: AsyncBufRead + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.inner {
            BodyReaderInner::ContentLength { reader, left } => {
                if *left == 0 || buf.remaining() == 0 {
                    return Poll::Ready(Ok(()));
                }
                let r_buf = ready!(Pin::new(&mut **reader).poll_fill_buf(cx))?;
                if r_buf.is_empty() {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "reader closed while reading sized body",
                    )));
                }
                let to_copy = usize::try_from(*left)
                    .unwrap_or(usize::MAX)
                    .min(r_buf.len())
                    .min(buf.remaining());
                buf.put_slice(&r_buf[..to_copy]);
                Pin::new(&mut **reader).consume(to_copy);
                *left -= to_copy as u64;
                Poll::Ready(Ok(()))
            }
            BodyReaderInner::Chunked(r) => Pin::new(r).poll_read(cx, buf),
            BodyReaderInner::ReadUntilEnd { reader, finished } => {
                if *finished {
                    return Poll::Ready(Ok(()));
                }
                let old_remaining = buf.remaining();
                ready!(Pin::new(&mut **reader).poll_read(cx, buf))?;
                if old_remaining == buf.remaining() && old_remaining > 0 {
                    *finished = true;
                }
                Poll::Ready(Ok(()))
            }
            BodyReaderInner::MultipartByteRanges(r) => Pin::new(r).poll_read(cx, buf),
        }
    }
}
