/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::io::{AsyncBufRead, AsyncWrite};

use super::BodyCopyError;

struct ChunkedEncodeTransferInternal {
    yield_size: usize,
    left_chunk_size: usize,
    static_header: Vec<u8>,
    static_offset: usize,
    total_write: u64,
    read_finished: bool,
}

impl ChunkedEncodeTransferInternal {
    fn new(yield_size: usize) -> Self {
        ChunkedEncodeTransferInternal {
            yield_size,
            left_chunk_size: 0,
            static_header: Vec::with_capacity(16),
            static_offset: 0,
            total_write: 0,
            read_finished: false,
        }
    }

    fn poll_encode<R, W>(
        &mut self,
        cx: &mut Context<'_>,
        mut reader: Pin<&mut R>,
        mut writer: Pin<&mut W>,
    ) -> Poll<Result<u64, BodyCopyError>>
    where
        R: AsyncBufRead,
        W: AsyncWrite,
    {
        let mut copy_this_round = 0usize;
        loop {
            if self.static_offset >= self.static_header.len()
                && self.left_chunk_size == 0
                && !self.read_finished
            {
                let data = ready!(reader.as_mut().poll_fill_buf(cx))
                    .map_err(BodyCopyError::ReadFailed)?;
                self.static_header.clear();
                let chunk_size = data.len();
                // the CRLF after each chunk data is sent together with the next chunk header
                if chunk_size == 0 {
                    self.read_finished = true;
                    if self.total_write == 0 {
                        let _ = write!(&mut self.static_header, "0\r\n\r\n");
                    } else {
                        let _ = write!(&mut self.static_header, "\r\n0\r\n\r\n");
                    }
                } else if self.total_write == 0 {
                    let _ = write!(&mut self.static_header, "{chunk_size:x}\r\n");
                } else {
                    let _ = write!(&mut self.static_header, "\r\n{chunk_size:x}\r\n");
                }
                self.static_offset = 0;
                self.left_chunk_size = chunk_size;
            }

            while self.static_offset < self.static_header.len() {
                let nw = ready!(
                    writer
                        .as_mut()
                        .poll_write(cx, &self.static_header[self.static_offset..])
                )
                .map_err(BodyCopyError::WriteFailed)?;
                if nw == 0 {
                    return Poll::Ready(Err(BodyCopyError::WriteFailed(
                        std::io::ErrorKind::WriteZero.into(),
                    )));
                }
                self.static_offset += nw;
                self.total_write += nw as u64;
            }
            if self.read_finished {
                return Poll::Ready(Ok(self.total_write));
            }

            while self.left_chunk_size > 0 {
                let data = ready!(reader.as_mut().poll_fill_buf(cx))
                    .map_err(BodyCopyError::ReadFailed)?;
                let to_write = self.left_chunk_size.min(data.len());
                if to_write == 0 {
                    return Poll::Ready(Err(BodyCopyError::ReadFailed(
                        std::io::ErrorKind::UnexpectedEof.into(),
                    )));
                }
                let nw = ready!(writer.as_mut().poll_write(cx, &data[..to_write]))
                    .map_err(BodyCopyError::WriteFailed)?;
                if nw == 0 {
                    return Poll::Ready(Err(BodyCopyError::WriteFailed(
                        std::io::ErrorKind::WriteZero.into(),
                    )));
                }
                reader.as_mut().consume(nw);
                copy_this_round += nw;
                self.left_chunk_size -= nw;
                self.total_write += nw as u64;
            }

            if copy_this_round >= self.yield_size {
                cx.waker().wake_by_ref();
                return Poll::Pending;
            }
        }
    }

    #[inline]
    fn finished(&self) -> bool {
        self.read_finished && self.static_offset >= self.static_header.len()
    }
}

/// Encode all data from `reader` as a chunked body into `writer`.
///
/// Each chunk is `hex(len)\r\n<data>\r\n`, the body ends with `0\r\n\r\n`.
/// The output is the number of bytes written, including the framing bytes.
pub struct ChunkedEncodeTransfer<'a, R, W> {
    reader: &'a mut R,
    writer: &'a mut W,
    internal: ChunkedEncodeTransferInternal,
}

impl<'a, R, W> ChunkedEncodeTransfer<'a, R, W> {
    pub fn new(reader: &'a mut R, writer: &'a mut W, yield_size: usize) -> Self {
        ChunkedEncodeTransfer {
            reader,
            writer,
            internal: ChunkedEncodeTransferInternal::new(yield_size),
        }
    }

    pub fn finished(&self) -> bool {
        self.internal.finished()
    }
}

impl<R, W> Future for ChunkedEncodeTransfer<'_, R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    type Output = Result<u64, BodyCopyError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let me = &mut *self;

        me.internal.poll_encode(
            cx,
            Pin::new(&mut *me.reader),
            Pin::new(&mut *me.writer),
        )
    }
}
