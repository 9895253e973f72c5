/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::io;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

mod chunked_decoder;
pub use chunked_decoder::{ChunkedDecodeReader, HttpChunkError};

mod chunked_encoder;
pub use chunked_encoder::ChunkedEncodeTransfer;

mod multipart;
pub use multipart::MultipartByteRangesReader;

mod reader;
pub use reader::HttpBodyReader;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HttpBodyType {
    ContentLength(u64),
    Chunked,
    ReadUntilEnd,
    /// `multipart/byteranges` sent without a length, ends at the closing boundary line
    MultipartByteRanges(String),
}

#[derive(Debug, Error)]
pub enum BodyCopyError {
    #[error("read failed: {0:?}")]
    ReadFailed(io::Error),
    #[error("write failed: {0:?}")]
    WriteFailed(io::Error),
}

/// Copy all data from `reader` to `writer` without any framing.
pub async fn copy_body<R, W>(reader: &mut R, writer: &mut W) -> Result<u64, BodyCopyError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut total: u64 = 0;
    loop {
        let data = reader.fill_buf().await.map_err(BodyCopyError::ReadFailed)?;
        if data.is_empty() {
            return Ok(total);
        }
        let len = data.len();
        writer
            .write_all(data)
            .await
            .map_err(BodyCopyError::WriteFailed)?;
        reader.consume(len);
        total += len as u64;
    }
}
