/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

mod io;
pub use io::{LimitedBufReadExt, LimitedReadUntil};

mod parse;
pub use parse::{
    HttpChunkedLine, HttpHeaderLine, HttpLineParseError, HttpMethodLine, HttpStatusLine,
};

mod body;
pub use body::{
    BodyCopyError, ChunkedDecodeReader, ChunkedEncodeTransfer, HttpBodyReader, HttpBodyType,
    HttpChunkError, MultipartByteRangesReader, copy_body,
};

mod range;
pub use range::{
    HttpByteRange, HttpContentRange, MAX_RANGE_PARTS, RangeParseError, parse_range_header,
};

pub mod client;
pub mod header;
pub mod server;

mod hop;
pub use hop::{is_hop_by_hop_header, remove_hop_by_hop_headers};
