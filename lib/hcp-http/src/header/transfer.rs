/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

pub const fn transfer_encoding_chunked() -> &'static str {
    "Transfer-Encoding: chunked\r\n"
}
