/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

pub const fn connection_as_bytes(close: bool) -> &'static [u8] {
    if close {
        b"Connection: Close\r\n"
    } else {
        b"Connection: Keep-Alive\r\n"
    }
}

pub const fn proxy_connection_as_bytes(close: bool) -> &'static [u8] {
    if close {
        b"Proxy-Connection: Close\r\n"
    } else {
        b"Proxy-Connection: Keep-Alive\r\n"
    }
}
