/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

mod http;
mod net;
mod primary;
mod regex;

pub use self::http::{as_header_line, as_http_header_name, as_status_code};
pub use self::regex::as_regex;
pub use net::{as_sockaddr, as_upstream_addr};
pub use primary::{as_bool, as_list, as_string, as_u32, as_usize};
