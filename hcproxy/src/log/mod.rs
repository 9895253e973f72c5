/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

pub mod process;
pub(crate) mod task;

mod types;
pub(crate) use types::{LtDuration, LtHttpUri};
