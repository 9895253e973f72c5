/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

pub mod config;
pub mod opts;
pub mod serve;

mod auth;
mod build;
mod context;
mod coordinator;
pub mod filter;
mod log;
mod response;
mod stats;
mod tunnel;
mod upstream;

pub use context::ProxyContext;
pub use log::process::setup as setup_process_log;
