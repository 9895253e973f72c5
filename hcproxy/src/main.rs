/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use anyhow::Context;
use log::{debug, error, info};

use hcproxy::ProxyContext;

fn main() -> anyhow::Result<()> {
    let Some(proc_args) =
        hcproxy::opts::parse_clap().context("failed to parse command line options")?
    else {
        return Ok(());
    };

    // set up process logger early, only proc args is used inside
    let _log_guard =
        hcproxy::setup_process_log(proc_args.verbose_level).context("failed to setup logger")?;

    let config = hcproxy::config::load(&proc_args.config_file)
        .context(format!("failed to load config, opts: {:?}", &proc_args))?;
    debug!("loaded config from {}", proc_args.config_file.display());

    if proc_args.test_config {
        info!("the format of the config file is ok");
        return Ok(());
    }

    match tokio_run(config) {
        Ok(_) => Ok(()),
        Err(e) => {
            error!("{:?}", e);
            Err(e)
        }
    }
}

fn tokio_run(config: hcproxy::config::ProxyConfig) -> anyhow::Result<()> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(n) = config.server.worker_threads {
        builder.worker_threads(n);
    }
    let rt = builder
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    let ctx = Arc::new(ProxyContext::new(config));
    rt.block_on(hcproxy::serve::run(ctx))
}
