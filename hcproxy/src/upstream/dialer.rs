/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

pub(crate) type BoxAsyncRead = Box<dyn AsyncRead + Send + Unpin>;
pub(crate) type BoxAsyncWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// Opens new byte streams to a next hop.
#[async_trait]
pub(crate) trait UpstreamDialer: Send + Sync {
    async fn dial(&self, host: &str, port: u16) -> io::Result<(BoxAsyncRead, BoxAsyncWrite)>;
}

pub(crate) struct TcpDialer {
    connect_timeout: Duration,
}

impl TcpDialer {
    pub(crate) fn new(connect_timeout: Duration) -> Self {
        TcpDialer { connect_timeout }
    }
}

#[async_trait]
impl UpstreamDialer for TcpDialer {
    async fn dial(&self, host: &str, port: u16) -> io::Result<(BoxAsyncRead, BoxAsyncWrite)> {
        let stream = match tokio::time::timeout(self.connect_timeout, TcpStream::connect((host, port)))
            .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {host}:{port} timed out"),
                ));
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("failed to set nodelay for connection to {host}:{port}: {e}");
        }
        let (r, w) = stream.into_split();
        Ok((Box::new(r), Box::new(w)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn dial_local() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut s, _) = listener.accept().await.unwrap();
            s.write_all(b"hello").await.unwrap();
        });

        let dialer = TcpDialer::new(Duration::from_secs(5));
        let (mut r, _w) = dialer.dial("127.0.0.1", port).await.unwrap();
        let mut buf = Vec::new();
        r.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"hello");
        server.await.unwrap();
    }
}
