/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::io::{self, Write};

use http::{StatusCode, Version};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use hcp_http::server::HttpRequestParseError;

use crate::serve::ServerTaskError;

/// A response generated by the proxy itself.
pub(crate) struct HttpProxyClientResponse {
    status: StatusCode,
    version: Version,
    close: bool,
    extra_headers: Vec<String>,
    detail: Option<String>,
}

impl HttpProxyClientResponse {
    const RESPONSE_BUFFER_SIZE: usize = 1024;

    pub(crate) fn status(&self) -> u16 {
        self.status.as_u16()
    }

    pub(crate) fn from_standard(status: StatusCode, version: Version, close: bool) -> Self {
        HttpProxyClientResponse {
            status,
            version,
            close,
            extra_headers: Vec::new(),
            detail: None,
        }
    }

    pub(crate) fn add_extra_header(&mut self, line: String) {
        self.extra_headers.push(line);
    }

    pub(crate) fn set_detail(&mut self, detail: String) {
        self.detail = Some(detail);
    }

    #[inline]
    pub(crate) fn gateway_timeout(version: Version, close: bool) -> Self {
        HttpProxyClientResponse::from_standard(StatusCode::GATEWAY_TIMEOUT, version, close)
    }

    pub(crate) fn need_login(version: Version, close: bool, realm: &str) -> Self {
        let mut response =
            HttpProxyClientResponse::from_standard(StatusCode::UNAUTHORIZED, version, close);
        response.add_extra_header(hcp_http::header::www_authenticate_basic(realm));
        response
    }

    pub(crate) fn need_proxy_login(version: Version, close: bool, realm: &str) -> Self {
        let mut response = HttpProxyClientResponse::from_standard(
            StatusCode::PROXY_AUTHENTICATION_REQUIRED,
            version,
            close,
        );
        response.add_extra_header(hcp_http::header::proxy_authenticate_basic(realm));
        response
    }

    pub(crate) fn range_not_satisfiable(version: Version, close: bool, total: u64) -> Self {
        let mut response = HttpProxyClientResponse::from_standard(
            StatusCode::RANGE_NOT_SATISFIABLE,
            version,
            close,
        );
        response.add_extra_header(hcp_http::header::content_range_overflowed(total));
        response
    }

    pub(crate) fn from_request_error(e: &HttpRequestParseError, version: Version) -> Option<Self> {
        e.status_code()
            .map(|status| HttpProxyClientResponse::from_standard(status, version, true))
    }

    pub(crate) fn from_task_err(
        e: &ServerTaskError,
        version: Version,
        should_close: bool,
    ) -> Option<Self> {
        let close = should_close; // no reuse of the connection if there's body pending
        let r = match e {
            ServerTaskError::InternalServerError(_) => {
                let mut r = HttpProxyClientResponse::from_standard(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    version,
                    true,
                );
                r.set_detail(e.to_string());
                r
            }
            ServerTaskError::InvalidClientProtocol(_) => {
                HttpProxyClientResponse::from_standard(StatusCode::BAD_REQUEST, version, true)
            }
            ServerTaskError::ClientRequestLineTooLong => {
                HttpProxyClientResponse::from_standard(StatusCode::URI_TOO_LONG, version, true)
            }
            ServerTaskError::ClientHeaderTooLarge => HttpProxyClientResponse::from_standard(
                StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
                version,
                true,
            ),
            ServerTaskError::UnimplementedProtocol => {
                HttpProxyClientResponse::from_standard(StatusCode::NOT_IMPLEMENTED, version, true)
            }
            ServerTaskError::ForbiddenByRule(status) => {
                HttpProxyClientResponse::from_standard(*status, version, close)
            }
            ServerTaskError::UnsupportedExpectation => {
                HttpProxyClientResponse::from_standard(StatusCode::EXPECTATION_FAILED, version, close)
            }
            ServerTaskError::ClientAuthFailed => {
                // replied with the realm in the auth stage
                return None;
            }
            ServerTaskError::UpstreamNotConnected(_) | ServerTaskError::UpstreamAppTimeout(_) => {
                HttpProxyClientResponse::gateway_timeout(version, close)
            }
            ServerTaskError::InvalidUpstreamProtocol(_)
            | ServerTaskError::UpstreamReadFailed(_)
            | ServerTaskError::UpstreamWriteFailed(_)
            | ServerTaskError::ClosedByUpstream => {
                HttpProxyClientResponse::from_standard(StatusCode::BAD_GATEWAY, version, true)
            }
            ServerTaskError::ClientAppTimeout(_) => {
                HttpProxyClientResponse::from_standard(StatusCode::REQUEST_TIMEOUT, version, true)
            }
            ServerTaskError::ClientTcpReadFailed(_)
            | ServerTaskError::ClientTcpWriteFailed(_)
            | ServerTaskError::ClosedEarlyByClient => return None,
        };
        Some(r)
    }

    #[inline]
    pub(crate) fn should_close(&self) -> bool {
        self.close
    }

    fn canonical_reason(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("Unknown")
    }

    pub(crate) async fn reply_ok_to_connect<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut header = Vec::<u8>::with_capacity(Self::RESPONSE_BUFFER_SIZE);
        write!(header, "{:?} 200 Connection established\r\n", self.version)?;
        for line in &self.extra_headers {
            header.extend_from_slice(line.as_bytes());
        }
        header.extend_from_slice(b"\r\n");
        writer.write_all(header.as_ref()).await?;
        writer.flush().await?;
        Ok(())
    }

    pub(crate) async fn reply_continue<W>(version: Version, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let s = format!("{version:?} 100 Continue\r\n\r\n");
        writer.write_all(s.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    fn error_page(&self) -> String {
        let code = self.status.as_u16();
        let reason = self.canonical_reason();
        let detail = self
            .detail
            .as_deref()
            .map(|d| format!("<p>{}</p>\n", html_escape(d)))
            .unwrap_or_default();
        format!(
            "<html>\n<head><title>{code} {reason}</title></head>\n\
             <body>\n<h1>{code} {reason}</h1>\n{detail}</body>\n</html>\n"
        )
    }

    pub(crate) async fn reply_err<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut writer = BufWriter::new(writer);

        let body = self.error_page();
        let mut header = Vec::<u8>::with_capacity(Self::RESPONSE_BUFFER_SIZE);
        write!(
            header,
            "{:?} {} {}\r\n",
            self.version,
            self.status.as_str(),
            self.canonical_reason(),
        )?;
        for line in &self.extra_headers {
            header.extend_from_slice(line.as_bytes());
        }
        header.extend_from_slice(hcp_http::header::content_type(&mime::TEXT_HTML).as_bytes());
        header.extend_from_slice(hcp_http::header::content_length(body.len() as u64).as_bytes());
        header.extend_from_slice(hcp_http::header::connection_as_bytes(self.close));
        header.extend_from_slice(b"\r\n");

        writer.write_all(header.as_ref()).await?;
        writer.write_all(body.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn error_page() {
        let mut r = HttpProxyClientResponse::need_proxy_login(Version::HTTP_11, false, "test");
        assert_eq!(r.status(), 407);
        r.set_detail("<x>".to_string());
        let mut buf = Vec::new();
        r.reply_err(&mut buf).await.unwrap();
        let s = String::from_utf8(buf).unwrap();
        assert!(s.starts_with("HTTP/1.1 407 Proxy Authentication Required\r\n"));
        assert!(s.contains("Proxy-Authenticate: Basic realm=\"test\"\r\n"));
        assert!(s.contains("Connection: Keep-Alive\r\n"));
        assert!(s.contains("&lt;x&gt;"));
        let (head, body) = s.split_once("\r\n\r\n").unwrap();
        assert!(head.contains(&format!("Content-Length: {}", body.len())));
    }

    #[test]
    fn task_err_status() {
        let r = HttpProxyClientResponse::from_task_err(
            &ServerTaskError::ClientRequestLineTooLong,
            Version::HTTP_11,
            false,
        )
        .unwrap();
        assert_eq!(r.status(), 414);
        assert!(r.should_close());

        let r = HttpProxyClientResponse::from_task_err(
            &ServerTaskError::ForbiddenByRule(StatusCode::FORBIDDEN),
            Version::HTTP_11,
            false,
        )
        .unwrap();
        assert_eq!(r.status(), 403);
        assert!(!r.should_close());

        let r = HttpProxyClientResponse::from_task_err(
            &ServerTaskError::ClientAppTimeout("idle while reading request body"),
            Version::HTTP_11,
            false,
        )
        .unwrap();
        assert_eq!(r.status(), 408);
        assert!(r.should_close());

        assert!(
            HttpProxyClientResponse::from_task_err(
                &ServerTaskError::ClosedEarlyByClient,
                Version::HTTP_11,
                false
            )
            .is_none()
        );
    }

    #[tokio::test]
    async fn continue_line() {
        let mut buf = Vec::new();
        HttpProxyClientResponse::reply_continue(Version::HTTP_11, &mut buf)
            .await
            .unwrap();
        assert_eq!(buf, b"HTTP/1.1 100 Continue\r\n\r\n");
    }
}
