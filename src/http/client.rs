use std::time::Duration;

use reqwest::header::{CONTENT_LENGTH, HeaderMap, HeaderName, HeaderValue, TRANSFER_ENCODING};

use crate::codec::Encoding;
use crate::http::response::ParsedResponse;
use crate::parser::ParsedRequest;
use crate::{ProxyError, Result};

/// 把解析后的请求转发到目标主机
#[derive(Clone)]
pub struct ForwardingClient {
    inner: reqwest::Client,
    encoding: Encoding,
}

impl ForwardingClient {
    /// `timeout` 为 None 时不设超时
    pub fn new(timeout: Option<Duration>, encoding: Encoding) -> Result<Self> {
        // never route forwarded traffic through a system proxy
        let mut builder = reqwest::Client::builder().no_proxy();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let inner = builder
            .build()
            .map_err(|e| ProxyError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { inner, encoding })
    }

    pub async fn forward(&self, request: &ParsedRequest) -> Result<ParsedResponse> {
        let url = request.target_url()?;
        let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|_| {
            ProxyError::InvalidRequest(format!("invalid method token '{}'", request.method))
        })?;

        let mut req = self
            .inner
            .request(method, &url)
            .headers(self.outbound_headers(request));

        if !request.body.is_empty() {
            req = req.body(request.body.clone());
        }

        tracing::debug!(method = %request.method, url = %url, "Forwarding request");
        let response = req.send().await?;

        let status = response.status().as_u16();
        let headers = self.inbound_headers(response.headers());
        let body = response.bytes().await?.to_vec();

        Ok(ParsedResponse::new(status, headers, body))
    }

    /// 请求体去掉了 CRLF，长度相关的 header 交给客户端重新计算
    fn outbound_headers(&self, request: &ParsedRequest) -> HeaderMap {
        let mut headers = HeaderMap::new();

        for (name, value) in &request.headers {
            let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_bytes(&self.encoding.encode(value)),
            ) else {
                tracing::debug!(header = %name, "Dropping header that cannot be sent");
                continue;
            };

            if name == CONTENT_LENGTH || name == TRANSFER_ENCODING {
                continue;
            }
            headers.insert(name, value);
        }

        headers
    }

    fn inbound_headers(&self, headers: &HeaderMap) -> Vec<(String, String)> {
        let mut merged: Vec<(String, String)> = Vec::new();

        for (name, value) in headers.iter() {
            let value = self.encoding.decode(value.as_bytes());
            match merged.iter_mut().find(|(n, _)| n == name.as_str()) {
                Some((_, existing)) => {
                    existing.push_str(", ");
                    existing.push_str(&value);
                }
                None => merged.push((name.as_str().to_string(), value)),
            }
        }

        merged
    }
}
