use crate::{ProxyError, Result};

/// 没有 scheme 时使用的默认 scheme
const DEFAULT_SCHEME: &str = "http";

/// 从请求目标中提取 host
///
/// 支持的形式:
/// - absolute-form: "http://example.com/path"
/// - 无 scheme:     "example.com/path" 或 "example.com:443"
/// - origin-form:   "/path"，没有 host，返回 None
pub fn host_of(url: &str) -> Option<String> {
    let input = url.trim();
    if input.is_empty() || input.starts_with('/') || input == "*" {
        return None;
    }

    let parsed = if input.contains("://") {
        url::Url::parse(input).ok()?
    } else {
        url::Url::parse(&format!("{}://{}", DEFAULT_SCHEME, input)).ok()?
    };

    parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .map(|h| h.to_string())
}

/// 把请求目标转换为出站请求可用的绝对 URL
///
/// origin-form 目标需要 `fallback_host`（来自 `Host:` 行）。
pub fn absolute_url(url: &str, fallback_host: Option<&str>) -> Result<String> {
    let input = url.trim();

    if host_of(input).is_some() {
        let absolute = if input.contains("://") {
            input.to_string()
        } else {
            format!("{}://{}", DEFAULT_SCHEME, input)
        };
        // reject anything the client could not send
        url::Url::parse(&absolute)?;
        return Ok(absolute);
    }

    match fallback_host.map(str::trim).filter(|h| !h.is_empty()) {
        Some(host) if input.starts_with('/') => {
            let absolute = format!("{}://{}{}", DEFAULT_SCHEME, host, input);
            url::Url::parse(&absolute)?;
            Ok(absolute)
        }
        _ => Err(ProxyError::InvalidRequest(format!(
            "cannot resolve target '{}' without a host",
            url
        ))),
    }
}
