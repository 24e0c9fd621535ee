use crate::Result;
use crate::http::types::{absolute_url, host_of};

/// 从原始字节重建出的 HTTP 请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    /// 方法名，保持原样（不做大小写转换）
    pub method: String,

    /// 请求目标，absolute-form 或 origin-form
    pub url: String,

    /// Headers 列表，保持插入顺序，名称大小写不做规范化
    pub headers: Vec<(String, String)>,

    /// 请求体；只有 PUT/POST/PATCH 才可能非空
    pub body: Vec<u8>,

    /// 第二行 `Host:` 的值，仅在 URL 本身没有 host 时使用
    pub host_header: Option<String>,
}

impl ParsedRequest {
    /// 会携带请求体的方法（区分大小写）
    pub const BODY_METHODS: [&'static str; 3] = ["PUT", "POST", "PATCH"];

    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
            host_header: None,
        }
    }

    pub fn carries_body(&self) -> bool {
        Self::BODY_METHODS.contains(&self.method.as_str())
    }

    /// Inserts a header; a repeated name keeps its position and takes the new value.
    pub fn insert_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.headers.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name, value)),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.insert_header(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Exact-name lookup, matching the parser's case-sensitive map.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// URL host, else the `Host:` line value.
    pub fn host(&self) -> Option<String> {
        host_of(&self.url).or_else(|| self.host_header.clone())
    }

    /// 出站请求使用的绝对 URL
    pub fn target_url(&self) -> Result<String> {
        absolute_url(&self.url, self.host_header.as_deref())
    }
}

/// 解析错误类型
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// 请求行拆分后不是恰好三段
    #[error("expected 'METHOD TARGET VERSION', got {0:?}")]
    MalformedRequestLine(String),
}

/// 解析结果类型别名
pub type ParseResult<T> = std::result::Result<T, ParseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parsed_request_new() {
        let req = ParsedRequest::new("GET", "/search");
        assert_eq!(req.method, "GET");
        assert_eq!(req.url, "/search");
        assert!(req.headers.is_empty());
        assert!(req.body.is_empty());
        assert_eq!(req.host_header, None);
    }

    #[test]
    fn test_carries_body_is_case_sensitive() {
        assert!(ParsedRequest::new("POST", "/").carries_body());
        assert!(ParsedRequest::new("PATCH", "/").carries_body());
        assert!(!ParsedRequest::new("post", "/").carries_body());
        assert!(!ParsedRequest::new("DELETE", "/").carries_body());
    }

    #[test]
    fn test_insert_header_replaces_in_place() {
        let req = ParsedRequest::new("GET", "/")
            .with_header("Accept", "text/html")
            .with_header("X-Id", "1")
            .with_header("Accept", "application/json");

        assert_eq!(
            req.headers,
            vec![
                ("Accept".to_string(), "application/json".to_string()),
                ("X-Id".to_string(), "1".to_string()),
            ]
        );
        assert_eq!(req.header("accept"), None);
    }

    #[test]
    fn test_host_prefers_url() {
        let mut req = ParsedRequest::new("GET", "http://api.example.com/v1");
        req.host_header = Some("other.com".to_string());
        assert_eq!(req.host().as_deref(), Some("api.example.com"));

        let mut req = ParsedRequest::new("GET", "/v1");
        req.host_header = Some("other.com".to_string());
        assert_eq!(req.host().as_deref(), Some("other.com"));
    }

    #[test]
    fn test_target_url_resolves_origin_form() {
        let mut req = ParsedRequest::new("GET", "/search?q=1");
        req.host_header = Some("example.com:8080".to_string());
        assert_eq!(req.target_url().unwrap(), "http://example.com:8080/search?q=1");

        let req = ParsedRequest::new("GET", "/search");
        assert!(req.target_url().is_err());
    }
}
