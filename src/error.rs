use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    /// 请求行不是 `METHOD TARGET VERSION` 三段
    #[error("请求行格式错误: {0}")]
    MalformedRequestLine(String),

    /// 请求解析成功，但无法转换为出站请求（例如非法的方法名）
    #[error("无效的请求: {0}")]
    InvalidRequest(String),

    #[error("上游不可用: {0}")]
    UpstreamUnavailable(String),

    #[error("不支持的存储类型: {0}")]
    UnsupportedStorageKind(String),

    #[error("没有找到历史记录: {}", .0.display())]
    NoRecordsFound(PathBuf),

    #[error("写入 {} 失败: {source}", path.display())]
    StorageWriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON 解析错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL 解析错误: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl ProxyError {
    /// Short stable name used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::MalformedRequestLine(_) => "MalformedRequestLine",
            ProxyError::InvalidRequest(_) => "InvalidRequest",
            ProxyError::UpstreamUnavailable(_) => "UpstreamUnavailable",
            ProxyError::UnsupportedStorageKind(_) => "UnsupportedStorageKind",
            ProxyError::NoRecordsFound(_) => "NoRecordsFound",
            ProxyError::StorageWriteFailure { .. } => "StorageWriteFailure",
            ProxyError::Io(_) => "Io",
            ProxyError::Json(_) => "Json",
            ProxyError::UrlParse(_) => "UrlParse",
            ProxyError::Config(_) => "Config",
            ProxyError::Other(_) => "Other",
        }
    }
}

// DNS failures, refused connections and timeouts all land here
impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        ProxyError::UpstreamUnavailable(err.to_string())
    }
}

impl From<crate::parser::ParseError> for ProxyError {
    fn from(err: crate::parser::ParseError) -> Self {
        match err {
            crate::parser::ParseError::MalformedRequestLine(line) => {
                ProxyError::MalformedRequestLine(line)
            }
        }
    }
}

impl From<anyhow::Error> for ProxyError {
    fn from(err: anyhow::Error) -> Self {
        ProxyError::Other(err.to_string())
    }
}

/// Result type for proxyrec crate
pub type Result<T> = std::result::Result<T, ProxyError>;
