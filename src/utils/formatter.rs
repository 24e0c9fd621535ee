use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::codec::Encoding;
use crate::http::ParsedResponse;
use crate::ProxyError;
use colored::*;

/// `server.debug_dump` 的取值
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DumpFormat {
    /// 不打印
    #[default]
    Off,
    /// 状态行 + 响应体摘要
    Compact,
    /// 原始请求 + 响应头 + 完整响应体
    Verbose,
}

impl DumpFormat {
    pub fn is_enabled(self) -> bool {
        self != DumpFormat::Off
    }
}

impl FromStr for DumpFormat {
    type Err = ProxyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(DumpFormat::Off),
            "compact" => Ok(DumpFormat::Compact),
            "verbose" => Ok(DumpFormat::Verbose),
            _ => Err(ProxyError::Config(format!("Unknown dump format: {}", s))),
        }
    }
}

impl fmt::Display for DumpFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DumpFormat::Off => "off",
            DumpFormat::Compact => "compact",
            DumpFormat::Verbose => "verbose",
        };
        f.write_str(name)
    }
}

/// 把一次代理交换格式化为调试输出
///
/// 颜色由 `colored` 的全局设置决定（`NO_COLOR` / `CLICOLOR_FORCE`）
pub struct ExchangeFormatter {
    format: DumpFormat,
    encoding: Encoding,
}

impl ExchangeFormatter {
    const COMPACT_BODY_LIMIT: usize = 200;

    pub fn new(format: DumpFormat, encoding: Encoding) -> Self {
        Self { format, encoding }
    }

    pub fn format(&self, raw_request: &[u8], response: &ParsedResponse) -> String {
        match self.format {
            DumpFormat::Off => String::new(),
            DumpFormat::Compact => self.format_compact(response),
            DumpFormat::Verbose => self.format_verbose(raw_request, response),
        }
    }

    fn format_compact(&self, response: &ParsedResponse) -> String {
        let mut output = vec![Self::status_line(response)];

        let body = self.encoding.decode(&response.body);
        if !body.is_empty() && body.len() < Self::COMPACT_BODY_LIMIT {
            output.push(Self::try_format_json(&body).unwrap_or(body));
        } else if !body.is_empty() {
            output.push(format!("Body: {} bytes", response.body.len()));
        }

        output.join("\n")
    }

    fn format_verbose(&self, raw_request: &[u8], response: &ParsedResponse) -> String {
        let rule = "-".repeat(30);
        let mut output = vec![
            "DEBUG DATA".blue().bold().to_string(),
            rule.clone(),
            rule,
            String::new(),
            "REQUEST:".blue().bold().to_string(),
            self.encoding.decode(raw_request),
            String::new(),
            "RESPONSE:".blue().bold().to_string(),
            Self::status_line(response),
        ];

        for (name, value) in &response.headers {
            output.push(format!("   {}: {}", name, value).blue().to_string());
        }

        if !response.body.is_empty() {
            output.push(String::new());
            let body = self.encoding.decode(&response.body);
            output.push(Self::try_format_json(&body).unwrap_or(body));
        }

        output.join("\n")
    }

    fn status_line(response: &ParsedResponse) -> String {
        format!("HTTP {} {}", response.status, response.reason_phrase())
            .color(Self::status_color(response))
            .bold()
            .to_string()
    }

    fn status_color(response: &ParsedResponse) -> Color {
        if response.is_success() {
            Color::Green
        } else if response.is_redirection() {
            Color::Cyan
        } else if response.is_client_error() {
            Color::Yellow
        } else if response.status < 200 {
            Color::White
        } else {
            Color::Red
        }
    }

    /// 尝试将 body 格式化为漂亮的 JSON，不是 JSON 时返回 None
    fn try_format_json(body: &str) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        serde_json::to_string_pretty(&value).ok()
    }
}
