use crate::codec::Encoding;
use crate::parser::types::{ParseError, ParseResult, ParsedRequest};

/// 原始 HTTP/1.x 请求解析器
///
/// 单次遍历、单个缓冲区：假定整个请求在一次读取中到达。
/// 不支持 chunked 编码、header 折行或跨多次读取的请求。
pub struct WireParser;

impl WireParser {
    const CRLF: &'static [u8] = b"\r\n";
    const HEADER_SEPARATOR: &'static [u8] = b": ";

    /// 从一次读取得到的缓冲区解析
    pub fn parse(raw: &[u8], encoding: Encoding) -> ParseResult<ParsedRequest> {
        let lines = Self::split_lines(raw);
        Self::parse_lines(&lines, encoding)
    }

    /// 从已按 CRLF 拆分的行解析
    ///
    /// - 第 0 行是请求行
    /// - 第 1 行被当作 `Host:`，其值只作为后备 host
    /// - 从第 2 行起是 headers；对携带请求体的方法，第一个空行之后的所有行
    ///   去掉 CRLF 后直接拼接为请求体
    /// - 无法按 `": "` 恰好拆成两段的行被跳过，解析继续
    pub fn parse_lines(lines: &[&[u8]], encoding: Encoding) -> ParseResult<ParsedRequest> {
        let request_line = lines.first().copied().unwrap_or_default();
        let (method, url) = Self::parse_request_line(request_line, encoding)?;

        let mut request = ParsedRequest::new(method, url);
        request.host_header = lines
            .get(1)
            .and_then(|line| Self::parse_host_line(line, encoding));

        let carries_body = request.carries_body();
        for (index, line) in lines.iter().enumerate().skip(2) {
            if line.is_empty() && carries_body {
                request.body = lines[index + 1..].concat();
                break;
            }

            match Self::parse_header(line) {
                Some((name, value)) => {
                    request.insert_header(encoding.decode(name), encoding.decode(value))
                }
                None => tracing::trace!(line = index, "Skipping malformed header line"),
            }
        }

        Ok(request)
    }

    /// 按 CRLF 拆分；末尾的 CRLF 会产生一个空行
    pub fn split_lines(raw: &[u8]) -> Vec<&[u8]> {
        let mut lines = Vec::new();
        let mut start = 0;
        let mut i = 0;

        while i + 1 < raw.len() {
            if &raw[i..i + 2] == Self::CRLF {
                lines.push(&raw[start..i]);
                i += 2;
                start = i;
            } else {
                i += 1;
            }
        }
        lines.push(&raw[start..]);

        lines
    }

    /// 解析请求行（方法 + URL + 版本），版本号被忽略
    fn parse_request_line(line: &[u8], encoding: Encoding) -> ParseResult<(String, String)> {
        let parts: Vec<&[u8]> = line.split(|&b| b == b' ').collect();

        match parts.as_slice() {
            [method, url, _version] => Ok((encoding.decode(method), encoding.decode(url))),
            _ => Err(ParseError::MalformedRequestLine(encoding.decode(line))),
        }
    }

    fn parse_host_line(line: &[u8], encoding: Encoding) -> Option<String> {
        let line = line.trim_ascii();
        let pos = Self::find_separator(line)?;
        let host = line[pos + Self::HEADER_SEPARATOR.len()..].trim_ascii();
        (!host.is_empty()).then(|| encoding.decode(host))
    }

    /// 解析 header 行，必须恰好包含一个 `": "`
    fn parse_header(line: &[u8]) -> Option<(&[u8], &[u8])> {
        let line = line.trim_ascii();
        let pos = Self::find_separator(line)?;
        let name = &line[..pos];
        let value = &line[pos + Self::HEADER_SEPARATOR.len()..];

        if Self::find_separator(value).is_some() {
            return None;
        }
        Some((name, value))
    }

    fn find_separator(haystack: &[u8]) -> Option<usize> {
        haystack
            .windows(Self::HEADER_SEPARATOR.len())
            .position(|w| w == Self::HEADER_SEPARATOR)
    }
}
