use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProxyError;

/// 请求头与请求体在字节和文本之间转换时使用的编码
///
/// Latin-1 把每个字节映射为 U+0000..=U+00FF 中的同值字符，
/// 因此任意字节序列都能无损往返。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Encoding {
    #[default]
    #[serde(rename = "latin-1", alias = "latin1", alias = "iso-8859-1")]
    Latin1,
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
}

impl Encoding {
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Encoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
            Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    /// Latin-1 has no code point above U+00FF; such characters become `?`.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Encoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
            Encoding::Utf8 => text.as_bytes().to_vec(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Latin1 => "latin-1",
            Encoding::Utf8 => "utf-8",
        }
    }
}

impl FromStr for Encoding {
    type Err = ProxyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "latin-1" | "latin1" | "iso-8859-1" => Ok(Encoding::Latin1),
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            _ => Err(ProxyError::Config(format!("Unknown encoding: {}", s))),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin1_is_lossless_for_all_bytes() {
        let bytes: Vec<u8> = (0..=255).collect();
        let text = Encoding::Latin1.decode(&bytes);
        assert_eq!(text.chars().count(), 256);
        assert_eq!(Encoding::Latin1.encode(&text), bytes);
    }

    #[test]
    fn test_latin1_replaces_wide_chars() {
        assert_eq!(Encoding::Latin1.encode("a€b"), b"a?b".to_vec());
    }

    #[test]
    fn test_utf8_decode_is_lossy() {
        let text = Encoding::Utf8.decode(&[b'o', b'k', 0xff]);
        assert!(text.starts_with("ok"));
        assert!(text.contains('\u{fffd}'));
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("ISO-8859-1".parse::<Encoding>().unwrap(), Encoding::Latin1);
        assert_eq!("utf8".parse::<Encoding>().unwrap(), Encoding::Utf8);
        assert!("ebcdic".parse::<Encoding>().is_err());
    }
}
