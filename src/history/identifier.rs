use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// 历史记录的确定性标识
///
/// 格式: `{unix 秒}.{毫秒}_{本地 ISO-8601 时间}_{method}_{host}`，
/// 例如 `1700000000.123_2023-11-14T22:13:20.123456_GET_example.com`
///
/// The leading field has a fixed width (10 digit seconds until the year 2286,
/// always 3 digit millis), so lexicographic order of identifiers is
/// chronological order. Record files are sorted by name and rely on this.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub const UNKNOWN_HOST: &'static str = "unknown";
    const SEPARATOR: char = '_';
    const ISO_FORMAT: &'static str = "%Y-%m-%dT%H:%M:%S%.6f";

    /// Both time fields come from the same clock reading.
    pub fn generate(method: &str, host: Option<&str>, now: DateTime<Local>) -> Self {
        let millis = now.timestamp_millis();
        let host = host
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .unwrap_or(Self::UNKNOWN_HOST);

        Self(format!(
            "{}.{:03}_{}_{}_{}",
            millis.div_euclid(1000),
            millis.rem_euclid(1000),
            now.format(Self::ISO_FORMAT),
            Self::path_safe(method),
            Self::path_safe(host),
        ))
    }

    /// 从文件名（去掉扩展名）恢复
    pub fn from_file_stem(stem: impl Into<String>) -> Self {
        Self(stem.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `{identifier}.{extension}`
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.0, extension)
    }

    /// 第一段：`secs.millis`
    pub fn timestamp(&self) -> &str {
        self.field(0).unwrap_or_default()
    }

    pub fn method(&self) -> Option<&str> {
        self.field(2)
    }

    /// Best effort: a method containing `_` shifts the fields.
    pub fn host(&self) -> Option<&str> {
        self.field(3)
    }

    fn field(&self, index: usize) -> Option<&str> {
        self.0.splitn(4, Self::SEPARATOR).nth(index)
    }

    // identifiers become file names
    fn path_safe(segment: &str) -> String {
        segment
            .chars()
            .map(|c| match c {
                '/' | '\\' | '\0' => '-',
                c => c,
            })
            .collect()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
