use serde::{Deserialize, Serialize};

use crate::codec::Encoding;
use crate::history::identifier::Identifier;
use crate::history::serialization;
use crate::http::ParsedResponse;
use crate::http::types::host_of;
use crate::parser::ParsedRequest;

/// 一次被记录的请求/响应交换
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRecord {
    /// 保存时生成，之后不再改变
    pub identifier: Identifier,
    pub request: ParsedRequest,
    pub response: ParsedResponse,
}

/// `{identifier}.json` 文件的内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub request: StoredRequest,
    pub response: StoredResponse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRequest {
    pub method: String,
    pub url: String,

    #[serde(with = "serialization::ordered_headers")]
    pub headers: Vec<(String, String)>,

    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,

    #[serde(with = "serialization::ordered_headers")]
    pub headers: Vec<(String, String)>,

    pub body: String,
}

impl StoredRecord {
    /// Bodies are stored as text in `encoding`.
    pub fn from_exchange(
        request: &ParsedRequest,
        response: &ParsedResponse,
        encoding: Encoding,
    ) -> Self {
        Self {
            request: StoredRequest {
                method: request.method.clone(),
                url: request.url.clone(),
                headers: request.headers.clone(),
                body: encoding.decode(&request.body),
            },
            response: StoredResponse {
                status: response.status,
                headers: response.headers.clone(),
                body: encoding.decode(&response.body),
            },
        }
    }

    /// 重建记录；origin-form URL 的 host 从标识中恢复
    pub fn into_record(self, identifier: Identifier, encoding: Encoding) -> HttpRecord {
        let mut request = ParsedRequest::new(self.request.method, self.request.url);
        request.headers = self.request.headers;
        request.body = encoding.encode(&self.request.body);

        if host_of(&request.url).is_none() {
            request.host_header = identifier
                .host()
                .filter(|h| *h != Identifier::UNKNOWN_HOST)
                .map(str::to_string);
        }

        let response = ParsedResponse::new(
            self.response.status,
            self.response.headers,
            encoding.encode(&self.response.body),
        );

        HttpRecord {
            identifier,
            request,
            response,
        }
    }
}
