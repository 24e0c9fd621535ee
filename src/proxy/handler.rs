use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec::Encoding;
use crate::config::ProxyConfig;
use crate::history::{HistoryRepository, Identifier};
use crate::http::{ForwardingClient, ParsedResponse};
use crate::parser::{ParsedRequest, WireParser};
use crate::utils::ExchangeFormatter;
use crate::{ProxyError, Result};

/// 一次成功转发的结果
#[derive(Debug)]
pub struct Exchange {
    pub method: String,
    pub url: String,
    pub status: u16,
    /// None when the record could not be saved
    pub identifier: Option<Identifier>,
    /// 回写给客户端的字节数
    pub relayed: usize,
}

/// 处理单个连接：读取、解析、转发、记录、回写
pub struct ConnectionHandler {
    client: ForwardingClient,
    repository: Arc<dyn HistoryRepository>,
    encoding: Encoding,
    read_buffer_size: usize,
    record_raw: bool,
    dump: Option<ExchangeFormatter>,
}

impl ConnectionHandler {
    pub fn new(config: &ProxyConfig, repository: Arc<dyn HistoryRepository>) -> Result<Self> {
        let client = ForwardingClient::new(config.upstream.timeout(), config.encoding)?;
        let format = config.server.debug_dump;
        let dump = format
            .is_enabled()
            .then(|| ExchangeFormatter::new(format, config.encoding));

        Ok(Self {
            client,
            repository,
            encoding: config.encoding,
            read_buffer_size: config.server.read_buffer_size.max(1),
            record_raw: config.storage.record_raw,
            dump,
        })
    }

    /// 处理连接并记录结果；失败时不发送任何响应，直接关闭连接
    pub async fn serve<S>(&self, mut stream: S, peer: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match self.handle(&mut stream).await {
            Ok(exchange) => {
                tracing::info!(
                    peer = %peer,
                    method = %exchange.method,
                    url = %exchange.url,
                    status = exchange.status,
                    bytes = exchange.relayed,
                    identifier = exchange.identifier.as_ref().map_or("-", |id| id.as_str()),
                    "Exchange relayed"
                );
            }
            Err(e) => {
                tracing::warn!(
                    peer = %peer,
                    kind = e.kind(),
                    error = %e,
                    "Connection closed without response"
                );
                let _ = stream.shutdown().await;
            }
        }
    }

    /// Single read of at most `read_buffer_size` bytes; the request must fit in it.
    pub async fn handle<S>(&self, stream: &mut S) -> Result<Exchange>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut buffer = vec![0u8; self.read_buffer_size];
        let read = stream.read(&mut buffer).await?;
        buffer.truncate(read);

        let data = buffer.trim_ascii();
        tracing::trace!(bytes = data.len(), "Request received");

        let request = WireParser::parse(data, self.encoding)?;
        tracing::debug!(method = %request.method, url = %request.url, "Request parsed");

        let response = self.client.forward(&request).await?;
        tracing::debug!(status = response.status, "Upstream responded");

        let raw = self.record_raw.then(|| data.to_vec());
        let identifier = match self.save(&request, &response, raw).await {
            Ok(identifier) => Some(identifier),
            Err(e) => {
                tracing::error!(kind = e.kind(), error = %e, "Failed to save exchange");
                None
            }
        };

        if let Some(formatter) = &self.dump {
            println!("{}", formatter.format(data, &response));
        }

        stream.write_all(&response.body).await?;
        stream.flush().await?;
        stream.shutdown().await?;

        Ok(Exchange {
            method: request.method,
            url: request.url,
            status: response.status,
            identifier,
            relayed: response.body.len(),
        })
    }

    /// 文件写入放到阻塞线程池执行
    async fn save(
        &self,
        request: &ParsedRequest,
        response: &ParsedResponse,
        raw: Option<Vec<u8>>,
    ) -> Result<Identifier> {
        let repository = Arc::clone(&self.repository);
        let request = request.clone();
        let response = response.clone();

        tokio::task::spawn_blocking(move || {
            repository.save(&request, &response, None, raw.as_deref())
        })
        .await
        .map_err(|e| ProxyError::Other(format!("save task failed: {}", e)))?
    }
}
