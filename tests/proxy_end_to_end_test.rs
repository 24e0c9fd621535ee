use std::net::SocketAddr;
use std::sync::Arc;

use proxyrec::config::ProxyConfig;
use proxyrec::history::{self, HistoryRepository, RawParts};
use proxyrec::proxy::ProxyServer;
use proxyrec::ProxyError;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct RunningProxy {
    address: SocketAddr,
    repository: Arc<dyn HistoryRepository>,
    shutdown: Option<oneshot::Sender<()>>,
    _temp_dir: TempDir,
}

impl Drop for RunningProxy {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn start_proxy(record_raw: bool) -> RunningProxy {
    let temp_dir = TempDir::new().unwrap();

    let mut config = ProxyConfig::default();
    config.server.port = 0;
    config.storage.dir = temp_dir.path().join("json");
    config.storage.raw_dir = temp_dir.path().join("raw");
    config.storage.record_raw = record_raw;
    config.upstream.timeout_secs = 5;

    let repository = history::create(&config.storage, config.encoding).unwrap();
    let server = ProxyServer::bind(&config, Arc::clone(&repository))
        .await
        .unwrap();
    let address = server.local_addr().unwrap();

    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(server.run_until(async {
        let _ = rx.await;
    }));

    RunningProxy {
        address,
        repository,
        shutdown: Some(tx),
        _temp_dir: temp_dir,
    }
}

/// 发送原始请求并读取代理回写的全部内容
async fn send_raw(address: SocketAddr, raw: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(address).await.unwrap();
    stream.write_all(raw).await.unwrap();

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();
    reply
}

#[tokio::test]
async fn test_post_is_forwarded_relayed_and_recorded() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api"))
        .and(header("Content-Type", "text/plain"))
        .and(body_string("hello"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("x-upstream", "mock")
                .set_body_string("created"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let proxy = start_proxy(true).await;
    let upstream = mock_server.address();
    let raw = format!(
        "POST {}/api HTTP/1.1\r\nHost: {}\r\nContent-Type: text/plain\r\n\r\nhello",
        mock_server.uri(),
        upstream
    );

    let reply = send_raw(proxy.address, raw.as_bytes()).await;
    // body only, no status line or headers
    assert_eq!(reply, b"created");

    let record = proxy.repository.latest().unwrap();
    assert_eq!(record.request.method, "POST");
    assert_eq!(record.request.url, format!("{}/api", mock_server.uri()));
    assert_eq!(record.request.header("Content-Type"), Some("text/plain"));
    assert_eq!(record.request.body, b"hello");
    assert_eq!(record.response.status, 201);
    assert_eq!(record.response.header("x-upstream"), Some("mock"));
    assert_eq!(record.response.body, b"created");
    assert_eq!(record.identifier.method(), Some("POST"));
    assert_eq!(record.identifier.host(), Some("127.0.0.1"));

    let mirrored = proxy.repository.raw_request(&record, RawParts::All).unwrap();
    assert_eq!(mirrored, raw.as_bytes());
}

#[tokio::test]
async fn test_origin_form_uses_host_line() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string("results"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let proxy = start_proxy(false).await;
    let raw = format!(
        "GET /search HTTP/1.1\r\nHost: {}\r\n\r\n",
        mock_server.address()
    );

    let reply = send_raw(proxy.address, raw.as_bytes()).await;
    assert_eq!(reply, b"results");

    let record = proxy.repository.latest().unwrap();
    assert_eq!(record.request.url, "/search");
    assert!(record.request.body.is_empty());
    assert_eq!(
        record.identifier.host(),
        Some(mock_server.address().to_string().as_str())
    );
}

#[tokio::test]
async fn test_malformed_request_gets_no_response() {
    let proxy = start_proxy(false).await;

    let reply = send_raw(proxy.address, b"HELLO\r\nHost: nowhere\r\n\r\n").await;
    assert!(reply.is_empty());

    assert!(matches!(
        proxy.repository.latest(),
        Err(ProxyError::NoRecordsFound(_))
    ));
}

#[tokio::test]
async fn test_unreachable_upstream_gets_no_response() {
    let closed_port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let proxy = start_proxy(false).await;
    let raw = format!(
        "GET http://127.0.0.1:{}/ HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n",
        closed_port
    );

    let reply = send_raw(proxy.address, raw.as_bytes()).await;
    assert!(reply.is_empty());
    assert!(matches!(
        proxy.repository.latest(),
        Err(ProxyError::NoRecordsFound(_))
    ));
}

#[tokio::test]
async fn test_connections_are_independent() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
        .mount(&mock_server)
        .await;

    let proxy = start_proxy(false).await;

    let mut tasks = Vec::new();
    for i in 0..5 {
        let raw = format!("GET {}/ping/{} HTTP/1.1\r\nHost: x\r\n\r\n", mock_server.uri(), i);
        let address = proxy.address;
        tasks.push(tokio::spawn(async move { send_raw(address, raw.as_bytes()).await }));
    }

    for task in tasks {
        assert_eq!(task.await.unwrap(), b"pong");
    }
}
