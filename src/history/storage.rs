use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Local};
use tempfile::NamedTempFile;

use crate::codec::Encoding;
use crate::config::StorageConfig;
use crate::history::identifier::Identifier;
use crate::history::model::{HttpRecord, StoredRecord};
use crate::http::ParsedResponse;
use crate::parser::ParsedRequest;
use crate::{ProxyError, Result};

const RECORD_EXTENSION: &str = "json";
const RAW_EXTENSION: &str = "http";
const CRLF: &str = "\r\n";

/// 可用的存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// 每条记录一个 JSON 文件
    Json,
}

impl FromStr for StorageKind {
    type Err = ProxyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(StorageKind::Json),
            _ => Err(ProxyError::UnsupportedStorageKind(s.to_string())),
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Json => f.write_str("json"),
        }
    }
}

/// 请求/响应历史的持久化能力
///
/// Records are only ever created and read back; there is no update or delete.
pub trait HistoryRepository: Send + Sync {
    fn kind(&self) -> StorageKind;

    /// Persists one exchange and returns the identifier it was stored under.
    ///
    /// `host` overrides the host derived from the request; `raw` is mirrored
    /// to a sibling raw-request file when present.
    fn save(
        &self,
        request: &ParsedRequest,
        response: &ParsedResponse,
        host: Option<&str>,
        raw: Option<&[u8]>,
    ) -> Result<Identifier>;

    /// The most recently persisted record, by identifier order.
    fn latest(&self) -> Result<HttpRecord>;

    /// Raw request text of a record, see [`RawParts`].
    fn raw_request(&self, record: &HttpRecord, parts: RawParts) -> Result<Vec<u8>>;
}

/// 根据配置创建存储后端
pub fn create(config: &StorageConfig, encoding: Encoding) -> Result<Arc<dyn HistoryRepository>> {
    match config.kind.parse::<StorageKind>()? {
        StorageKind::Json => Ok(Arc::new(JsonFileRepository::from_config(config, encoding))),
    }
}

/// 原始请求的哪一部分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RawParts {
    None,
    /// 请求行 + headers，末尾带一个 CRLF
    Head,
    Body,
    #[default]
    All,
}

impl FromStr for RawParts {
    type Err = ProxyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(RawParts::None),
            "head" => Ok(RawParts::Head),
            "body" => Ok(RawParts::Body),
            "all" => Ok(RawParts::All),
            _ => Err(ProxyError::Other(format!("Unknown raw part: {}", s))),
        }
    }
}

/// 以 `{identifier}.json` 文件存储记录
///
/// Example: `./data/json/1700000000.000_2023-11-14T22:13:20.000000_GET_example.com.json`
///
/// # Concurrency
/// Each file is written to a temporary file in the same directory and renamed
/// into place, so `latest()` only ever sees complete records. Two saves that
/// produce the same identifier (same millisecond, method and host) still race,
/// and the last rename wins.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    storage_dir: PathBuf,
    raw_dir: PathBuf,
    encoding: Encoding,
}

impl JsonFileRepository {
    pub fn new(storage_dir: PathBuf, raw_dir: PathBuf, encoding: Encoding) -> Self {
        Self {
            storage_dir,
            raw_dir,
            encoding,
        }
    }

    pub fn from_config(config: &StorageConfig, encoding: Encoding) -> Self {
        Self::new(config.dir.clone(), config.raw_dir.clone(), encoding)
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn record_path(&self, identifier: &Identifier) -> PathBuf {
        self.storage_dir.join(identifier.file_name(RECORD_EXTENSION))
    }

    pub fn raw_path(&self, identifier: &Identifier) -> PathBuf {
        self.raw_dir.join(identifier.file_name(RAW_EXTENSION))
    }

    /// `save` with an explicit clock reading
    pub fn save_at(
        &self,
        request: &ParsedRequest,
        response: &ParsedResponse,
        host: Option<&str>,
        raw: Option<&[u8]>,
        now: DateTime<Local>,
    ) -> Result<Identifier> {
        let host = host.map(str::to_string).or_else(|| request.host());
        let identifier = Identifier::generate(&request.method, host.as_deref(), now);

        if let Some(raw) = raw {
            Self::ensure_dir(&self.raw_dir)?;
            Self::write_atomic(&self.raw_path(&identifier), raw)?;
        }

        let record = StoredRecord::from_exchange(request, response, self.encoding);
        let json = serde_json::to_vec(&record)?;

        Self::ensure_dir(&self.storage_dir)?;
        Self::write_atomic(&self.record_path(&identifier), &json)?;

        tracing::debug!(identifier = %identifier, "Record saved");
        Ok(identifier)
    }

    /// 按文件名升序排列的所有记录文件
    pub fn list_records(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.storage_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ProxyError::Io(e)),
        };

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == RECORD_EXTENSION) {
                records.push(path);
            }
        }

        records.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(records)
    }

    /// Ensure directory exists
    fn ensure_dir(dir: &Path) -> Result<()> {
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|source| ProxyError::StorageWriteFailure {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }

    /// 先写入同目录下的临时文件，再原子地重命名为目标文件
    fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
        let write_failure = |source: std::io::Error| ProxyError::StorageWriteFailure {
            path: path.to_path_buf(),
            source,
        };

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp_file = NamedTempFile::new_in(dir).map_err(write_failure)?;
        temp_file.write_all(bytes).map_err(write_failure)?;
        temp_file.flush().map_err(write_failure)?;

        temp_file
            .persist(path)
            .map_err(|e| write_failure(e.error))?;
        Ok(())
    }
}

impl HistoryRepository for JsonFileRepository {
    fn kind(&self) -> StorageKind {
        StorageKind::Json
    }

    fn save(
        &self,
        request: &ParsedRequest,
        response: &ParsedResponse,
        host: Option<&str>,
        raw: Option<&[u8]>,
    ) -> Result<Identifier> {
        self.save_at(request, response, host, raw, Local::now())
    }

    fn latest(&self) -> Result<HttpRecord> {
        let records = self.list_records()?;
        let latest = records
            .last()
            .ok_or_else(|| ProxyError::NoRecordsFound(self.storage_dir.clone()))?;

        let bytes = fs::read(latest)?;
        let stored: StoredRecord = serde_json::from_slice(&bytes)?;

        let stem = latest
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(stored.into_record(Identifier::from_file_stem(stem), self.encoding))
    }

    /// Rebuilds the raw request text of a record.
    ///
    /// For [`RawParts::All`] a stored raw mirror wins when one exists.
    /// Otherwise the request is reconstructed as HTTP/1.1 from its fields.
    fn raw_request(&self, record: &HttpRecord, parts: RawParts) -> Result<Vec<u8>> {
        if parts == RawParts::All {
            let raw_path = self.raw_path(&record.identifier);
            if raw_path.is_file() {
                return Ok(fs::read(&raw_path)?);
            }
        }

        let request = &record.request;
        let host = request.host().unwrap_or_else(|| Identifier::UNKNOWN_HOST.to_string());

        let mut head_lines = vec![
            format!("{} {} HTTP/1.1", request.method, request.url),
            format!("Host: {}", host),
        ];
        head_lines.extend(
            request
                .headers
                .iter()
                .map(|(name, value)| format!("{}: {}", name, value)),
        );
        let head = self.encoding.encode(&head_lines.join(CRLF));

        let raw = match parts {
            RawParts::None => Vec::new(),
            RawParts::Head => [head.as_slice(), CRLF.as_bytes()].concat(),
            RawParts::Body => request.body.clone(),
            RawParts::All => [
                head.as_slice(),
                CRLF.as_bytes(),
                CRLF.as_bytes(),
                request.body.as_slice(),
            ]
            .concat(),
        };

        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn repository(temp_dir: &TempDir) -> JsonFileRepository {
        JsonFileRepository::new(
            temp_dir.path().join("json"),
            temp_dir.path().join("raw"),
            Encoding::Latin1,
        )
    }

    fn at_millis(millis: i64) -> DateTime<Local> {
        Local.timestamp_millis_opt(millis).unwrap()
    }

    fn exchange(url: &str) -> (ParsedRequest, ParsedResponse) {
        let request = ParsedRequest::new("GET", url).with_header("Accept", "*/*");
        let response = ParsedResponse::new(200, Vec::new(), "ok");
        (request, response)
    }

    #[test]
    fn test_create_json_backend() {
        let repo = create(&StorageConfig::default(), Encoding::Latin1).unwrap();
        assert_eq!(repo.kind(), StorageKind::Json);
    }

    #[test]
    fn test_create_unsupported_backend() {
        let config = StorageConfig {
            kind: "sqlite".to_string(),
            ..StorageConfig::default()
        };
        let err = create(&config, Encoding::Latin1).err().unwrap();
        assert!(matches!(err, ProxyError::UnsupportedStorageKind(kind) if kind == "sqlite"));
    }

    #[test]
    fn test_save_writes_named_file() {
        let temp_dir = TempDir::new().unwrap();
        let repo = repository(&temp_dir);
        let (request, response) = exchange("http://example.com/search");

        let id = repo
            .save_at(&request, &response, None, None, at_millis(1_700_000_000_000))
            .unwrap();

        assert!(id.as_str().ends_with("_GET_example.com"));
        assert!(repo.record_path(&id).is_file());
        assert!(!repo.raw_path(&id).exists());
    }

    #[test]
    fn test_save_leaves_no_temporary_files() {
        let temp_dir = TempDir::new().unwrap();
        let repo = repository(&temp_dir);
        let (request, response) = exchange("http://example.com/");
        let raw = b"GET http://example.com/ HTTP/1.1\r\nHost: example.com";

        let id = repo.save(&request, &response, None, Some(raw)).unwrap();

        let names: Vec<_> = fs::read_dir(repo.storage_dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![repo.record_path(&id).file_name().unwrap().to_owned()]);
        assert_eq!(fs::read_dir(temp_dir.path().join("raw")).unwrap().count(), 1);
    }

    #[test]
    fn test_same_identifier_last_writer_wins() {
        let temp_dir = TempDir::new().unwrap();
        let repo = repository(&temp_dir);
        let now = at_millis(1_700_000_000_000);
        let request = ParsedRequest::new("GET", "http://example.com/");

        let first = ParsedResponse::new(200, Vec::new(), "first");
        let second = ParsedResponse::new(200, Vec::new(), "second");
        let id_a = repo.save_at(&request, &first, None, None, now).unwrap();
        let id_b = repo.save_at(&request, &second, None, None, now).unwrap();

        assert_eq!(id_a, id_b);
        assert_eq!(repo.list_records().unwrap().len(), 1);
        assert_eq!(repo.latest().unwrap().response.body, b"second");
    }

    #[test]
    fn test_explicit_host_wins() {
        let temp_dir = TempDir::new().unwrap();
        let repo = repository(&temp_dir);
        let (request, response) = exchange("http://example.com/");

        let id = repo
            .save(&request, &response, Some("override.test"), None)
            .unwrap();
        assert_eq!(id.host(), Some("override.test"));
    }

    #[test]
    fn test_latest_picks_greatest_identifier() {
        let temp_dir = TempDir::new().unwrap();
        let repo = repository(&temp_dir);

        let (first, response) = exchange("http://first.com/");
        let (second, _) = exchange("http://second.com/");
        // saved out of order on purpose
        repo.save_at(&second, &response, None, None, at_millis(1_700_000_000_002))
            .unwrap();
        repo.save_at(&first, &response, None, None, at_millis(1_700_000_000_001))
            .unwrap();

        let latest = repo.latest().unwrap();
        assert_eq!(latest.request.url, "http://second.com/");
    }

    #[test]
    fn test_latest_ignores_other_entries() {
        let temp_dir = TempDir::new().unwrap();
        let repo = repository(&temp_dir);
        let (request, response) = exchange("http://example.com/");
        let id = repo
            .save_at(&request, &response, None, None, at_millis(1_700_000_000_000))
            .unwrap();

        fs::write(repo.storage_dir().join("zzz-notes.txt"), "not a record").unwrap();
        fs::create_dir(repo.storage_dir().join("zzz.json")).unwrap();

        assert_eq!(repo.latest().unwrap().identifier, id);
    }

    #[test]
    fn test_latest_on_empty_store() {
        let temp_dir = TempDir::new().unwrap();
        let repo = repository(&temp_dir);

        // directory does not exist yet
        assert!(matches!(repo.latest(), Err(ProxyError::NoRecordsFound(_))));

        fs::create_dir_all(repo.storage_dir()).unwrap();
        assert!(matches!(repo.latest(), Err(ProxyError::NoRecordsFound(_))));
    }

    #[test]
    fn test_save_into_unwritable_location() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, "file, not a directory").unwrap();

        let repo = JsonFileRepository::new(blocker.join("json"), blocker.join("raw"), Encoding::Latin1);
        let (request, response) = exchange("http://example.com/");

        let err = repo.save(&request, &response, None, None).unwrap_err();
        assert!(matches!(err, ProxyError::StorageWriteFailure { .. }));
    }

    #[test]
    fn test_raw_mirror() {
        let temp_dir = TempDir::new().unwrap();
        let repo = repository(&temp_dir);
        let raw = b"GET http://example.com/ HTTP/1.1\r\nHost: example.com\r\nAccept: */*";
        let (request, response) = exchange("http://example.com/");

        let id = repo.save(&request, &response, None, Some(raw)).unwrap();
        assert_eq!(fs::read(repo.raw_path(&id)).unwrap(), raw.to_vec());

        let record = repo.latest().unwrap();
        assert_eq!(repo.raw_request(&record, RawParts::All).unwrap(), raw.to_vec());
    }

    #[test]
    fn test_raw_request_reconstruction() {
        let temp_dir = TempDir::new().unwrap();
        let repo = repository(&temp_dir);
        let request = ParsedRequest::new("POST", "/api")
            .with_header("Content-Type", "text/plain")
            .with_body("hello");
        let response = ParsedResponse::new(201, Vec::new(), "");

        repo.save(&request, &response, Some("x.com"), None).unwrap();
        let record = repo.latest().unwrap();

        let head = "POST /api HTTP/1.1\r\nHost: x.com\r\nContent-Type: text/plain";
        assert_eq!(
            repo.raw_request(&record, RawParts::All).unwrap(),
            format!("{}\r\n\r\nhello", head).into_bytes()
        );
        assert_eq!(
            repo.raw_request(&record, RawParts::Head).unwrap(),
            format!("{}\r\n", head).into_bytes()
        );
        assert_eq!(repo.raw_request(&record, RawParts::Body).unwrap(), b"hello".to_vec());
        assert!(repo.raw_request(&record, RawParts::None).unwrap().is_empty());
    }

    #[test]
    fn test_storage_kind_parse() {
        assert_eq!("JSON".parse::<StorageKind>().unwrap(), StorageKind::Json);
        assert!("sqlite".parse::<StorageKind>().is_err());
        assert_eq!(StorageKind::Json.to_string(), "json");
    }
}
