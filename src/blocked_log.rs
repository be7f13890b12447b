use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedUrlRecord {
    pub url: String,
    pub reasons: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Append-only sink for URLs that resolved unsafe.
///
/// Records are handed to a background worker over an unbounded channel so
/// callers never wait on I/O. Clones share the channel; [`close`] flushes it.
///
/// [`close`]: BlockedUrlLog::close
#[derive(Debug, Clone)]
pub struct BlockedUrlLog {
    sender: Arc<Mutex<Option<mpsc::UnboundedSender<BlockedUrlRecord>>>>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl BlockedUrlLog {
    /// Only logs blocked URLs, nothing is persisted.
    pub fn disabled() -> Self {
        Self::with_parts(None, None)
    }

    /// Route records to a caller-owned receiver.
    pub fn from_sender(sender: mpsc::UnboundedSender<BlockedUrlRecord>) -> Self {
        Self::with_parts(Some(sender), None)
    }

    fn with_parts(
        sender: Option<mpsc::UnboundedSender<BlockedUrlRecord>>,
        worker: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            sender: Arc::new(Mutex::new(sender)),
            worker: Arc::new(Mutex::new(worker)),
        }
    }

    /// Append records as JSON lines to `path`. Must be called inside a tokio runtime.
    pub fn to_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create blocked-URL log directory: {}", parent.display())
            })?;
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(async move {
            if let Err(e) = Self::file_worker(path, receiver).await {
                log::error!("Blocked-URL log worker error: {e}");
            }
        });

        Ok(Self::with_parts(Some(sender), Some(worker)))
    }

    pub fn record(&self, url: &str, reasons: &[String]) {
        log::warn!("Unsafe URL detected: {url}. Reasons: {}", reasons.join(", "));

        let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = sender.as_ref() else {
            return;
        };
        let record = BlockedUrlRecord {
            url: url.to_string(),
            reasons: reasons.to_vec(),
            timestamp: Utc::now(),
        };
        if let Err(e) = sender.send(record) {
            log::warn!("Failed to queue blocked-URL record: {e}");
        }
    }

    /// Stop accepting records and wait until everything queued is written.
    /// Later calls to [`record`](BlockedUrlLog::record) only log.
    pub async fn close(&self) {
        let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner()).take();
        drop(sender);

        let worker = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                log::error!("Blocked-URL log worker failed: {e}");
            }
        }
    }

    async fn file_worker(
        path: PathBuf,
        mut receiver: mpsc::UnboundedReceiver<BlockedUrlRecord>,
    ) -> Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open blocked-URL log: {}", path.display()))?;

        while let Some(record) = receiver.recv().await {
            let mut line = serde_json::to_string(&record)?;
            line.push('\n');
            if let Err(e) = file.write_all(line.as_bytes()).await {
                log::error!("Failed to append blocked-URL record: {e}");
                continue;
            }
            file.flush().await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_records_reach_receiver() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let log = BlockedUrlLog::from_sender(sender);
        log.record(
            "http://phishing-site.net/",
            &["Domain is on a known local blacklist.".to_string()],
        );

        let record = receiver.recv().await.unwrap();
        assert_eq!(record.url, "http://phishing-site.net/");
        assert_eq!(record.reasons.len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_log_is_a_no_op() {
        BlockedUrlLog::disabled().record("http://example.com/", &[]);
    }

    #[tokio::test]
    async fn test_close_flushes_pending_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocked.jsonl");
        let log = BlockedUrlLog::to_file(&path).unwrap();

        log.record("http://scam-domain.org/", &["blacklisted".to_string()]);
        log.clone().close().await;

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        let record: BlockedUrlRecord = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(record.url, "http://scam-domain.org/");

        // closed: logged only
        log.record("http://late.example/", &["too late".to_string()]);
        log.close().await;
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);
    }

    #[tokio::test]
    async fn test_file_sink_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("blocked.jsonl");
        let log = BlockedUrlLog::to_file(&path).unwrap();

        log.record("http://a.example/", &["one".to_string()]);
        log.record("http://b.example/", &["two".to_string(), "three".to_string()]);

        let mut lines = Vec::new();
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let content = tokio::fs::read_to_string(&path).await.unwrap_or_default();
            lines = content.lines().map(str::to_string).collect::<Vec<_>>();
            if lines.len() == 2 {
                break;
            }
        }

        assert_eq!(lines.len(), 2);
        let second: BlockedUrlRecord = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(second.url, "http://b.example/");
        assert_eq!(second.reasons, vec!["two".to_string(), "three".to_string()]);
    }
}
