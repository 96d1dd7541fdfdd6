//! Order collection exported as a directory of JSON documents
//!
//! Each `<id>.json` file holds one document's field map. Live queries poll
//! the directory and redeliver the full snapshot whenever its contents
//! change.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use fs2::FileExt;
use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, error, warn};

use super::{Document, OrderFilter, OrderStore, Snapshot, SnapshotSink, Watch, STATUS_FIELD};
use crate::types::{OrderStatus, Result, SalesboardError};

/// Cheap change detector for the export directory
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fingerprint {
    files: usize,
    bytes: u64,
    latest: Option<SystemTime>,
}

/// Directory-backed order store
#[derive(Debug, Clone)]
pub struct DirStore {
    dir: PathBuf,
    poll_interval: Duration,
}

impl DirStore {
    pub fn new(dir: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            poll_interval,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding document `id`
    pub fn document_path(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(SalesboardError::Parse(format!(
                "invalid document id '{}'",
                id
            )));
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }

    fn rewrite_status(path: &Path, id: &str, status: OrderStatus) -> Result<()> {
        let mut value = read_json(path)?;
        let Value::Object(fields) = &mut value else {
            return Err(SalesboardError::MalformedRecord {
                id: id.to_string(),
                reason: "document is not a JSON object".into(),
            });
        };
        fields.insert(
            STATUS_FIELD.to_string(),
            Value::String(status.as_str().to_string()),
        );

        let content = serde_json::to_string_pretty(&value)
            .map_err(|e| SalesboardError::Parse(format!("Serialization failed: {}", e)))?;

        let temp_path = path.with_extension("json.tmp");
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, path)?;
        Ok(())
    }
}

/// Collect all document files in the directory
fn collect_files(dir: &Path) -> std::result::Result<Vec<PathBuf>, String> {
    if !dir.is_dir() {
        return Err(format!("store directory {} is not readable", dir.display()));
    }
    let pattern = dir.join("*.json");
    let paths = glob::glob(&pattern.to_string_lossy()).map_err(|e| e.to_string())?;
    Ok(paths.filter_map(|p| p.ok()).filter(|p| p.is_file()).collect())
}

fn fingerprint(dir: &Path) -> std::result::Result<Fingerprint, String> {
    let files = collect_files(dir)?;
    let mut print = Fingerprint {
        files: files.len(),
        bytes: 0,
        latest: None,
    };
    for file in &files {
        // A file deleted between glob and stat shows up on the next poll
        let Ok(meta) = file.metadata() else { continue };
        print.bytes = print.bytes.saturating_add(meta.len());
        if let Ok(mtime) = meta.modified() {
            print.latest = print.latest.max(Some(mtime));
        }
    }
    Ok(print)
}

fn read_json(path: &Path) -> Result<Value> {
    let mut bytes = fs::read(path)?;
    simd_json::from_slice(&mut bytes).map_err(|e| SalesboardError::Parse(e.to_string()))
}

fn read_document(path: &Path) -> Result<Document> {
    let id = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match read_json(path)? {
        Value::Object(fields) => Ok(Document::new(id, fields)),
        _ => Err(SalesboardError::MalformedRecord {
            id,
            reason: "document is not a JSON object".into(),
        }),
    }
}

/// Decode every document file in parallel; unreadable files are skipped
fn read_documents(dir: &Path) -> Result<Vec<Document>> {
    let files = collect_files(dir).map_err(SalesboardError::Transport)?;
    let mut documents: Vec<Document> = files
        .par_iter()
        .filter_map(|f| match read_document(f) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!(file = %f.display(), error = %e, "failed to read document");
                None
            }
        })
        .collect();
    documents.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(documents)
}

fn poll_loop(
    dir: PathBuf,
    filter: OrderFilter,
    interval: Duration,
    sink: SnapshotSink,
    stop: Arc<AtomicBool>,
) {
    let mut last: Option<std::result::Result<Fingerprint, String>> = None;

    while !stop.load(Ordering::SeqCst) {
        let current = fingerprint(&dir);
        if last.as_ref() != Some(&current) {
            let event = match &current {
                Ok(_) => read_documents(&dir).map(|docs| filter.apply(docs)),
                Err(message) => Err(SalesboardError::Transport(message.clone())),
            };
            if stop.load(Ordering::SeqCst) {
                break;
            }
            match &event {
                Ok(snapshot) => {
                    debug!(dir = %dir.display(), documents = snapshot.len(), "directory changed")
                }
                Err(e) => error!(dir = %dir.display(), error = %e, "directory poll failed"),
            }
            sink(event);
            last = Some(current);
        }
        thread::park_timeout(interval);
    }
    debug!(dir = %dir.display(), "directory watch stopped");
}

impl OrderStore for DirStore {
    fn watch(&self, filter: OrderFilter, sink: SnapshotSink) -> Result<Watch> {
        let dir = self.dir.clone();
        let interval = self.poll_interval;
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("salesboard-dir-watch".into())
            .spawn(move || poll_loop(dir, filter, interval, sink, stop_flag))?;
        let poller = handle.thread().clone();

        Ok(Watch::new(move || {
            stop.store(true, Ordering::SeqCst);
            poller.unpark();
        }))
    }

    fn get(&self, id: &str) -> Result<Option<Document>> {
        let path = self.document_path(id)?;
        if !path.is_file() {
            return Ok(None);
        }
        read_document(&path).map(Some)
    }

    fn query(&self, filter: OrderFilter) -> Result<Snapshot> {
        read_documents(&self.dir).map(|docs| filter.apply(docs))
    }

    /// Rewrite one document under an exclusive lock (temp file + rename)
    fn set_status(&self, id: &str, status: OrderStatus) -> Result<()> {
        let path = self.document_path(id)?;
        if !path.is_file() {
            return Err(SalesboardError::NotFound(id.to_string()));
        }

        // The rename replaces the document's inode, so writers serialize on
        // a sidecar that outlives every rewrite
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path.with_extension("json.lock"))?;
        lock.lock_exclusive().map_err(|e| {
            SalesboardError::Transport(format!("Failed to acquire write lock: {}", e))
        })?;

        let result = Self::rewrite_status(&path, id, status);

        let _ = lock.unlock();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::mpsc;
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(5);

    fn write_doc(dir: &Path, id: &str, value: Value) {
        fs::write(dir.join(format!("{}.json", id)), value.to_string()).unwrap();
    }

    fn create_test_store() -> (DirStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = DirStore::new(temp_dir.path(), Duration::from_millis(20));
        (store, temp_dir)
    }

    fn channel_sink() -> (SnapshotSink, mpsc::Receiver<Result<Snapshot>>) {
        let (tx, rx) = mpsc::channel();
        let sink: SnapshotSink = Arc::new(move |event| {
            let _ = tx.send(event);
        });
        (sink, rx)
    }

    #[test]
    fn test_query_reads_all_documents_sorted() {
        let (store, temp) = create_test_store();
        write_doc(temp.path(), "b", json!({"status": "completed", "totalAmount": 20}));
        write_doc(temp.path(), "a", json!({"status": "processing", "totalAmount": 10}));

        let snapshot = store.query(OrderFilter::all()).unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.documents[0].id, "a");
        assert_eq!(snapshot.documents[1].id, "b");
    }

    #[test]
    fn test_query_filters_by_status() {
        let (store, temp) = create_test_store();
        write_doc(temp.path(), "a", json!({"status": "processing"}));
        write_doc(temp.path(), "b", json!({"status": "completed"}));

        let snapshot = store
            .query(OrderFilter::status(OrderStatus::Completed))
            .unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.documents[0].id, "b");
    }

    #[test]
    fn test_query_skips_unreadable_files() {
        let (store, temp) = create_test_store();
        write_doc(temp.path(), "good", json!({"status": "processing"}));
        fs::write(temp.path().join("broken.json"), "{not json").unwrap();
        fs::write(temp.path().join("array.json"), "[1, 2]").unwrap();
        fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

        let snapshot = store.query(OrderFilter::all()).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.documents[0].id, "good");
    }

    #[test]
    fn test_query_missing_directory_is_transport_error() {
        let store = DirStore::new("/nonexistent/salesboard/orders", Duration::from_millis(20));
        let err = store.query(OrderFilter::all()).unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn test_get_existing_and_missing() {
        let (store, temp) = create_test_store();
        write_doc(temp.path(), "a", json!({"totalAmount": 10}));

        let doc = store.get("a").unwrap().unwrap();
        assert_eq!(doc.id, "a");
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_document_path_rejects_traversal() {
        let (store, _temp) = create_test_store();
        assert!(store.document_path("../etc/passwd").is_err());
        assert!(store.document_path("").is_err());
        assert!(store.document_path("..").is_err());
        assert!(store.document_path("order-1").is_ok());
    }

    #[test]
    fn test_set_status_rewrites_document() {
        let (store, temp) = create_test_store();
        write_doc(
            temp.path(),
            "a",
            json!({"status": "processing", "totalAmount": 10, "orderId": "A-1"}),
        );

        store.set_status("a", OrderStatus::Completed).unwrap();

        let doc = store.get("a").unwrap().unwrap();
        assert_eq!(doc.field_str("status"), Some("completed"));
        assert_eq!(doc.field_str("orderId"), Some("A-1"));
        assert!(!temp.path().join("a.json.tmp").exists());
    }

    #[test]
    fn test_set_status_concurrent_writers_keep_document_intact() {
        let (store, temp) = create_test_store();
        write_doc(
            temp.path(),
            "a",
            json!({"status": "processing", "totalAmount": 10, "orderId": "A-1"}),
        );

        let writers: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || {
                    let status = if i % 2 == 0 {
                        OrderStatus::Completed
                    } else {
                        OrderStatus::Cancelled
                    };
                    store.set_status("a", status)
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap().unwrap();
        }

        let doc = store.get("a").unwrap().unwrap();
        assert_eq!(doc.field_str("orderId"), Some("A-1"));
        assert!(matches!(
            doc.field_str("status"),
            Some("completed") | Some("cancelled")
        ));
        assert!(temp.path().join("a.json.lock").exists());
        assert!(!temp.path().join("a.json.tmp").exists());
        assert_eq!(store.query(OrderFilter::all()).unwrap().len(), 1);
    }

    #[test]
    fn test_set_status_missing_document() {
        let (store, _temp) = create_test_store();
        let err = store.set_status("ghost", OrderStatus::Completed).unwrap_err();
        assert!(matches!(err, SalesboardError::NotFound(_)));
    }

    #[test]
    fn test_watch_delivers_initial_and_changed_snapshots() {
        let (store, temp) = create_test_store();
        write_doc(temp.path(), "a", json!({"status": "completed", "totalAmount": 10}));
        let (sink, rx) = channel_sink();

        let _watch = store.watch(OrderFilter::all(), sink).unwrap();

        let initial = rx.recv_timeout(WAIT).unwrap().unwrap();
        assert_eq!(initial.len(), 1);

        write_doc(temp.path(), "b", json!({"status": "completed", "totalAmount": 5}));

        let changed = rx.recv_timeout(WAIT).unwrap().unwrap();
        assert_eq!(changed.len(), 2);
    }

    #[test]
    fn test_watch_missing_directory_reports_transport_error() {
        let store = DirStore::new("/nonexistent/salesboard/orders", Duration::from_millis(20));
        let (sink, rx) = channel_sink();

        let _watch = store.watch(OrderFilter::all(), sink).unwrap();

        let err = rx.recv_timeout(WAIT).unwrap().unwrap_err();
        assert!(err.is_transport());
        // Same failure is not re-reported on every poll
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_watch_cancel_stops_polling() {
        let (store, temp) = create_test_store();
        let (sink, rx) = channel_sink();
        let watch = store.watch(OrderFilter::all(), sink).unwrap();
        let _ = rx.recv_timeout(WAIT).unwrap();

        watch.cancel();
        thread::sleep(Duration::from_millis(60));
        while rx.try_recv().is_ok() {}

        write_doc(temp.path(), "late", json!({"status": "completed"}));
        thread::sleep(Duration::from_millis(150));

        assert!(rx.try_recv().is_err());
    }
}
