//! Session context.
//!
//! A [`Session`] owns the table the user is working on. Every request names
//! its session explicitly; there is no process-wide "current table".
//! The [`SessionStore`] keeps the sessions of the HTTP server and drops
//! the ones left idle for longer than its timeout.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::api::logs::{log_error, log_info, log_info_indent, log_success};
use crate::error::{LoadResult, PipelineResult, SessionError};
use crate::export::{export_named, ExportFormat, ExportPayload};
use crate::models::Table;
use crate::parser::{parse_bytes, parse_str, LoadOptions};
use crate::transform::{run, PipelineRun, TransformRequest};

/// Idle time after which the store drops a session.
pub const DEFAULT_IDLE_MINUTES: i64 = 30;

/// The bundled employee dataset.
pub const SAMPLE_DATA: &str = include_str!("../../data/sample_data.csv");

/// Parse the bundled sample dataset.
pub fn sample_table() -> LoadResult<Table> {
    parse_str(SAMPLE_DATA, ',')
}

/// Where the current table came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TableSource {
    #[serde(rename_all = "camelCase")]
    Upload { file_name: String },
    Sample,
}

/// A successfully loaded table and its provenance.
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub table: Table,
    pub source: TableSource,
    pub encoding: String,
    pub loaded_at: DateTime<Utc>,
}

/// One user's working context.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    loaded: Option<LoadedTable>,
    export_basename: String,
    last_access: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            loaded: None,
            export_basename: crate::export::DEFAULT_BASENAME.to_string(),
            last_access: Utc::now(),
        }
    }

    /// Mark the session as used now.
    pub fn touch(&mut self) {
        self.last_access = Utc::now();
    }

    pub fn last_access(&self) -> DateTime<Utc> {
        self.last_access
    }

    /// Whether the session has been unused for longer than `timeout` at `now`.
    pub fn is_idle(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.last_access > timeout
    }

    /// Name exported files `<basename>.<ext>`.
    pub fn with_export_basename(mut self, basename: impl Into<String>) -> Self {
        self.export_basename = basename.into();
        self
    }

    pub fn loaded(&self) -> Option<&LoadedTable> {
        self.loaded.as_ref()
    }

    /// The current table, if any.
    pub fn table(&self) -> Option<&Table> {
        self.loaded.as_ref().map(|l| &l.table)
    }

    /// Load uploaded CSV bytes. On failure the previous table is kept.
    pub fn load_bytes(
        &mut self,
        file_name: &str,
        bytes: &[u8],
        options: &LoadOptions,
    ) -> LoadResult<&LoadedTable> {
        log_info(format!("Loading {} ({} bytes)", file_name, bytes.len()));
        let parsed = parse_bytes(bytes, options).map_err(|e| {
            log_error(format!("Error reading CSV file: {}", e));
            e
        })?;

        log_success(format!(
            "Loaded {} rows × {} columns ({})",
            parsed.table.row_count(),
            parsed.table.column_count(),
            parsed.encoding
        ));
        for column in parsed.table.columns() {
            log_info_indent(format!("{} ({:?})", column.name(), column.dtype()), 1);
        }
        Ok(self.adopt(LoadedTable {
            table: parsed.table,
            source: TableSource::Upload {
                file_name: file_name.to_string(),
            },
            encoding: parsed.encoding,
            loaded_at: Utc::now(),
        }))
    }

    /// Replace the current table with the bundled sample.
    pub fn load_sample(&mut self) -> LoadResult<&LoadedTable> {
        let table = sample_table()?;
        log_success(format!("Loaded sample data ({} rows)", table.row_count()));
        Ok(self.adopt(LoadedTable {
            table,
            source: TableSource::Sample,
            encoding: "utf-8".to_string(),
            loaded_at: Utc::now(),
        }))
    }

    fn adopt(&mut self, loaded: LoadedTable) -> &LoadedTable {
        self.loaded.insert(loaded)
    }

    fn require_table(&self) -> Result<&Table, SessionError> {
        self.table().ok_or(SessionError::NoTable)
    }

    /// Run the pipeline over the current table.
    pub fn run(&self, request: &TransformRequest) -> PipelineResult<PipelineRun> {
        let table = self.require_table()?;
        Ok(run(table, request)?)
    }

    /// Run the pipeline and encode the result.
    pub fn export(
        &self,
        request: &TransformRequest,
        format: ExportFormat,
    ) -> PipelineResult<ExportPayload> {
        let result = self.run(request)?;
        Ok(export_named(&result.table, format, &self.export_basename)?)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Sessions of the HTTP server, keyed by id.
///
/// Each session has its own lock, so a long pipeline run only blocks
/// requests for the same session. The map lock is held just long enough to
/// look up, insert or drop an entry.
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<Session>>>>,
    export_basename: Option<String>,
    idle_timeout: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            export_basename: None,
            idle_timeout: Duration::minutes(DEFAULT_IDLE_MINUTES),
        }
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// New sessions name their exports `<basename>.<ext>`.
    pub fn with_export_basename(mut self, basename: impl Into<String>) -> Self {
        self.export_basename = Some(basename.into());
        self
    }

    /// Drop sessions unused for longer than `timeout`.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Open a new empty session and return its id. Idle sessions are
    /// dropped first.
    pub async fn create(&self) -> Uuid {
        let mut session = Session::new();
        if let Some(basename) = &self.export_basename {
            session = session.with_export_basename(basename.clone());
        }
        let id = session.id;

        let mut sessions = self.sessions.write().await;
        self.evict(&mut sessions, Utc::now());
        sessions.insert(id, Arc::new(Mutex::new(session)));
        drop(sessions);

        log_info(format!("Session {} opened", id));
        id
    }

    /// Drop a session.
    pub async fn remove(&self, id: Uuid) -> Result<(), SessionError> {
        self.sessions
            .write()
            .await
            .remove(&id)
            .map(|_| log_info(format!("Session {} closed", id)))
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Run `f` with exclusive access to a session. A session found idle is
    /// dropped and reported as not found.
    pub async fn with_session<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Session) -> T,
    ) -> Result<T, SessionError> {
        let slot = self
            .sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        let mut session = slot.lock().await;
        if session.is_idle(Utc::now(), self.idle_timeout) {
            drop(session);
            self.sessions.write().await.remove(&id);
            log_info(format!("Session {} expired", id));
            return Err(SessionError::NotFound(id.to_string()));
        }
        session.touch();
        Ok(f(&mut *session))
    }

    /// Drop every session idle at `now`; returns how many were dropped.
    pub async fn evict_idle_at(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().await;
        self.evict(&mut sessions, now)
    }

    // Sessions busy with a request are never idle.
    fn evict(
        &self,
        sessions: &mut HashMap<Uuid, Arc<Mutex<Session>>>,
        now: DateTime<Utc>,
    ) -> usize {
        let before = sessions.len();
        sessions.retain(|_, slot| match slot.try_lock() {
            Ok(session) => !session.is_idle(now, self.idle_timeout),
            Err(_) => true,
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            log_info(format!("Dropped {} idle session(s)", evicted));
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LoadError, PipelineError};
    use crate::transform::DepartmentFilter;

    #[test]
    fn test_sample_has_expected_columns() {
        let table = sample_table().unwrap();
        for name in ["department", "age", "salary", "join_date"] {
            assert!(table.has_column(name), "missing {}", name);
        }
        assert_eq!(table.row_count(), 10);
    }

    #[test]
    fn test_failed_load_keeps_previous_table() {
        let mut session = Session::new();
        session
            .load_bytes("staff.csv", b"name,age\nAnn,30\n", &LoadOptions::default())
            .unwrap();

        let err = session
            .load_bytes("broken.csv", b"a,b\n1,2,3\n", &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, LoadError::FieldCount { .. }));

        let loaded = session.loaded().unwrap();
        assert_eq!(
            loaded.source,
            TableSource::Upload {
                file_name: "staff.csv".into()
            }
        );
        assert_eq!(loaded.table.column_names(), vec!["name", "age"]);
    }

    #[test]
    fn test_empty_file_is_a_load_error() {
        let mut session = Session::new();
        let err = session
            .load_bytes("empty.csv", b"", &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, LoadError::EmptyInput));
        assert!(session.table().is_none());
    }

    #[test]
    fn test_run_without_table() {
        let session = Session::new();
        let err = session.run(&TransformRequest::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Session(SessionError::NoTable)));

        let err = session
            .export(&TransformRequest::default(), ExportFormat::Csv)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Session(SessionError::NoTable)));
    }

    #[test]
    fn test_export_uses_basename() {
        let mut session = Session::new().with_export_basename("staff");
        session.load_sample().unwrap();

        let request = TransformRequest {
            department: Some(DepartmentFilter::equals("Engineering")),
            ..Default::default()
        };
        let payload = session.export(&request, ExportFormat::Csv).unwrap();
        assert_eq!(payload.file_name, "staff.csv");

        let text = String::from_utf8(payload.bytes).unwrap();
        assert_eq!(text.lines().count(), 4);
    }

    #[tokio::test]
    async fn test_store_lifecycle() {
        let store = SessionStore::new();
        let id = store.create().await;
        assert_eq!(store.len().await, 1);

        let rows = store
            .with_session(id, |session| {
                session.load_sample().map(|l| l.table.row_count())
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rows, 10);

        store.remove(id).await.unwrap();
        assert!(store.is_empty().await);
        assert!(matches!(
            store.remove(id).await,
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_store_unknown_session() {
        let store = SessionStore::new();
        let result = store.with_session(Uuid::new_v4(), |_| ()).await;
        assert!(matches!(result, Err(SessionError::NotFound(_))));
    }

    #[test]
    fn test_session_idle_after_timeout() {
        let mut session = Session::new();
        let later = session.last_access() + Duration::minutes(31);
        assert!(session.is_idle(later, Duration::minutes(30)));
        assert!(!session.is_idle(later, Duration::minutes(45)));

        session.touch();
        assert!(!session.is_idle(session.last_access(), Duration::zero()));
    }

    #[tokio::test]
    async fn test_idle_sessions_are_evicted() {
        let store = SessionStore::new();
        let id = store.create().await;

        assert_eq!(store.evict_idle_at(Utc::now() + Duration::minutes(10)).await, 0);
        assert_eq!(store.len().await, 1);

        assert_eq!(store.evict_idle_at(Utc::now() + Duration::minutes(31)).await, 1);
        assert!(store.is_empty().await);
        assert!(matches!(
            store.with_session(id, |_| ()).await,
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_drops_idle_sessions() {
        let store = SessionStore::new().with_idle_timeout(Duration::zero());
        let stale = store.create().await;
        std::thread::sleep(std::time::Duration::from_millis(5));

        store.create().await;
        assert_eq!(store.len().await, 1);
        assert!(matches!(
            store.with_session(stale, |_| ()).await,
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_idle_session_is_not_found_on_access() {
        let store = SessionStore::new().with_idle_timeout(Duration::zero());
        let id = store.create().await;
        std::thread::sleep(std::time::Duration::from_millis(5));

        let result = store.with_session(id, |_| ()).await;
        assert!(matches!(result, Err(SessionError::NotFound(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_sessions_lock_independently() {
        let store = SessionStore::new();
        let a = store.create().await;
        let b = store.create().await;

        let slot = store.sessions.read().await.get(&a).cloned().unwrap();
        let _busy = slot.lock().await;

        // `a` is held; `b` is still reachable
        let rows = store
            .with_session(b, |session| session.load_sample().map(|l| l.table.row_count()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rows, 10);
        assert_eq!(store.evict_idle_at(Utc::now() + Duration::days(1)).await, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_store_basename_applies_to_new_sessions() {
        let store = SessionStore::new().with_export_basename("report");
        let id = store.create().await;
        let name = store
            .with_session(id, |session| {
                session.load_sample().unwrap();
                session
                    .export(&TransformRequest::default(), ExportFormat::Json)
                    .map(|p| p.file_name)
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(name, "report.json");
    }
}
