//! Test support: logging setup, in-memory writers and a fake platform
//!
//! Public so integration tests under `tests/` can drive the dispatcher
//! end-to-end without a network.

use std::collections::{BTreeMap, VecDeque};
use std::env;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Once, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::domain::{
    Backup, BackupState, Branch, CreateBackupRequest, CreateBranchRequest, DataImport, Database,
};
use crate::infrastructure::{ApiError, ApiResult, AuthError, ClientFactory, PlatformApi};

static TEST_SETUP: Once = Once::new();

pub fn init_test_setup() {
    TEST_SETUP.call_once(|| {
        // assertions compare plain text
        colored::control::set_override(false);
        setup_test_logging();
        info!("Test Setup complete");
    });
}

fn setup_test_logging() {
    debug!("INIT: Attempting logger init from testing.rs");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let subscriber = tracing_subscriber::registry().with(
        fmt::layer()
            .with_test_writer()
            .with_target(true)
            .with_thread_names(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(env_filter),
    );

    if tracing::dispatcher::has_been_set() {
        debug!("Tracing subscriber already set");
    } else {
        subscriber.try_init().unwrap_or_else(|e| {
            eprintln!("Error: Failed to set up logging: {}", e);
        });
    }
    debug!("RUST_LOG={:?}", env::var("RUST_LOG").ok());
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cloneable in-memory writer; every clone appends to the same buffer.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&lock(&self.0)).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.0).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct FakeState {
    databases: BTreeMap<String, Database>,
    branches: BTreeMap<(String, String), Branch>,
    backups: BTreeMap<(String, String), Vec<Backup>>,
    backup_states: VecDeque<BackupState>,
    imports: BTreeMap<String, DataImport>,
    failure: Option<(u16, String)>,
    calls: Vec<String>,
    next_id: usize,
}

/// In-memory platform for one organization.
///
/// Records every call; unknown resources answer with the platform's
/// `not_found` error body.
#[derive(Debug)]
pub struct FakePlatform {
    org: String,
    state: Mutex<FakeState>,
}

impl FakePlatform {
    pub fn new(org: &str) -> Self {
        Self {
            org: org.to_string(),
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn with_database(self, name: &str) -> Self {
        lock(&self.state)
            .databases
            .insert(name.to_string(), database(name));
        self
    }

    /// Adds the database too when missing.
    pub fn with_branch(self, db: &str, name: &str) -> Self {
        {
            let mut state = lock(&self.state);
            state
                .databases
                .entry(db.to_string())
                .or_insert_with(|| database(db));
            state
                .branches
                .insert((db.to_string(), name.to_string()), branch(name, None));
        }
        self
    }

    /// States reported by successive `get_backup` calls. The last one sticks.
    pub fn with_backup_states<I>(self, states: I) -> Self
    where
        I: IntoIterator<Item = BackupState>,
    {
        lock(&self.state).backup_states = states.into_iter().collect();
        self
    }

    pub fn with_data_import(self, db: &str, import_state: &str) -> Self {
        lock(&self.state).imports.insert(
            db.to_string(),
            DataImport {
                id: format!("imp-{db}"),
                state: import_state.to_string(),
                import_check_errors: String::new(),
                started_at: Some(Utc::now()),
                finished_at: None,
            },
        );
        self
    }

    /// Every call fails with this API error body.
    pub fn failing_with(self, status: u16, code: &str) -> Self {
        lock(&self.state).failure = Some((status, code.to_string()));
        self
    }

    /// Calls made so far, as `operation:arg/arg`.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    pub fn has_branch(&self, db: &str, name: &str) -> bool {
        lock(&self.state)
            .branches
            .contains_key(&(db.to_string(), name.to_string()))
    }

    pub fn branch(&self, db: &str, name: &str) -> Option<Branch> {
        lock(&self.state)
            .branches
            .get(&(db.to_string(), name.to_string()))
            .cloned()
    }

    /// Record the call and apply org checks and configured failures.
    fn enter(&self, op: &str, org: &str, args: &[&str]) -> ApiResult<MutexGuard<'_, FakeState>> {
        let mut state = lock(&self.state);
        state.calls.push(format!("{op}:{}", args.join("/")));
        if let Some((status, code)) = &state.failure {
            return Err(api_error(*status, code));
        }
        if org != self.org {
            return Err(not_found("organization"));
        }
        Ok(state)
    }
}

fn database(name: &str) -> Database {
    Database {
        name: name.to_string(),
        notes: String::new(),
        state: Some("ready".to_string()),
        region: None,
        created_at: Utc::now(),
        updated_at: None,
    }
}

fn branch(name: &str, parent: Option<&str>) -> Branch {
    Branch {
        name: name.to_string(),
        parent_branch: parent.map(str::to_string),
        production: parent.is_none(),
        ready: true,
        created_at: Utc::now(),
        updated_at: None,
    }
}

fn api_error(status: u16, code: &str) -> ApiError {
    ApiError::Api {
        status,
        code: code.to_string(),
        message: format!("{code} ({status})"),
    }
}

fn not_found(what: &str) -> ApiError {
    ApiError::Api {
        status: 404,
        code: "not_found".to_string(),
        message: format!("{what} not found"),
    }
}

fn require_branch(state: &FakeState, db: &str, name: &str) -> ApiResult<Branch> {
    if !state.databases.contains_key(db) {
        return Err(not_found("database"));
    }
    state
        .branches
        .get(&(db.to_string(), name.to_string()))
        .cloned()
        .ok_or_else(|| not_found("branch"))
}

#[async_trait]
impl PlatformApi for FakePlatform {
    async fn list_databases(&self, org: &str) -> ApiResult<Vec<Database>> {
        let state = self.enter("list_databases", org, &[])?;
        Ok(state.databases.values().cloned().collect())
    }

    async fn get_database(&self, org: &str, db: &str) -> ApiResult<Database> {
        let state = self.enter("get_database", org, &[db])?;
        state
            .databases
            .get(db)
            .cloned()
            .ok_or_else(|| not_found("database"))
    }

    async fn list_branches(&self, org: &str, db: &str) -> ApiResult<Vec<Branch>> {
        let state = self.enter("list_branches", org, &[db])?;
        if !state.databases.contains_key(db) {
            return Err(not_found("database"));
        }
        Ok(state
            .branches
            .iter()
            .filter(|((d, _), _)| d == db)
            .map(|(_, b)| b.clone())
            .collect())
    }

    async fn get_branch(&self, org: &str, db: &str, name: &str) -> ApiResult<Branch> {
        let state = self.enter("get_branch", org, &[db, name])?;
        require_branch(&state, db, name)
    }

    async fn create_branch(
        &self,
        org: &str,
        db: &str,
        request: &CreateBranchRequest,
    ) -> ApiResult<Branch> {
        let mut state = self.enter("create_branch", org, &[db, request.name.as_str()])?;
        require_branch(&state, db, &request.parent_branch)?;
        let key = (db.to_string(), request.name.clone());
        if state.branches.contains_key(&key) {
            return Err(api_error(409, "conflict"));
        }
        let created = branch(&request.name, Some(&request.parent_branch));
        state.branches.insert(key, created.clone());
        Ok(created)
    }

    async fn delete_branch(&self, org: &str, db: &str, name: &str) -> ApiResult<()> {
        let mut state = self.enter("delete_branch", org, &[db, name])?;
        require_branch(&state, db, name)?;
        state.branches.remove(&(db.to_string(), name.to_string()));
        Ok(())
    }

    async fn list_backups(&self, org: &str, db: &str, name: &str) -> ApiResult<Vec<Backup>> {
        let state = self.enter("list_backups", org, &[db, name])?;
        require_branch(&state, db, name)?;
        Ok(state
            .backups
            .get(&(db.to_string(), name.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_backup(&self, org: &str, db: &str, name: &str, id: &str) -> ApiResult<Backup> {
        let mut state = self.enter("get_backup", org, &[db, name, id])?;
        require_branch(&state, db, name)?;
        let next = if state.backup_states.len() > 1 {
            state.backup_states.pop_front()
        } else {
            state.backup_states.front().copied()
        };
        let backup = state
            .backups
            .get_mut(&(db.to_string(), name.to_string()))
            .and_then(|list| list.iter_mut().find(|b| b.id == id))
            .ok_or_else(|| not_found("backup"))?;
        if let Some(next) = next {
            backup.state = next;
            if next.is_terminal() {
                backup.completed_at = Some(Utc::now());
            }
        }
        Ok(backup.clone())
    }

    async fn create_backup(
        &self,
        org: &str,
        db: &str,
        name: &str,
        request: &CreateBackupRequest,
    ) -> ApiResult<Backup> {
        let mut state = self.enter("create_backup", org, &[db, name])?;
        require_branch(&state, db, name)?;
        state.next_id += 1;
        let id = format!("bk-{}", state.next_id);
        let backup = Backup {
            name: request
                .name
                .clone()
                .unwrap_or_else(|| format!("backup-{}", state.next_id)),
            id,
            state: BackupState::Pending,
            size: 0,
            created_at: Utc::now(),
            completed_at: None,
        };
        state
            .backups
            .entry((db.to_string(), name.to_string()))
            .or_default()
            .push(backup.clone());
        Ok(backup)
    }

    async fn delete_backup(&self, org: &str, db: &str, name: &str, id: &str) -> ApiResult<()> {
        let mut state = self.enter("delete_backup", org, &[db, name, id])?;
        require_branch(&state, db, name)?;
        let list = state
            .backups
            .entry((db.to_string(), name.to_string()))
            .or_default();
        let before = list.len();
        list.retain(|b| b.id != id);
        if list.len() == before {
            return Err(not_found("backup"));
        }
        Ok(())
    }

    async fn get_data_import(&self, org: &str, db: &str) -> ApiResult<DataImport> {
        let state = self.enter("get_data_import", org, &[db])?;
        state
            .imports
            .get(db)
            .cloned()
            .ok_or_else(|| not_found("data import"))
    }

    async fn make_primary(&self, org: &str, db: &str) -> ApiResult<DataImport> {
        let mut state = self.enter("make_primary", org, &[db])?;
        let import = state
            .imports
            .get_mut(db)
            .ok_or_else(|| not_found("data import"))?;
        import.state = "switched_traffic_to_primary".to_string();
        Ok(import.clone())
    }
}

/// Hands out one shared [`FakePlatform`] and counts connections.
#[derive(Debug)]
pub struct FakeFactory {
    platform: Arc<FakePlatform>,
    connects: AtomicUsize,
}

impl FakeFactory {
    pub fn new(platform: Arc<FakePlatform>) -> Self {
        Self {
            platform,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl ClientFactory for FakeFactory {
    fn connect(&self, _api_url: &str, token: &str) -> Result<Arc<dyn PlatformApi>, AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::MissingToken);
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.platform.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_test_setup() {
        init_test_setup();
    }

    #[tokio::test]
    async fn given_fake_with_branch_when_creating_backup_then_listed() {
        let fake = FakePlatform::new("acme").with_branch("app", "main");

        let backup = fake
            .create_backup("acme", "app", "main", &CreateBackupRequest::default())
            .await
            .unwrap();
        let listed = fake.list_backups("acme", "app", "main").await.unwrap();

        assert_eq!(listed, vec![backup]);
        assert_eq!(
            fake.calls(),
            vec!["create_backup:app/main", "list_backups:app/main"]
        );
    }

    #[tokio::test]
    async fn given_other_org_when_calling_then_not_found() {
        let fake = FakePlatform::new("acme").with_database("app");

        let err = fake.get_database("other", "app").await.unwrap_err();

        assert!(matches!(err, ApiError::Api { status: 404, .. }));
    }
}
