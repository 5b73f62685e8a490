//! Remote API boundary traits
//!
//! Handlers talk to the platform only through [`PlatformApi`], so they never
//! see HTTP status codes and can be tested against an in-memory fake.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::EffectiveConfig;
use crate::domain::{
    Backup, Branch, CreateBackupRequest, CreateBranchRequest, DataImport, Database,
};
use crate::infrastructure::error::{ApiResult, AuthError};

/// Call surface of the platform API. One method per remote operation.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn list_databases(&self, org: &str) -> ApiResult<Vec<Database>>;

    async fn get_database(&self, org: &str, database: &str) -> ApiResult<Database>;

    async fn list_branches(&self, org: &str, database: &str) -> ApiResult<Vec<Branch>>;

    async fn get_branch(&self, org: &str, database: &str, branch: &str) -> ApiResult<Branch>;

    async fn create_branch(
        &self,
        org: &str,
        database: &str,
        request: &CreateBranchRequest,
    ) -> ApiResult<Branch>;

    async fn delete_branch(&self, org: &str, database: &str, branch: &str) -> ApiResult<()>;

    async fn list_backups(&self, org: &str, database: &str, branch: &str)
        -> ApiResult<Vec<Backup>>;

    async fn get_backup(
        &self,
        org: &str,
        database: &str,
        branch: &str,
        id: &str,
    ) -> ApiResult<Backup>;

    async fn create_backup(
        &self,
        org: &str,
        database: &str,
        branch: &str,
        request: &CreateBackupRequest,
    ) -> ApiResult<Backup>;

    async fn delete_backup(
        &self,
        org: &str,
        database: &str,
        branch: &str,
        id: &str,
    ) -> ApiResult<()>;

    async fn get_data_import(&self, org: &str, database: &str) -> ApiResult<DataImport>;

    /// Promote the platform-side database to primary; the external database becomes a replica.
    async fn make_primary(&self, org: &str, database: &str) -> ApiResult<DataImport>;
}

/// Builds API clients bound to an endpoint and credential.
///
/// Implementations must not perform network I/O.
pub trait ClientFactory: Send + Sync {
    fn connect(&self, api_url: &str, token: &str) -> Result<Arc<dyn PlatformApi>, AuthError>;
}

/// Create a client for the resolved config.
///
/// Fails with [`AuthError::MissingToken`] before the factory is consulted
/// when no layer supplied a token.
pub fn new_client(
    config: &EffectiveConfig,
    factory: &dyn ClientFactory,
) -> Result<Arc<dyn PlatformApi>, AuthError> {
    let token = config
        .access_token()
        .filter(|t| !t.trim().is_empty())
        .ok_or(AuthError::MissingToken)?;
    factory.connect(config.api_url(), token)
}
