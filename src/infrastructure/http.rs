//! HTTP implementation of [`PlatformApi`] on top of `reqwest`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::domain::{
    Backup, Branch, CreateBackupRequest, CreateBranchRequest, DataImport, Database, ErrorBody,
    Page,
};
use crate::infrastructure::error::{ApiError, ApiResult, AuthError};
use crate::infrastructure::traits::{ClientFactory, PlatformApi};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!("psdb/", env!("CARGO_PKG_VERSION"));
const MAX_ERROR_BODY: usize = 512;

/// Platform API client. Construction is lazy: nothing touches the network
/// until the first call.
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base: Url,
}

impl HttpClient {
    pub fn new(api_url: &str, token: &str) -> Result<Self, AuthError> {
        let base = Url::parse(api_url).map_err(|e| AuthError::InvalidUrl {
            url: api_url.to_string(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(AuthError::InvalidUrl {
                url: api_url.to_string(),
                reason: "not a base URL".into(),
            });
        }

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
            .map_err(|_| AuthError::InvalidToken)?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(AuthError::Client)?;

        Ok(Self { http, base })
    }

    /// Append percent-encoded path segments to the base URL.
    pub fn endpoint(&self, segments: &[&str]) -> ApiResult<Url> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| ApiError::Endpoint(self.base.to_string()))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> ApiResult<RequestBuilder> {
        let url = self.endpoint(segments)?;
        debug!("{} {}", method, url);
        Ok(self.http.request(method, url))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let (status, body) = execute(request).await?;
        decode(status, &body)
    }

    async fn send_empty(&self, request: RequestBuilder) -> ApiResult<()> {
        let (status, body) = execute(request).await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(error_from(status, &body))
        }
    }
}

async fn execute(request: RequestBuilder) -> ApiResult<(StatusCode, Vec<u8>)> {
    let response = request.send().await.map_err(ApiError::Transport)?;
    let status = response.status();
    let body = response.bytes().await.map_err(ApiError::Transport)?;
    trace!("HTTP {} ({} bytes)", status, body.len());
    Ok((status, body.to_vec()))
}

/// Turn a response into a payload or a raw [`ApiError`].
pub fn decode<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> ApiResult<T> {
    if status.is_success() {
        serde_json::from_slice(body).map_err(|source| ApiError::Malformed {
            status: status.as_u16(),
            source,
        })
    } else {
        Err(error_from(status, body))
    }
}

fn error_from(status: StatusCode, body: &[u8]) -> ApiError {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(err) => ApiError::Api {
            status: status.as_u16(),
            code: err.code,
            message: err.message,
        },
        Err(_) => {
            let text = String::from_utf8_lossy(body);
            let body = if text.trim().is_empty() {
                status.canonical_reason().unwrap_or("no body").to_string()
            } else {
                text.trim().chars().take(MAX_ERROR_BODY).collect()
            };
            ApiError::Status {
                status: status.as_u16(),
                body,
            }
        }
    }
}

#[async_trait]
impl PlatformApi for HttpClient {
    async fn list_databases(&self, org: &str) -> ApiResult<Vec<Database>> {
        let req = self.request(Method::GET, &["organizations", org, "databases"])?;
        let page: Page<Database> = self.send(req).await?;
        Ok(page.data)
    }

    async fn get_database(&self, org: &str, database: &str) -> ApiResult<Database> {
        let req = self.request(Method::GET, &["organizations", org, "databases", database])?;
        self.send(req).await
    }

    async fn list_branches(&self, org: &str, database: &str) -> ApiResult<Vec<Branch>> {
        let req = self.request(
            Method::GET,
            &["organizations", org, "databases", database, "branches"],
        )?;
        let page: Page<Branch> = self.send(req).await?;
        Ok(page.data)
    }

    async fn get_branch(&self, org: &str, database: &str, branch: &str) -> ApiResult<Branch> {
        let req = self.request(
            Method::GET,
            &["organizations", org, "databases", database, "branches", branch],
        )?;
        self.send(req).await
    }

    async fn create_branch(
        &self,
        org: &str,
        database: &str,
        request: &CreateBranchRequest,
    ) -> ApiResult<Branch> {
        let req = self
            .request(
                Method::POST,
                &["organizations", org, "databases", database, "branches"],
            )?
            .json(request);
        self.send(req).await
    }

    async fn delete_branch(&self, org: &str, database: &str, branch: &str) -> ApiResult<()> {
        let req = self.request(
            Method::DELETE,
            &["organizations", org, "databases", database, "branches", branch],
        )?;
        self.send_empty(req).await
    }

    async fn list_backups(
        &self,
        org: &str,
        database: &str,
        branch: &str,
    ) -> ApiResult<Vec<Backup>> {
        let req = self.request(
            Method::GET,
            &[
                "organizations",
                org,
                "databases",
                database,
                "branches",
                branch,
                "backups",
            ],
        )?;
        let page: Page<Backup> = self.send(req).await?;
        Ok(page.data)
    }

    async fn get_backup(
        &self,
        org: &str,
        database: &str,
        branch: &str,
        id: &str,
    ) -> ApiResult<Backup> {
        let req = self.request(
            Method::GET,
            &[
                "organizations",
                org,
                "databases",
                database,
                "branches",
                branch,
                "backups",
                id,
            ],
        )?;
        self.send(req).await
    }

    async fn create_backup(
        &self,
        org: &str,
        database: &str,
        branch: &str,
        request: &CreateBackupRequest,
    ) -> ApiResult<Backup> {
        let req = self
            .request(
                Method::POST,
                &[
                    "organizations",
                    org,
                    "databases",
                    database,
                    "branches",
                    branch,
                    "backups",
                ],
            )?
            .json(request);
        self.send(req).await
    }

    async fn delete_backup(
        &self,
        org: &str,
        database: &str,
        branch: &str,
        id: &str,
    ) -> ApiResult<()> {
        let req = self.request(
            Method::DELETE,
            &[
                "organizations",
                org,
                "databases",
                database,
                "branches",
                branch,
                "backups",
                id,
            ],
        )?;
        self.send_empty(req).await
    }

    async fn get_data_import(&self, org: &str, database: &str) -> ApiResult<DataImport> {
        let req = self.request(
            Method::GET,
            &["organizations", org, "databases", database, "data-imports"],
        )?;
        self.send(req).await
    }

    async fn make_primary(&self, org: &str, database: &str) -> ApiResult<DataImport> {
        let req = self.request(
            Method::POST,
            &[
                "organizations",
                org,
                "databases",
                database,
                "data-imports",
                "make-primary",
            ],
        )?;
        self.send(req).await
    }
}

/// Factory producing [`HttpClient`]s.
#[derive(Debug, Default)]
pub struct HttpClientFactory;

impl ClientFactory for HttpClientFactory {
    fn connect(&self, api_url: &str, token: &str) -> Result<Arc<dyn PlatformApi>, AuthError> {
        Ok(Arc::new(HttpClient::new(api_url, token)?))
    }
}
