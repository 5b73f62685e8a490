//! Infrastructure layer: HTTP client, API boundary traits and DI container
//!
//! This layer owns all I/O with the platform.

pub mod di;
pub mod error;
pub mod http;
pub mod traits;

pub use di::ServiceContainer;
pub use error::{ApiError, ApiResult, AuthError};
pub use http::{HttpClient, HttpClientFactory};
pub use traits::{new_client, ClientFactory, PlatformApi};
