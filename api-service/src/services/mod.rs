//! Collaborators behind the handlers: persistence, job queue, tokens,
//! billing, OAuth and object storage.

pub mod billing;
mod database;
pub mod error;
pub mod jobs;
mod jwt;
mod memory;
pub mod oauth;
pub mod storage;
mod store;

pub use billing::{BillingProvider, HostedSession, MockBillingProvider, StripeClient};
pub use database::Database;
pub use error::ServiceError;
pub use jobs::{FailingJobQueue, InMemoryJobQueue, Job, JobQueue, RedisJobQueue};
pub use jwt::{Claims, JwtService, TokenResponse};
pub use memory::InMemoryStore;
pub use oauth::{GoogleOAuthClient, GoogleOAuthProvider, GoogleUserInfo, MockGoogleOAuth};
pub use storage::{LocalStorage, ObjectStorage};
pub use store::{Store, UserListQuery};
