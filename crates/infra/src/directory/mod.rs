//! Employee directory gateway: HTTP client, record cache, and mapper.

pub mod cache;
pub mod client;
pub mod mapper;
pub mod record;

use async_trait::async_trait;
use thiserror::Error;

use gatepass_core::ServiceNo;

pub use cache::{CacheLookup, DirectoryCache};
pub use client::{HttpDirectoryGateway, RetryPolicy};
pub use mapper::{DirectoryProfile, SupervisorView, map_record, map_supervisor};
pub use record::{DirectoryRecord, DirectorySession, DirectoryUser};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The feature toggle is off; no I/O was attempted.
    #[error("employee directory is disabled")]
    Disabled,

    #[error("employee not found in directory")]
    NotFound,

    #[error("directory rejected the credentials")]
    Rejected,

    #[error("employee directory unavailable: {0}")]
    Unavailable(String),
}

/// Read-only access to the corporate employee directory.
#[async_trait]
pub trait DirectoryGateway: Send + Sync {
    /// False when the process-wide toggle is off.
    fn is_enabled(&self) -> bool;

    /// One employee record.
    ///
    /// Transport failures fall back to any cached copy, then to `NotFound`.
    async fn fetch_by_service_no(&self, service_no: &ServiceNo) -> Result<DirectoryRecord, DirectoryError>;

    /// Verify directory credentials. Any failure is `Rejected`.
    async fn authenticate(&self, username: &str, password: &str) -> Result<DirectorySession, DirectoryError>;

    /// Supervisor chain of an employee, nearest first.
    async fn supervisor_hierarchy(&self, service_no: &ServiceNo) -> Result<Vec<DirectoryRecord>, DirectoryError>;
}
