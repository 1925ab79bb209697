//! Infrastructure layer: configuration, external clients, storage, and the
//! orchestration that ties them to the pure identity vocabulary.

pub mod config;
pub mod directory;
pub mod graph;
pub mod reconciler;
pub mod store;
pub mod users;

pub use config::{AppConfig, AzureConfig, ConfigError, DirectoryConfig, Secret};
pub use directory::{DirectoryError, DirectoryGateway, HttpDirectoryGateway};
pub use graph::{GraphClient, GraphError, IdentityProvider, azure_login_url};
pub use reconciler::{AuthError, AuthOutcome, AuthReconciler, LoginRequest, Registration};
pub use store::{InMemoryUserStore, PostgresUserStore, StoreError, UserStore};
pub use users::{PrincipalSource, ResolvedPrincipal, UserQueries, UserQueryError};
