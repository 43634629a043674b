//! # groupsync-directory
//!
//! Directory access and the concurrent update engine.
//!
//! - [`api`] — the async [`DirectoryApi`] trait and paginated reads
//! - [`envelope`] — batch request/response types and their JSON wire shape
//! - [`updater`] — [`DirectoryUpdater`]: work units, worker pool, retries
//! - [`local`] — [`FileDirectory`], a JSON-file directory
//! - [`http`] — [`HttpDirectory`], a `$batch` HTTP client

pub mod api;
pub mod envelope;
pub mod error;
pub mod http;
pub mod local;
pub mod queue;
pub mod report;
pub mod throttle;
pub mod unit;
pub mod updater;

pub use api::{fetch_all_members, DirectoryApi, MembersPage};
pub use envelope::{BatchRequest, BatchResponse, BatchStep, StepOperation, StepResponse};
pub use error::DirectoryError;
pub use http::HttpDirectory;
pub use local::{FileDirectory, GroupRecord};
pub use report::{UpdateReport, UpdateStatus};
pub use updater::{DirectoryUpdater, UpdateOptions};
