//! Authenticated API client for the backoffice REST service.
//!
//! # Overview
//! Views talk to the service through `ApiClient`: `get` / `post` / `put` /
//! `delete` / `upload_file` return the response payload or a
//! `NormalizedError`. Every call runs through an explicit `Pipeline` of
//! request and response stages, and the session lives in an injectable
//! `SessionStore` backed by a `CredentialStorage`.
//!
//! # Design
//! - `http` types are plain data; stages and tests operate on values.
//! - `Transport` is the single I/O seam (`UreqTransport` by default).
//! - Any failure, whether status, timeout, or network, is normalized into one
//!   `ErrorKind` taxonomy and always returned to the caller.
//! - A 401 on a request without the `_retry` guard invalidates the session
//!   and emits `SessionEvent::ForcedLogout`; navigation is left to whoever
//!   subscribes.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod multipart;
pub mod pipeline;
pub mod resources;
pub mod session;
pub mod storage;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use client::{ApiClient, RequestOptions};
pub use config::ClientConfig;
pub use error::{ErrorKind, NormalizedError, TransportFailure};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use multipart::MultipartForm;
pub use pipeline::{BearerAuth, ForcedLogout, Pipeline, RequestStage, ResponseStage, UndefinedPathDiagnostic};
pub use resources::{Resource, ResourceClient};
pub use session::{Session, SessionEvent, SessionState, SessionStore, LOGIN_ROUTE};
pub use storage::{CredentialStorage, FileStorage, MemoryStorage, StorageError};
pub use transport::{Transport, UreqTransport};
pub use types::{Credentials, LoginResponse, RefreshResponse, User};
