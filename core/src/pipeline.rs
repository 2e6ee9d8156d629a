//! Ordered request and response stages around every round-trip.
//!
//! # Design
//! A request passes through each `RequestStage` in insertion order before
//! the transport sees it. The transport outcome is normalized once (see
//! `error::normalize`) and then passes through each `ResponseStage` in
//! insertion order. Stages are plain values; the default pipeline is:
//!
//! ```text
//! request:  UndefinedPathDiagnostic → BearerAuth
//! response: ForcedLogout
//! ```

use std::sync::Arc;

use crate::error::{normalize, ErrorKind, NormalizedError, TransportFailure};
use crate::http::{HttpRequest, HttpResponse};
use crate::session::{SessionStore, LOGIN_ROUTE};

/// Rewrites an outgoing request.
pub trait RequestStage: Send + Sync {
    fn apply(&self, request: HttpRequest) -> HttpRequest;
}

/// Inspects or rewrites the normalized result of a request.
pub trait ResponseStage: Send + Sync {
    fn apply(
        &self,
        request: &HttpRequest,
        result: Result<HttpResponse, NormalizedError>,
    ) -> Result<HttpResponse, NormalizedError>;
}

impl<F> RequestStage for F
where
    F: Fn(HttpRequest) -> HttpRequest + Send + Sync,
{
    fn apply(&self, request: HttpRequest) -> HttpRequest {
        self(request)
    }
}

#[derive(Clone, Default)]
pub struct Pipeline {
    request_stages: Vec<Arc<dyn RequestStage>>,
    response_stages: Vec<Arc<dyn ResponseStage>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("request_stages", &self.request_stages.len())
            .field("response_stages", &self.response_stages.len())
            .finish()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stages every `ApiClient` starts with.
    pub fn standard(session: Arc<SessionStore>) -> Self {
        Self::new()
            .with_request_stage(UndefinedPathDiagnostic)
            .with_request_stage(BearerAuth::new(session.clone()))
            .with_response_stage(ForcedLogout::new(session))
    }

    pub fn with_request_stage(mut self, stage: impl RequestStage + 'static) -> Self {
        self.request_stages.push(Arc::new(stage));
        self
    }

    pub fn with_response_stage(mut self, stage: impl ResponseStage + 'static) -> Self {
        self.response_stages.push(Arc::new(stage));
        self
    }

    pub fn prepare(&self, request: HttpRequest) -> HttpRequest {
        self.request_stages
            .iter()
            .fold(request, |req, stage| stage.apply(req))
    }

    pub fn complete(
        &self,
        request: &HttpRequest,
        outcome: Result<HttpResponse, TransportFailure>,
    ) -> Result<HttpResponse, NormalizedError> {
        self.response_stages
            .iter()
            .fold(normalize(outcome), |result, stage| stage.apply(request, result))
    }
}

/// Attaches `Authorization: Bearer <token>` whenever the session holds a token.
#[derive(Debug, Clone)]
pub struct BearerAuth {
    session: Arc<SessionStore>,
}

impl BearerAuth {
    pub fn new(session: Arc<SessionStore>) -> Self {
        Self { session }
    }
}

impl RequestStage for BearerAuth {
    fn apply(&self, mut request: HttpRequest) -> HttpRequest {
        if let Some(token) = self.session.token() {
            request.set_header("authorization", format!("Bearer {token}"));
        }
        request
    }
}

/// Warns, in debug builds only, when a path contains the literal
/// `undefined`. The request is never changed.
#[derive(Debug, Clone, Copy, Default)]
pub struct UndefinedPathDiagnostic;

impl RequestStage for UndefinedPathDiagnostic {
    fn apply(&self, request: HttpRequest) -> HttpRequest {
        if cfg!(debug_assertions) && request.path.contains("undefined") {
            tracing::warn!(
                method = request.method.as_str(),
                path = %request.path,
                "request path contains \"undefined\"; a caller probably built it from a missing id"
            );
        }
        request
    }
}

/// Invalidates the session once per authentication failure.
///
/// Requests flagged `retry` never trigger it. The error is always passed on.
#[derive(Debug, Clone)]
pub struct ForcedLogout {
    session: Arc<SessionStore>,
    redirect_to: String,
}

impl ForcedLogout {
    pub fn new(session: Arc<SessionStore>) -> Self {
        Self {
            session,
            redirect_to: LOGIN_ROUTE.to_string(),
        }
    }

    pub fn redirecting_to(mut self, route: &str) -> Self {
        self.redirect_to = route.to_string();
        self
    }

    /// Whether `error` on `request` calls for a forced logout.
    pub fn required(request: &HttpRequest, error: &NormalizedError) -> bool {
        error.is(ErrorKind::AuthenticationError) && !request.retry
    }
}

impl ResponseStage for ForcedLogout {
    fn apply(
        &self,
        request: &HttpRequest,
        result: Result<HttpResponse, NormalizedError>,
    ) -> Result<HttpResponse, NormalizedError> {
        if let Err(error) = &result {
            if Self::required(request, error) {
                self.session.force_logout(&self.redirect_to);
            }
        }
        result
    }
}
