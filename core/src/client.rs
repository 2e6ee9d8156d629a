//! The generic call surface used by views.
//!
//! # Design
//! `ApiClient` owns a `ClientConfig`, a `Pipeline`, and a `Transport`, and
//! shares a `SessionStore` with whoever else needs it. Each call builds a
//! plain `HttpRequest`, runs the request stages, hands the result to the
//! transport, and runs the response stages on the outcome. Callers get the
//! decoded payload or a `NormalizedError`; nothing is swallowed.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::{ErrorKind, NormalizedError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::multipart::MultipartForm;
use crate::pipeline::Pipeline;
use crate::session::SessionStore;
use crate::transport::{Transport, UreqTransport};

/// Per-call adjustments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Query parameters, percent-encoded onto the URL in order.
    pub query: Vec<(String, String)>,
    /// Headers that override the configured defaults.
    pub headers: Vec<(String, String)>,
    /// Mark the request with the `_retry` guard.
    pub retry: bool,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, name: &str, value: impl ToString) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn retry(mut self) -> Self {
        self.retry = true;
        self
    }
}

pub struct ApiClient {
    config: ClientConfig,
    session: Arc<SessionStore>,
    pipeline: Pipeline,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .field("session", &self.session)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// A client on the blocking `ureq` transport with the standard stages.
    pub fn new(config: ClientConfig, session: Arc<SessionStore>) -> Self {
        let transport = UreqTransport::new(&config);
        Self::with_transport(config, session, transport)
    }

    pub fn with_transport(
        config: ClientConfig,
        session: Arc<SessionStore>,
        transport: impl Transport + 'static,
    ) -> Self {
        Self {
            pipeline: Pipeline::standard(session.clone()),
            config,
            session,
            transport: Arc::new(transport),
        }
    }

    /// Replace the stage pipeline, e.g. to append application stages to
    /// `Pipeline::standard`.
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Build the request for `path` before any stage has run.
    pub fn build_request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Vec<u8>>,
        options: &RequestOptions,
    ) -> HttpRequest {
        let mut url = self.config.url_for(path);
        if !options.query.is_empty() {
            let query = options
                .query
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&query);
        }

        let mut request = HttpRequest::new(method, url, path);
        for (name, value) in self.config.default_headers.iter().chain(&options.headers) {
            request.set_header(name, value.as_str());
        }
        request.body = body;
        request.retry = options.retry;
        request
    }

    /// Issue `method path` with an optional JSON body and return the decoded
    /// payload.
    pub fn request<B>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&B>,
        options: &RequestOptions,
    ) -> Result<Value, NormalizedError>
    where
        B: Serialize + ?Sized,
    {
        let body = body.map(encode_json).transpose()?;
        let request = self.build_request(method, path, body, options);
        let response = self.send(request, None)?;
        Ok(decode_payload(&response.body))
    }

    pub fn get(&self, path: &str, options: &RequestOptions) -> Result<Value, NormalizedError> {
        self.request::<Value>(HttpMethod::Get, path, None, options)
    }

    pub fn post<B>(&self, path: &str, body: &B, options: &RequestOptions) -> Result<Value, NormalizedError>
    where
        B: Serialize + ?Sized,
    {
        self.request(HttpMethod::Post, path, Some(body), options)
    }

    pub fn put<B>(&self, path: &str, body: &B, options: &RequestOptions) -> Result<Value, NormalizedError>
    where
        B: Serialize + ?Sized,
    {
        self.request(HttpMethod::Put, path, Some(body), options)
    }

    pub fn delete(&self, path: &str, options: &RequestOptions) -> Result<Value, NormalizedError> {
        self.request::<Value>(HttpMethod::Delete, path, None, options)
    }

    pub fn get_as<T>(&self, path: &str, options: &RequestOptions) -> Result<T, NormalizedError>
    where
        T: DeserializeOwned,
    {
        decode_typed(self.get(path, options)?)
    }

    pub fn post_as<T, B>(&self, path: &str, body: &B, options: &RequestOptions) -> Result<T, NormalizedError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        decode_typed(self.post(path, body, options)?)
    }

    pub fn put_as<T, B>(&self, path: &str, body: &B, options: &RequestOptions) -> Result<T, NormalizedError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        decode_typed(self.put(path, body, options)?)
    }

    /// POST `form` as `multipart/form-data`.
    ///
    /// `on_progress` receives whole percentages of the body sent so far, in
    /// strictly increasing order, finishing with 100 when the upload succeeds.
    pub fn upload_file(
        &self,
        path: &str,
        form: &MultipartForm,
        on_progress: Option<&mut dyn FnMut(u8)>,
    ) -> Result<Value, NormalizedError> {
        let options = RequestOptions::new().header("content-type", &form.content_type());
        let request = self.build_request(HttpMethod::Post, path, Some(form.encode()), &options);

        let response = match on_progress {
            None => self.send(request, None)?,
            Some(report) => {
                // 100 waits for the server's verdict, not the last body byte.
                let mut last: Option<u8> = None;
                let mut track = |sent: u64, total: u64| {
                    let pct = percent(sent, total).min(99);
                    if last.map_or(true, |prev| pct > prev) {
                        last = Some(pct);
                        report(pct);
                    }
                };
                let response = self.send(request, Some(&mut track))?;
                report(100);
                response
            }
        };
        Ok(decode_payload(&response.body))
    }

    fn send(
        &self,
        request: HttpRequest,
        progress: Option<&mut dyn FnMut(u64, u64)>,
    ) -> Result<HttpResponse, NormalizedError> {
        let request = self.pipeline.prepare(request);
        tracing::debug!(method = request.method.as_str(), url = %request.url, "sending request");

        let outcome = self.transport.execute(&request, progress);
        let result = self.pipeline.complete(&request, outcome);
        if let Err(error) = &result {
            tracing::debug!(
                method = request.method.as_str(),
                path = %request.path,
                kind = %error.kind,
                status = ?error.status,
                message = %error.message,
                "request failed"
            );
        }
        result
    }
}

fn encode_json<B: Serialize + ?Sized>(body: &B) -> Result<Vec<u8>, NormalizedError> {
    serde_json::to_vec(body).map_err(|e| {
        NormalizedError::new(ErrorKind::UnknownError, format!("could not encode request body: {e}"))
    })
}

/// An empty body is `null`; a body that is not JSON is returned as a string.
fn decode_payload(body: &str) -> Value {
    if body.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

fn decode_typed<T: DeserializeOwned>(payload: Value) -> Result<T, NormalizedError> {
    T::deserialize(&payload).map_err(|e| NormalizedError {
        message: format!("unexpected response payload: {e}"),
        kind: ErrorKind::UnknownError,
        status: None,
        payload: Some(payload.clone()),
    })
}

fn percent(sent: u64, total: u64) -> u8 {
    if total == 0 || sent >= total {
        return 100;
    }
    // sent < total, so the quotient is below 100
    u8::try_from(sent * 100 / total).unwrap_or(99)
}
