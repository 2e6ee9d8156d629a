//! Executes prepared requests over the network.
//!
//! # Design
//! `Transport` is the only seam that performs I/O. It receives a request that
//! has already been through the request stages and reports either the
//! server's response (whatever its status) or a `TransportFailure`; status
//! interpretation is left to the pipeline. `UreqTransport` is the blocking
//! implementation used by `ApiClient`; tests substitute scripted transports.
//!
//! Cookies live in the agent's own jar, which honours `Path`, `Domain`,
//! `Expires` and `Max-Age`. With `with_credentials` off the jar is emptied
//! after every round-trip.

use std::io::{self, Read};

use ureq::http::{self, Response};
use ureq::{Agent, Body, SendBody};

use crate::config::ClientConfig;
use crate::error::TransportFailure;
use crate::http::{HttpRequest, HttpResponse};

/// Byte-level upload progress: `(sent, total)`.
pub type ProgressFn<'a> = &'a mut dyn FnMut(u64, u64);

pub trait Transport: Send + Sync {
    /// Perform one round-trip. `progress`, when given, is told how many body
    /// bytes have been handed to the network so far.
    fn execute(
        &self,
        request: &HttpRequest,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<HttpResponse, TransportFailure>;
}

/// Blocking transport on a `ureq` agent with a global per-request deadline.
pub struct UreqTransport {
    agent: Agent,
    with_credentials: bool,
}

impl std::fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UreqTransport")
            .field("with_credentials", &self.with_credentials)
            .finish_non_exhaustive()
    }
}

impl UreqTransport {
    pub fn new(config: &ClientConfig) -> Self {
        // Error statuses come back as responses so the pipeline can read
        // their bodies.
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(config.timeout()))
            .build()
            .new_agent();
        Self {
            agent,
            with_credentials: config.with_credentials,
        }
    }

    fn build(&self, request: &HttpRequest) -> http::request::Builder {
        let mut builder = http::Request::builder()
            .method(request.method.as_str())
            .uri(request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }

    fn run<B: ureq::AsSendBody>(
        &self,
        request: http::Request<B>,
    ) -> Result<Response<Body>, ureq::Error> {
        let result = self.agent.run(request);
        if !self.with_credentials {
            self.agent.cookie_jar_lock().clear();
        }
        result
    }
}

impl Transport for UreqTransport {
    fn execute(
        &self,
        request: &HttpRequest,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<HttpResponse, TransportFailure> {
        let builder = self.build(request);
        let result = match (&request.body, progress) {
            (None, _) => {
                let req = builder.body(()).map_err(construction)?;
                self.run(req)
            }
            (Some(bytes), None) => {
                let req = builder.body(bytes.as_slice()).map_err(construction)?;
                self.run(req)
            }
            (Some(bytes), Some(report)) => {
                let mut reader = ProgressReader {
                    inner: bytes.as_slice(),
                    sent: 0,
                    total: bytes.len() as u64,
                    report,
                };
                let req = builder
                    .header("content-length", bytes.len())
                    .body(SendBody::from_reader(&mut reader))
                    .map_err(construction)?;
                self.run(req)
            }
        };
        read_response(result.map_err(classify)?)
    }
}

fn read_response(mut response: Response<Body>) -> Result<HttpResponse, TransportFailure> {
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    let body = response.body_mut().read_to_string().map_err(classify)?;
    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

fn construction(error: http::Error) -> TransportFailure {
    TransportFailure::Construction(error.to_string())
}

/// Sort a ureq failure into timeout, network, or construction.
fn classify(error: ureq::Error) -> TransportFailure {
    match error {
        ureq::Error::Timeout(_) => TransportFailure::Timeout,
        ureq::Error::Io(e) if e.kind() == io::ErrorKind::TimedOut => TransportFailure::Timeout,
        ureq::Error::Http(e) => TransportFailure::Construction(e.to_string()),
        ureq::Error::BadUri(uri) => TransportFailure::Construction(format!("bad uri: {uri}")),
        other => TransportFailure::Network(other.to_string()),
    }
}

struct ProgressReader<'a, R> {
    inner: R,
    sent: u64,
    total: u64,
    report: ProgressFn<'a>,
}

impl<R: Read> Read for ProgressReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.sent += n as u64;
            (self.report)(self.sent, self.total);
        }
        Ok(n)
    }
}
