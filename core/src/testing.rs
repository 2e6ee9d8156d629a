//! Scripted transport and client builders shared by unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::client::ApiClient;
use crate::config::ClientConfig;
use crate::error::TransportFailure;
use crate::http::{HttpRequest, HttpResponse};
use crate::session::SessionStore;
use crate::storage::MemoryStorage;
use crate::transport::{ProgressFn, Transport};
use crate::types::User;

type Outcome = Result<HttpResponse, TransportFailure>;

/// Replays queued outcomes in order and records every request it receives.
/// Bodies are "sent" in four chunks so progress callbacks fire.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    outcomes: Arc<Mutex<VecDeque<Outcome>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, outcome: Outcome) -> Self {
        self.outcomes.lock().unwrap().push_back(outcome);
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, request: &HttpRequest, progress: Option<ProgressFn<'_>>) -> Outcome {
        self.requests.lock().unwrap().push(request.clone());
        if let (Some(report), Some(body)) = (progress, &request.body) {
            let total = body.len() as u64;
            for step in 1..=4 {
                report(total * step / 4, total);
            }
        }
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportFailure::Network("no scripted outcome".to_string())))
    }
}

pub fn respond(status: u16, body: &str) -> Outcome {
    Ok(HttpResponse {
        status,
        headers: Vec::new(),
        body: body.to_string(),
    })
}

pub fn test_user() -> User {
    serde_json::from_str(r#"{"id":1,"username":"a"}"#).unwrap()
}

pub fn client_with<T: Transport + Clone + 'static>(transport: T) -> (ApiClient, T) {
    let session = Arc::new(SessionStore::init(Arc::new(MemoryStorage::new())));
    let client = ApiClient::with_transport(ClientConfig::new("http://test/api"), session, transport.clone());
    (client, transport)
}

pub fn logged_in_client_with<T: Transport + Clone + 'static>(transport: T) -> (ApiClient, T) {
    let (client, transport) = client_with(transport);
    client.session().establish(test_user(), "token-1".to_string());
    (client, transport)
}
