//! End-to-end tests against the live mock server.
//!
//! # Design
//! Each test starts the mock server on a random port in a background thread,
//! then drives the real blocking client (ureq transport, standard pipeline)
//! against it.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use backoffice_core::storage::{SESSION_KEYS, TOKEN_KEY, USER_KEY};
use backoffice_core::{
    ApiClient, ClientConfig, CredentialStorage, Credentials, ErrorKind, FileStorage,
    MemoryStorage, MultipartForm, RequestOptions, Resource, SessionEvent, SessionStore,
};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize, PartialEq)]
struct Product {
    id: u64,
    nombre: String,
    #[serde(default)]
    precio: Option<f64>,
}

/// Start the mock server on a random port with an `a` / `b` account.
fn spawn_server() -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            let state = mock_server::AppState::with_accounts(&[("a", "b", "admin")]);
            mock_server::run_with_state(listener, state).await
        })
        .unwrap();
    });

    addr
}

fn config(addr: SocketAddr) -> ClientConfig {
    ClientConfig::new(&format!("http://{addr}/api"))
}

fn client_on(addr: SocketAddr, storage: Arc<dyn CredentialStorage>) -> ApiClient {
    ApiClient::new(config(addr), Arc::new(SessionStore::init(storage)))
}

fn count_redirects(client: &ApiClient) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = count.clone();
    client.session().subscribe(move |event| {
        if matches!(event, SessionEvent::ForcedLogout { redirect_to } if redirect_to == "/auth/login") {
            seen.fetch_add(1, Ordering::SeqCst);
        }
    });
    count
}

#[test]
fn session_and_crud_lifecycle() {
    let addr = spawn_server();
    let storage = Arc::new(MemoryStorage::new());
    let client = client_on(addr, storage.clone());

    // Step 1: login.
    assert!(!client.is_authenticated());
    let login = client.login(&Credentials::new("a", "b")).unwrap();
    assert_eq!(login.user.username, "a");
    assert!(client.is_authenticated());
    assert!(storage.contains(TOKEN_KEY));
    assert!(storage.contains(USER_KEY));

    let products = client.resource::<Product>(Resource::Products);

    // Step 2: list — should be empty.
    assert!(products.list(&RequestOptions::default()).unwrap().is_empty());

    // Step 3: create.
    let created = products
        .create(&json!({"nombre": "Filtro de aceite", "precio": 12.5}))
        .unwrap();
    assert_eq!(created.nombre, "Filtro de aceite");

    // Step 4: get.
    assert_eq!(products.get(created.id).unwrap(), created);

    // Step 5: update.
    let updated = products.update(created.id, &json!({"precio": 14.0})).unwrap();
    assert_eq!(updated.precio, Some(14.0));
    assert_eq!(updated.nombre, "Filtro de aceite");

    // Step 6: validation failure.
    let err = products.create(&json!({"precio": 1})).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ValidationError);
    assert_eq!(err.status, Some(422));
    assert_eq!(err.message, "El nombre es obligatorio");

    // Step 7: delete, then get is NotFound.
    products.remove(created.id).unwrap();
    let err = products.get(created.id).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFoundError);

    // Step 8: logout clears everything.
    client.logout();
    assert!(!client.is_authenticated());
    for key in SESSION_KEYS {
        assert!(!storage.contains(key), "{key} should be cleared");
    }
}

#[test]
fn not_found_carries_server_message() {
    let addr = spawn_server();
    let client = client_on(addr, Arc::new(MemoryStorage::new()));
    client.login(&Credentials::new("a", "b")).unwrap();

    let err = client.get("/productos/999", &RequestOptions::default()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFoundError);
    assert_eq!(err.status, Some(404));
    assert_eq!(err.message, "Recurso no encontrado");
}

#[test]
fn unauthorized_clears_storage_and_redirects_once() {
    let addr = spawn_server();
    let storage = Arc::new(MemoryStorage::new());
    storage.set(TOKEN_KEY, "stale-token").unwrap();
    storage.set(USER_KEY, r#"{"id":1,"username":"a"}"#).unwrap();
    storage.set("authenticated", "true").unwrap();

    let client = client_on(addr, storage.clone());
    assert!(client.is_authenticated());
    let redirects = count_redirects(&client);

    let err = client.get("/usuarios", &RequestOptions::default()).unwrap_err();

    assert_eq!(err.kind, ErrorKind::AuthenticationError);
    assert_eq!(err.status, Some(401));
    assert_eq!(redirects.load(Ordering::SeqCst), 1);
    assert!(!client.is_authenticated());
    for key in SESSION_KEYS {
        assert!(!storage.contains(key));
    }
}

#[test]
fn retry_flagged_unauthorized_never_redirects() {
    let addr = spawn_server();
    let client = client_on(addr, Arc::new(MemoryStorage::new()));
    let redirects = count_redirects(&client);

    let err = client
        .get("/usuarios", &RequestOptions::new().retry())
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::AuthenticationError);
    assert_eq!(redirects.load(Ordering::SeqCst), 0);
}

#[test]
fn status_codes_map_to_kinds() {
    let addr = spawn_server();
    let client = client_on(addr, Arc::new(MemoryStorage::new()));

    let cases = [
        (400, ErrorKind::ValidationError),
        (403, ErrorKind::AuthorizationError),
        (404, ErrorKind::NotFoundError),
        (409, ErrorKind::UnknownError),
        (422, ErrorKind::ValidationError),
        (500, ErrorKind::ServerError),
        (502, ErrorKind::ServerError),
        (503, ErrorKind::ServerError),
        (504, ErrorKind::ServerError),
        (501, ErrorKind::UnknownError),
    ];
    for (status, kind) in cases {
        let err = client
            .get(&format!("/status/{status}"), &RequestOptions::default())
            .unwrap_err();
        assert_eq!(err.kind, kind, "status {status}");
        assert_eq!(err.status, Some(status));
        assert_eq!(err.message, format!("status {status}"));
    }
}

#[test]
fn slow_response_times_out() {
    let addr = spawn_server();
    let session = Arc::new(SessionStore::init(Arc::new(MemoryStorage::new())));
    let client = ApiClient::new(config(addr).with_timeout_ms(200), session);

    let err = client
        .get("/slow", &RequestOptions::new().query("ms", 3000))
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::TimeoutError);
    assert!(err.status.is_none());
}

#[test]
fn unreachable_server_is_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client_on(addr, Arc::new(MemoryStorage::new()));
    let err = client.get("/usuarios", &RequestOptions::default()).unwrap_err();

    assert_eq!(err.kind, ErrorKind::NetworkError);
    assert!(err.status.is_none());
}

#[test]
fn upload_reports_progress_to_100() {
    let addr = spawn_server();
    let client = client_on(addr, Arc::new(MemoryStorage::new()));
    client.login(&Credentials::new("a", "b")).unwrap();

    let form = MultipartForm::new()
        .text("descripcion", "catalogo")
        .file("archivo", "catalogo.bin", "application/octet-stream", vec![42; 256 * 1024]);
    let expected_len = form.encode().len();

    let mut seen = Vec::new();
    let mut on_progress = |pct: u8| seen.push(pct);
    let payload = client
        .upload_file("/uploads", &form, Some(&mut on_progress))
        .unwrap();

    assert_eq!(payload["bytes"], expected_len);
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
    assert_eq!(seen.last(), Some(&100));
}

#[test]
fn restart_restores_session_without_network() {
    let addr = spawn_server();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");

    let first = client_on(addr, Arc::new(FileStorage::new(&path)));
    first.login(&Credentials::new("a", "b")).unwrap();
    let token = first.session().token();
    drop(first);

    // Point the restarted client at a dead port: init must not need it.
    let dead = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let restarted = client_on(dead, Arc::new(FileStorage::new(&path)));
    assert!(restarted.is_authenticated());
    assert_eq!(restarted.session().token(), token);
    assert_eq!(restarted.session().user().unwrap().username, "a");
}

#[test]
fn refresh_rotates_token_on_server() {
    let addr = spawn_server();
    let client = client_on(addr, Arc::new(MemoryStorage::new()));
    client.login(&Credentials::new("a", "b")).unwrap();
    let before = client.session().token().unwrap();

    let after = client.refresh().unwrap();
    assert_ne!(before, after);
    assert_eq!(client.me().unwrap().username, "a");
}

fn cookie_seen_by_server(client: &ApiClient) -> serde_json::Value {
    client.get("/cookies", &RequestOptions::default()).unwrap()["cookie"].clone()
}

#[test]
fn session_cookie_replayed_until_server_expires_it() {
    let addr = spawn_server();
    let client = client_on(addr, Arc::new(MemoryStorage::new()));
    assert!(cookie_seen_by_server(&client).is_null());

    let login = client.login(&Credentials::new("a", "b")).unwrap();
    assert_eq!(cookie_seen_by_server(&client), format!("session={}", login.token));

    client.logout();
    assert!(cookie_seen_by_server(&client).is_null());
}

#[test]
fn cookies_dropped_without_credentials() {
    let addr = spawn_server();
    let session = Arc::new(SessionStore::init(Arc::new(MemoryStorage::new())));
    let client = ApiClient::new(config(addr).with_credentials(false), session);

    client.login(&Credentials::new("a", "b")).unwrap();
    assert!(client.is_authenticated());
    assert!(cookie_seen_by_server(&client).is_null());
}
