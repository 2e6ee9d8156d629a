//! In-memory rendition of the backoffice REST API.
//!
//! Serves auth endpoints, the resource collections, an upload sink, and the
//! diagnostic routes (`/slow`, `/status/{code}`, `/cookies`) under `/api`.
//! Everything but login and the diagnostic routes requires
//! `Authorization: Bearer`.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Collection segments the server knows about.
pub const RESOURCES: [&str; 10] = [
    "usuarios",
    "productos",
    "vehiculos",
    "ventas",
    "inventario",
    "categorias",
    "marcas",
    "sitios",
    "roles",
    "menus",
];

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub role: String,
}

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct SlowQuery {
    #[serde(default)]
    pub ms: u64,
}

struct Account {
    user: User,
    password: String,
}

struct Store {
    accounts: Vec<Account>,
    /// Bearer token → user id.
    tokens: HashMap<String, u64>,
    collections: HashMap<String, BTreeMap<u64, Value>>,
    next_id: u64,
}

/// Shared server state. Clones share the same store.
#[derive(Clone)]
pub struct AppState {
    store: Arc<RwLock<Store>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    /// State seeded with an `admin` / `admin123` account.
    pub fn new() -> Self {
        Self::with_accounts(&[("admin", "admin123", "admin")])
    }

    /// State seeded with `(username, password, role)` accounts, ids from 1.
    pub fn with_accounts(accounts: &[(&str, &str, &str)]) -> Self {
        let accounts = accounts
            .iter()
            .zip(1..)
            .map(|(&(username, password, role), id)| Account {
                user: User {
                    id,
                    username: username.to_string(),
                    role: role.to_string(),
                },
                password: password.to_string(),
            })
            .collect();
        let store = Store {
            accounts,
            tokens: HashMap::new(),
            collections: RESOURCES
                .iter()
                .map(|r| (r.to_string(), BTreeMap::new()))
                .collect(),
            next_id: 1,
        };
        Self {
            store: Arc::new(RwLock::new(store)),
        }
    }

    /// Number of live bearer tokens.
    pub async fn active_tokens(&self) -> usize {
        self.store.read().await.tokens.len()
    }
}

/// Error body shape: `{"message": ...}` with the given status.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: &str) -> Self {
        Self {
            status,
            message: message.to_string(),
        }
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Token inválido o expirado")
    }

    fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Recurso no encontrado")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "message": self.message }))).into_response()
    }
}

pub fn app() -> Router {
    app_with_state(AppState::new())
}

pub fn app_with_state(state: AppState) -> Router {
    let api = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/refresh", post(refresh))
        .route("/auth/me", get(me))
        .route("/uploads", post(upload))
        .route("/slow", get(slow))
        .route("/status/{code}", get(status))
        .route("/cookies", get(cookies))
        .route("/{resource}", get(list_items).post(create_item))
        .route(
            "/{resource}/{id}",
            get(get_item).put(update_item).delete(delete_item),
        );
    Router::new().nest("/api", api).with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_state(listener, AppState::new()).await
}

pub async fn run_with_state(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

async fn authorize(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let token = bearer(headers).ok_or_else(ApiError::unauthorized)?;
    let store = state.store.read().await;
    let user_id = store.tokens.get(token).ok_or_else(ApiError::unauthorized)?;
    store
        .accounts
        .iter()
        .find(|a| a.user.id == *user_id)
        .map(|a| a.user.clone())
        .ok_or_else(ApiError::unauthorized)
}

// --- auth ---

async fn login(
    State(state): State<AppState>,
    Json(form): Json<LoginForm>,
) -> Result<Response, ApiError> {
    if form.username.trim().is_empty() || form.password.is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Usuario y contraseña son obligatorios",
        ));
    }
    let mut store = state.store.write().await;
    let user = store
        .accounts
        .iter()
        .find(|a| a.user.username == form.username && a.password == form.password)
        .map(|a| a.user.clone())
        .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "Credenciales inválidas"))?;

    let token = Uuid::new_v4().to_string();
    store.tokens.insert(token.clone(), user.id);
    tracing::info!(username = %user.username, "login");

    let cookie = format!("session={token}; Path=/; HttpOnly");
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "token": token, "user": user })),
    )
        .into_response())
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    authorize(&state, &headers).await?;
    if let Some(token) = bearer(&headers) {
        state.store.write().await.tokens.remove(token);
    }
    Ok((
        [(header::SET_COOKIE, "session=; Path=/; Max-Age=0")],
        Json(json!({ "message": "Sesión cerrada" })),
    )
        .into_response())
}

async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    let user = authorize(&state, &headers).await?;
    let token = Uuid::new_v4().to_string();
    let mut store = state.store.write().await;
    if let Some(old) = bearer(&headers) {
        store.tokens.remove(old);
    }
    store.tokens.insert(token.clone(), user.id);
    Ok(Json(json!({ "token": token })))
}

async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<User>, ApiError> {
    authorize(&state, &headers).await.map(Json)
}

// --- uploads and diagnostics ---

async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    authorize(&state, &headers).await?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !content_type.starts_with("multipart/form-data") {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Se esperaba multipart/form-data",
        ));
    }
    Ok((
        StatusCode::CREATED,
        Json(json!({ "bytes": body.len(), "content_type": content_type })),
    ))
}

async fn slow(Query(query): Query<SlowQuery>) -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(query.ms)).await;
    Json(json!({ "waited_ms": query.ms }))
}

async fn cookies(headers: HeaderMap) -> Json<Value> {
    let cookie = headers.get(header::COOKIE).and_then(|v| v.to_str().ok());
    Json(json!({ "cookie": cookie }))
}

async fn status(Path(code): Path<u16>) -> Response {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "error": format!("status {code}") }))).into_response()
}

// --- resources ---

async fn list_items(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<Value>>, ApiError> {
    authorize(&state, &headers).await?;
    let store = state.store.read().await;
    let items = store.collections.get(&resource).ok_or_else(ApiError::not_found)?;
    Ok(Json(items.values().cloned().collect()))
}

async fn create_item(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    headers: HeaderMap,
    Json(input): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    authorize(&state, &headers).await?;
    let mut fields = validate(&resource, input)?;

    let mut store = state.store.write().await;
    let id = store.next_id;
    let items = store
        .collections
        .get_mut(&resource)
        .ok_or_else(ApiError::not_found)?;
    fields.insert("id".to_string(), json!(id));
    let item = Value::Object(fields);
    items.insert(id, item.clone());
    store.next_id += 1;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn get_item(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, u64)>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    authorize(&state, &headers).await?;
    let store = state.store.read().await;
    store
        .collections
        .get(&resource)
        .and_then(|items| items.get(&id))
        .cloned()
        .map(Json)
        .ok_or_else(ApiError::not_found)
}

async fn update_item(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, u64)>,
    headers: HeaderMap,
    Json(input): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    authorize(&state, &headers).await?;
    let Value::Object(fields) = input else {
        return Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "El cuerpo debe ser un objeto JSON",
        ));
    };
    let mut store = state.store.write().await;
    let item = store
        .collections
        .get_mut(&resource)
        .and_then(|items| items.get_mut(&id))
        .ok_or_else(ApiError::not_found)?;
    if let Value::Object(existing) = item {
        for (key, value) in fields.into_iter().filter(|(k, _)| k != "id") {
            existing.insert(key, value);
        }
    }
    Ok(Json(item.clone()))
}

async fn delete_item(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, u64)>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    authorize(&state, &headers).await?;
    let mut store = state.store.write().await;
    store
        .collections
        .get_mut(&resource)
        .and_then(|items| items.remove(&id))
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(ApiError::not_found)
}

/// A create body must be a JSON object; products also need a `nombre`.
fn validate(resource: &str, input: Value) -> Result<Map<String, Value>, ApiError> {
    let Value::Object(fields) = input else {
        return Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "El cuerpo debe ser un objeto JSON",
        ));
    };
    if resource == "productos"
        && !fields
            .get("nombre")
            .and_then(Value::as_str)
            .is_some_and(|n| !n.trim().is_empty())
    {
        return Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "El nombre es obligatorio",
        ));
    }
    Ok(fields)
}
