//! In-memory stand-in for the InstantDB admin API.
//!
//! Implements the four endpoints the client talks to, with just enough
//! semantics for end-to-end tests: records grouped by namespace, symmetric
//! links between records, lookup references, all-or-nothing transactions and
//! refresh tokens. Every request must carry `authorization: Bearer <secret>`
//! and `app-id` matching the server's credentials.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

pub const APP_ID: &str = "mock-app";
pub const SECRET: &str = "mock-secret";

/// Response header echoing the identity overrides a request carried, e.g.
/// `guest` or `email:a@b.c`. Several overrides are joined with `,`; none
/// reads `admin`.
pub const IDENTITY_HEADER: &str = "x-mock-identity";

pub type Record = Map<String, Value>;

/// One end of a link, as `(namespace, id)`.
type End = (String, String);

#[derive(Debug, Default, Clone)]
pub struct Db {
    /// namespace -> id -> attributes (including `id`)
    pub records: BTreeMap<String, BTreeMap<String, Record>>,
    /// Links stored in the direction they were created.
    pub links: BTreeSet<(End, End)>,
    /// refresh token -> user
    pub tokens: HashMap<String, User>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub app_id: String,
    pub email: String,
    pub created_at: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct AppState {
    pub app_id: String,
    pub secret: String,
    pub db: Arc<RwLock<Db>>,
}

/// Error response in the service's `{"message": ...}` shape.
#[derive(Debug)]
pub struct ApiFailure {
    status: StatusCode,
    message: String,
}

impl ApiFailure {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "message": self.message }))).into_response()
    }
}

pub fn app() -> Router {
    app_with_credentials(APP_ID, SECRET)
}

pub fn app_with_credentials(app_id: &str, secret: &str) -> Router {
    let state = AppState {
        app_id: app_id.to_string(),
        secret: secret.to_string(),
        db: Arc::new(RwLock::new(Db::default())),
    };
    Router::new()
        .route("/admin/query", post(query))
        .route("/admin/transact", post(transact))
        .route("/admin/refresh_tokens", post(create_token))
        .route("/runtime/auth/verify_refresh_token", post(verify_token))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiFailure> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let expected = format!("Bearer {}", state.secret);
    if header("authorization") != Some(expected.as_str()) {
        return Err(ApiFailure::new(StatusCode::UNAUTHORIZED, "Invalid admin token"));
    }
    if header("app-id") != Some(state.app_id.as_str()) {
        return Err(ApiFailure::bad_request("Missing or unknown app-id"));
    }
    Ok(())
}

pub fn identity(headers: &HeaderMap) -> String {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let mut seen = Vec::new();
    if let Some(email) = header("as-email") {
        seen.push(format!("email:{email}"));
    }
    if let Some(token) = header("as-token") {
        seen.push(format!("token:{token}"));
    }
    if header("as-guest") == Some("true") {
        seen.push("guest".to_string());
    }
    if seen.is_empty() {
        "admin".to_string()
    } else {
        seen.join(",")
    }
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct QueryRequest {
    query: Map<String, Value>,
}

async fn query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<QueryRequest>,
) -> Result<([(&'static str, String); 1], Json<Value>), ApiFailure> {
    authorize(&state, &headers)?;
    let db = state.db.read().await;

    let mut result = Map::new();
    for (namespace, selection) in &input.query {
        let selection = selection
            .as_object()
            .ok_or_else(|| ApiFailure::bad_request(format!("selection for {namespace} must be an object")))?;
        let records = db
            .records
            .get(namespace)
            .map(|records| records.values().collect::<Vec<_>>())
            .unwrap_or_default();
        let expanded = records
            .into_iter()
            .map(|record| expand(&db, namespace, record, selection))
            .collect::<Result<Vec<_>, _>>()?;
        result.insert(namespace.clone(), Value::Array(expanded));
    }
    let identity = identity(&headers);
    debug!(namespaces = result.len(), %identity, "query");
    Ok(([(IDENTITY_HEADER, identity)], Json(Value::Object(result))))
}

fn expand(db: &Db, namespace: &str, record: &Record, selection: &Map<String, Value>) -> Result<Value, ApiFailure> {
    let mut out = record.clone();
    let id = record.get("id").and_then(Value::as_str).unwrap_or_default();
    for (related, sub) in selection {
        let sub = sub
            .as_object()
            .ok_or_else(|| ApiFailure::bad_request(format!("selection for {related} must be an object")))?;
        let linked = db
            .linked(namespace, id, related)
            .into_iter()
            .filter_map(|other| db.records.get(related).and_then(|r| r.get(&other)))
            .map(|other| expand(db, related, other, sub))
            .collect::<Result<Vec<_>, _>>()?;
        out.insert(related.clone(), Value::Array(linked));
    }
    Ok(Value::Object(out))
}

impl Db {
    /// Ids in `related` linked to `(namespace, id)` in either direction.
    fn linked(&self, namespace: &str, id: &str, related: &str) -> Vec<String> {
        self.links
            .iter()
            .filter_map(|((an, ai), (bn, bi))| {
                if an == namespace && ai == id && bn == related {
                    Some(bi.clone())
                } else if bn == namespace && bi == id && an == related {
                    Some(ai.clone())
                } else {
                    None
                }
            })
            .collect()
    }

    /// Resolve a record id or `lookup__attr__"value"` reference.
    ///
    /// Lookups that match nothing resolve to a fresh id and report the
    /// attribute to set on creation.
    fn resolve(&self, namespace: &str, id: &str) -> Result<(String, Option<(String, Value)>), ApiFailure> {
        let Some((attribute, value)) = parse_lookup(id) else {
            return Ok((id.to_string(), None));
        };
        let found = self.records.get(namespace).and_then(|records| {
            records
                .iter()
                .find(|(_, record)| record.get(&attribute).is_some_and(|v| lookup_matches(v, &value)))
                .map(|(id, _)| id.clone())
        });
        match found {
            Some(id) => Ok((id, None)),
            None => Ok((Uuid::new_v4().to_string(), Some((attribute, Value::String(value))))),
        }
    }

    fn apply(&mut self, step: &[Value]) -> Result<(), ApiFailure> {
        let text = |i: usize| {
            step.get(i)
                .and_then(Value::as_str)
                .ok_or_else(|| ApiFailure::bad_request(format!("step element {i} must be a string")))
        };
        let action = text(0)?;
        let namespace = text(1)?.to_string();
        let (id, lookup_attr) = self.resolve(&namespace, text(2)?)?;

        match action {
            "update" => {
                let payload = step
                    .get(3)
                    .and_then(Value::as_object)
                    .ok_or_else(|| ApiFailure::bad_request("update payload must be an object"))?;
                let record = self
                    .records
                    .entry(namespace)
                    .or_default()
                    .entry(id.clone())
                    .or_default();
                if let Some((attribute, value)) = lookup_attr {
                    record.insert(attribute, value);
                }
                for (key, value) in payload {
                    record.insert(key.clone(), value.clone());
                }
                record.insert("id".to_string(), Value::String(id));
            }
            "delete" => {
                if let Some(records) = self.records.get_mut(&namespace) {
                    records.remove(&id);
                }
                self.links
                    .retain(|(a, b)| !(a.0 == namespace && a.1 == id) && !(b.0 == namespace && b.1 == id));
            }
            "link" | "unlink" => {
                let targets = step
                    .get(3)
                    .and_then(Value::as_object)
                    .ok_or_else(|| ApiFailure::bad_request("link target must be an object"))?;
                for (other_ns, other_id) in targets {
                    let other_id = other_id
                        .as_str()
                        .ok_or_else(|| ApiFailure::bad_request("link target id must be a string"))?;
                    let (other_id, _) = self.resolve(other_ns, other_id)?;
                    let from = (namespace.clone(), id.clone());
                    let to = (other_ns.clone(), other_id);
                    if action == "link" {
                        self.links.insert((from, to));
                    } else {
                        self.links.remove(&(from.clone(), to.clone()));
                        self.links.remove(&(to, from));
                    }
                }
            }
            other => return Err(ApiFailure::bad_request(format!("unknown action {other}"))),
        }
        Ok(())
    }
}

fn parse_lookup(id: &str) -> Option<(String, String)> {
    let rest = id.strip_prefix("lookup__")?;
    let (attribute, quoted) = rest.split_once("__")?;
    let value = quoted.strip_prefix('"')?.strip_suffix('"')?;
    Some((attribute.to_string(), value.to_string()))
}

fn lookup_matches(stored: &Value, wanted: &str) -> bool {
    match stored {
        Value::String(s) => s == wanted,
        other => other.to_string() == wanted,
    }
}

// ---------------------------------------------------------------------------
// Transact
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct TransactRequest {
    steps: Vec<Vec<Value>>,
}

async fn transact(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<TransactRequest>,
) -> Result<([(&'static str, String); 1], Json<Value>), ApiFailure> {
    authorize(&state, &headers)?;
    let mut db = state.db.write().await;

    // Apply to a copy so a failing step leaves the store untouched.
    let mut next = db.clone();
    for step in &input.steps {
        next.apply(step)?;
    }
    *db = next;

    let identity = identity(&headers);
    debug!(steps = input.steps.len(), %identity, "transact");
    Ok((
        [(IDENTITY_HEADER, identity)],
        Json(json!({ "status": "ok", "tx-id": Uuid::new_v4() })),
    ))
}

// ---------------------------------------------------------------------------
// Refresh tokens
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CreateTokenRequest {
    email: String,
}

#[derive(Deserialize)]
struct VerifyTokenRequest {
    #[serde(rename = "app-id")]
    app_id: String,
    #[serde(rename = "refresh-token")]
    refresh_token: String,
}

async fn create_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreateTokenRequest>,
) -> Result<Json<Value>, ApiFailure> {
    authorize(&state, &headers)?;
    if input.email.is_empty() {
        return Err(ApiFailure::bad_request("email is required"));
    }
    let mut db = state.db.write().await;

    let existing = db.tokens.values().find(|u| u.email == input.email).cloned();
    let user = match existing {
        Some(user) => User {
            refresh_token: Uuid::new_v4().to_string(),
            ..user
        },
        None => User {
            id: Uuid::new_v4().to_string(),
            app_id: state.app_id.clone(),
            email: input.email,
            created_at: "2024-01-01T00:00:00.000Z".to_string(),
            refresh_token: Uuid::new_v4().to_string(),
        },
    };
    db.tokens.insert(user.refresh_token.clone(), user.clone());
    Ok(Json(json!({ "user": user })))
}

async fn verify_token(
    State(state): State<AppState>,
    Json(input): Json<VerifyTokenRequest>,
) -> Result<Json<Value>, ApiFailure> {
    if input.app_id != state.app_id {
        return Err(ApiFailure::bad_request("Record not found: app"));
    }
    let db = state.db.read().await;
    let user = db
        .tokens
        .get(&input.refresh_token)
        .cloned()
        .ok_or_else(|| ApiFailure::bad_request("Record not found: token"))?;
    Ok(Json(json!({ "user": user })))
}
