//! Request builder, response parser and executor for the admin API.
//!
//! # Design
//! Each operation is split into a `build_*` method that produces an
//! `HttpRequest` and a `parse_*` method that consumes an `HttpResponse`, so
//! the wire contract can be exercised without a network. The executing
//! methods (`query`, `transact`, `create_token`, `verify_token`) glue the two
//! together through the client's `Transport`, passing the caller's `Context`
//! through untouched.
//!
//! The only mutable state is the identity override. It applies to every
//! request issued after it is set; callers needing several identities at
//! once should clone the client and set one identity per clone.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};

use crate::config::ClientConfig;
use crate::error::{check_status, ClientError, Result};
use crate::http::{self, HttpRequest, HttpResponse};
use crate::step::Step;
use crate::transport::{Context, Transport, UreqTransport};
use crate::types::{CreateTokenBody, QueryBody, TransactBody, User, UserEnvelope, VerifyTokenBody};

pub const QUERY_PATH: &str = "/admin/query";
pub const TRANSACT_PATH: &str = "/admin/transact";
pub const REFRESH_TOKENS_PATH: &str = "/admin/refresh_tokens";
pub const VERIFY_REFRESH_TOKEN_PATH: &str = "/runtime/auth/verify_refresh_token";

/// Whether request and response bodies may be written to trace logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bodies {
    Loggable,
    /// Bodies carry refresh tokens; only their length is logged.
    Redacted,
}

/// Who the service should evaluate permission rules as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Email(String),
    Token(String),
    Guest,
}

impl Identity {
    fn header(&self) -> (&'static str, &str) {
        match self {
            Identity::Email(email) => (http::AS_EMAIL, email.as_str()),
            Identity::Token(token) => (http::AS_TOKEN, token.as_str()),
            Identity::Guest => (http::AS_GUEST, "true"),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Identity::Email(_) => "email",
            Identity::Token(_) => "token",
            Identity::Guest => "guest",
        }
    }
}

/// Client for the InstantDB admin API.
#[derive(Clone)]
pub struct AdminClient<T = UreqTransport> {
    base_url: String,
    app_id: String,
    secret: String,
    identity: Option<Identity>,
    transport: T,
}

impl AdminClient<UreqTransport> {
    /// Client for the production API using the default blocking transport.
    pub fn new(app_id: &str, secret: &str) -> Self {
        Self::from_config(&ClientConfig::new(app_id, secret))
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::with_transport(config, UreqTransport::new())
    }
}

impl<T> AdminClient<T> {
    pub fn with_transport(config: &ClientConfig, transport: T) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_id: config.app_id.clone(),
            secret: config.secret.clone(),
            identity: None,
            transport,
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Act as the user with `email` on all subsequent requests.
    pub fn as_email(&mut self, email: impl Into<String>) -> &mut Self {
        self.identity = Some(Identity::Email(email.into()));
        self
    }

    /// Act as the user owning refresh token `token` on all subsequent requests.
    pub fn as_token(&mut self, token: impl Into<String>) -> &mut Self {
        self.identity = Some(Identity::Token(token.into()));
        self
    }

    /// Act as an unauthenticated guest on all subsequent requests.
    pub fn as_guest(&mut self) -> &mut Self {
        self.identity = Some(Identity::Guest);
        self
    }

    /// Drop any identity override and act with admin privileges again.
    pub fn clear_identity(&mut self) -> &mut Self {
        self.identity = None;
        self
    }

    // -- builders -----------------------------------------------------------

    pub fn build_query<Q: Serialize + ?Sized>(&self, query: &Q) -> Result<HttpRequest> {
        self.build(QUERY_PATH, &QueryBody { query })
    }

    /// Steps are encoded in the order given, all in one request.
    pub fn build_transact(&self, steps: &[Step]) -> Result<HttpRequest> {
        self.build(TRANSACT_PATH, &TransactBody { steps })
    }

    pub fn build_create_token(&self, email: &str) -> Result<HttpRequest> {
        self.build(REFRESH_TOKENS_PATH, &CreateTokenBody { email })
    }

    pub fn build_verify_token(&self, refresh_token: &str) -> Result<HttpRequest> {
        self.build(
            VERIFY_REFRESH_TOKEN_PATH,
            &VerifyTokenBody {
                app_id: &self.app_id,
                refresh_token,
            },
        )
    }

    fn build<B: Serialize>(&self, path: &str, body: &B) -> Result<HttpRequest> {
        let body = serde_json::to_string(body).map_err(|e| ClientError::Serialization(e.to_string()))?;
        Ok(HttpRequest {
            url: format!("{}{path}", self.base_url),
            headers: self.headers(),
            body,
        })
    }

    fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            (http::CONTENT_TYPE.to_string(), "application/json".to_string()),
            (http::AUTHORIZATION.to_string(), format!("Bearer {}", self.secret)),
            (http::APP_ID.to_string(), self.app_id.clone()),
        ];
        if let Some(identity) = &self.identity {
            let (name, value) = identity.header();
            headers.push((name.to_string(), value.to_string()));
        }
        headers
    }

    // -- parsers ------------------------------------------------------------

    pub fn parse_query<R: DeserializeOwned>(&self, response: HttpResponse) -> Result<R> {
        check_status(&response)?;
        decode(&response.body)
    }

    /// The success body carries nothing the caller needs and is ignored.
    pub fn parse_transact(&self, response: HttpResponse) -> Result<()> {
        check_status(&response)
    }

    pub fn parse_create_token(&self, response: HttpResponse) -> Result<User> {
        parse_user(response)
    }

    pub fn parse_verify_token(&self, response: HttpResponse) -> Result<User> {
        parse_user(response)
    }
}

impl<T: Transport> AdminClient<T> {
    /// Run `query` and decode the result into `R`.
    pub fn query<Q, R>(&self, ctx: &Context, query: &Q) -> Result<R>
    where
        Q: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let request = self.build_query(query)?;
        self.parse_query(self.send(ctx, &request, Bodies::Loggable)?)
    }

    /// Submit `steps` as a single transaction.
    ///
    /// The service applies the steps atomically. On error, assume none of
    /// them were applied; this client does not attempt compensation.
    pub fn transact(&self, ctx: &Context, steps: &[Step]) -> Result<()> {
        let request = self.build_transact(steps)?;
        self.parse_transact(self.send(ctx, &request, Bodies::Loggable)?)
    }

    /// Issue a refresh token for `email`, creating the user if needed.
    pub fn create_token(&self, ctx: &Context, email: &str) -> Result<User> {
        let request = self.build_create_token(email)?;
        self.parse_create_token(self.send(ctx, &request, Bodies::Redacted)?)
    }

    /// Resolve a refresh token to its user.
    pub fn verify_token(&self, ctx: &Context, refresh_token: &str) -> Result<User> {
        let request = self.build_verify_token(refresh_token)?;
        self.parse_verify_token(self.send(ctx, &request, Bodies::Redacted)?)
    }

    fn send(&self, ctx: &Context, request: &HttpRequest, bodies: Bodies) -> Result<HttpResponse> {
        debug!(
            url = %request.url,
            identity = self.identity.as_ref().map_or("admin", Identity::kind),
            "sending admin request"
        );
        match bodies {
            Bodies::Loggable => trace!(body = %request.body, "request body"),
            Bodies::Redacted => trace!(body_len = request.body.len(), "request body redacted"),
        }

        let response = self.transport.execute(ctx, request).map_err(|err| {
            debug!(url = %request.url, error = %err, "admin request failed");
            ClientError::from(err)
        })?;

        debug!(url = %request.url, status = response.status, "admin response");
        match bodies {
            Bodies::Loggable => trace!(body = %response.body, "response body"),
            Bodies::Redacted => trace!(body_len = response.body.len(), "response body redacted"),
        }
        Ok(response)
    }
}

impl<T> std::fmt::Debug for AdminClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminClient")
            .field("base_url", &self.base_url)
            .field("app_id", &self.app_id)
            .field("identity", &self.identity.as_ref().map(Identity::kind))
            .finish_non_exhaustive()
    }
}

fn parse_user(response: HttpResponse) -> Result<User> {
    check_status(&response)?;
    let envelope: UserEnvelope = decode(&response.body)?;
    Ok(envelope.user)
}

fn decode<R: DeserializeOwned>(body: &str) -> Result<R> {
    serde_json::from_str(body).map_err(|e| ClientError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use serde::Deserialize;
    use serde_json::json;

    use crate::query::Query;
    use crate::step::Target;

    fn client() -> AdminClient {
        AdminClient::from_config(
            &ClientConfig::new("app-123", "secret-xyz").with_base_url("http://localhost:3000"),
        )
    }

    fn ok(body: &str) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    fn body_json(req: &HttpRequest) -> serde_json::Value {
        serde_json::from_str(&req.body).unwrap()
    }

    #[test]
    fn default_client_targets_production() {
        let client = AdminClient::new("app", "secret");
        assert_eq!(client.base_url(), "https://api.instantdb.com");
        assert_eq!(client.app_id(), "app");
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let client = AdminClient::from_config(
            &ClientConfig::new("a", "s").with_base_url("http://localhost:3000/"),
        );
        let req = client.build_query(&json!({})).unwrap();
        assert_eq!(req.url, "http://localhost:3000/admin/query");
    }

    #[test]
    fn every_request_carries_auth_headers() {
        let req = client().build_create_token("a@b.c").unwrap();
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("authorization"), Some("Bearer secret-xyz"));
        assert_eq!(req.header("app-id"), Some("app-123"));
        assert_eq!(req.headers.len(), 3);
    }

    #[test]
    fn build_query_wraps_selection() {
        let query = Query::new()
            .expand("lists", Query::new().include("todos"))
            .include("todos");
        let req = client().build_query(&query).unwrap();
        assert_eq!(req.url, "http://localhost:3000/admin/query");
        assert_eq!(
            body_json(&req),
            json!({"query": {"lists": {"todos": {}}, "todos": {}}})
        );
    }

    #[test]
    fn build_transact_preserves_step_order() {
        let steps = vec![
            Step::update("todos", "1", &json!({"title": "a"})).unwrap(),
            Step::delete("todos", "2"),
        ];
        let req = client().build_transact(&steps).unwrap();
        assert_eq!(req.url, "http://localhost:3000/admin/transact");
        assert_eq!(
            req.body,
            r#"{"steps":[["update","todos","1",{"title":"a"}],["delete","todos","2"]]}"#
        );
    }

    #[test]
    fn build_transact_encodes_links() {
        let steps = vec![Step::link(Target::new("lists", "l1"), Target::new("todos", "t1"))];
        let req = client().build_transact(&steps).unwrap();
        assert_eq!(
            body_json(&req),
            json!({"steps": [["link", "lists", "l1", {"todos": "t1"}]]})
        );
    }

    #[test]
    fn build_create_token_sends_email() {
        let req = client().build_create_token("a@b.c").unwrap();
        assert_eq!(req.url, "http://localhost:3000/admin/refresh_tokens");
        assert_eq!(body_json(&req), json!({"email": "a@b.c"}));
    }

    #[test]
    fn build_verify_token_sends_app_id_and_token() {
        let req = client().build_verify_token("tok").unwrap();
        assert_eq!(req.url, "http://localhost:3000/runtime/auth/verify_refresh_token");
        assert_eq!(
            body_json(&req),
            json!({"app-id": "app-123", "refresh-token": "tok"})
        );
    }

    #[test]
    fn identity_override_last_write_wins() {
        let mut client = client();
        client.as_email("someone@example.com");
        client.as_token("refresh");
        client.as_guest();

        let req = client.build_query(&json!({"todos": {}})).unwrap();
        assert_eq!(req.header("as-guest"), Some("true"));
        assert_eq!(req.header("as-email"), None);
        assert_eq!(req.header("as-token"), None);
        assert_eq!(client.identity(), Some(&Identity::Guest));
    }

    #[test]
    fn identity_override_applies_to_all_later_requests() {
        let mut client = client();
        client.as_email("someone@example.com");
        for req in [
            client.build_query(&json!({})).unwrap(),
            client.build_transact(&[]).unwrap(),
            client.build_create_token("x@y.z").unwrap(),
        ] {
            assert_eq!(req.header("as-email"), Some("someone@example.com"));
        }

        client.clear_identity();
        let req = client.build_query(&json!({})).unwrap();
        assert_eq!(req.header("as-email"), None);
    }

    #[test]
    fn clones_keep_independent_identities() {
        let mut guest = client();
        guest.as_guest();
        let mut user = guest.clone();
        user.as_token("tok");

        assert_eq!(guest.build_query(&json!({})).unwrap().header("as-guest"), Some("true"));
        assert_eq!(user.build_query(&json!({})).unwrap().header("as-token"), Some("tok"));
        assert_eq!(user.build_query(&json!({})).unwrap().header("as-guest"), None);
    }

    #[derive(Debug, Deserialize)]
    struct Todo {
        id: String,
        title: String,
        done: bool,
    }

    #[derive(Debug, Deserialize)]
    struct Todos {
        todos: Vec<Todo>,
    }

    #[test]
    fn parse_query_decodes_into_caller_shape() {
        let result: Todos = client()
            .parse_query(ok(r#"{"todos":[{"id":"x","title":"t","done":false}]}"#))
            .unwrap();
        assert_eq!(result.todos.len(), 1);
        assert_eq!(result.todos[0].id, "x");
        assert_eq!(result.todos[0].title, "t");
        assert!(!result.todos[0].done);
    }

    #[test]
    fn parse_query_shape_mismatch_is_decode_error() {
        let err = client().parse_query::<Todos>(ok(r#"{"todos":{}}"#)).unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
    }

    #[test]
    fn parse_query_api_error() {
        let response = HttpResponse {
            status: 400,
            headers: Vec::new(),
            body: r#"{"message":"Validation failed for query"}"#.to_string(),
        };
        let err = client().parse_query::<serde_json::Value>(response).unwrap_err();
        let api = err.api().unwrap();
        assert_eq!(api.status, 400);
        assert_eq!(api.message, "Validation failed for query");
    }

    #[test]
    fn parse_transact_ignores_success_body() {
        assert!(client().parse_transact(ok("")).is_ok());
        assert!(client().parse_transact(ok(r#"{"tx-id":42}"#)).is_ok());
    }

    #[test]
    fn parse_create_token_unwraps_user() {
        let user = client()
            .parse_create_token(ok(
                r#"{"user":{"id":"u","app_id":"app-123","email":"a@b.c","created_at":"2024-05-01","refresh_token":"r"}}"#,
            ))
            .unwrap();
        assert_eq!(user.email, "a@b.c");
        assert_eq!(user.refresh_token, "r");
    }

    #[test]
    fn parse_verify_token_missing_user_is_decode_error() {
        let err = client().parse_verify_token(ok("{}")).unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
    }

    /// Transport answering every request with the same response.
    struct Canned(HttpResponse);

    impl Transport for Canned {
        fn execute(
            &self,
            _ctx: &Context,
            _request: &HttpRequest,
        ) -> std::result::Result<HttpResponse, crate::error::TransportError> {
            Ok(self.0.clone())
        }
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` with TRACE logging captured into a string.
    fn capture_logs(f: impl FnOnce()) -> String {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = buffer.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    fn canned_client(body: &str) -> AdminClient<Canned> {
        AdminClient::with_transport(
            &ClientConfig::new("app-123", "secret-xyz").with_base_url("http://localhost:3000"),
            Canned(ok(body)),
        )
    }

    const USER_BODY: &str = r#"{"user":{"id":"u","app_id":"app-123","email":"a@b.c","created_at":"2024-05-01","refresh_token":"refresh-sekrit-42"}}"#;

    #[test]
    fn token_bodies_never_reach_trace_logs() {
        let client = canned_client(USER_BODY);
        let logs = capture_logs(|| {
            client.create_token(&Context::background(), "a@b.c").unwrap();
            client
                .verify_token(&Context::background(), "refresh-sekrit-42")
                .unwrap();
        });
        assert!(logs.contains("response body redacted"), "{logs}");
        assert!(!logs.contains("refresh-sekrit-42"), "{logs}");
        assert!(!logs.contains("secret-xyz"), "{logs}");
    }

    #[test]
    fn query_bodies_are_traced() {
        let client = canned_client(r#"{"todos":[{"id":"x","title":"traced-title","done":false}]}"#);
        let logs = capture_logs(|| {
            let _: serde_json::Value = client
                .query(&Context::background(), &Query::new().include("todos"))
                .unwrap();
        });
        assert!(logs.contains("traced-title"), "{logs}");
        assert!(!logs.contains("secret-xyz"), "{logs}");
    }

    #[test]
    fn debug_output_hides_secret() {
        let rendered = format!("{:?}", client());
        assert!(!rendered.contains("secret-xyz"));
    }
}
