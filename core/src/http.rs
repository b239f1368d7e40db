//! HTTP exchange types for the host-does-IO pattern.
//!
//! # Design
//! These types describe admin API requests and responses as plain data.
//! `AdminClient` builds `HttpRequest` values and parses `HttpResponse` values
//! without touching the network; a `Transport` (or the caller's own HTTP
//! stack) performs the actual exchange. Every admin endpoint is a JSON POST,
//! so a request carries no method field.

/// Header carrying the JSON content type on every request.
pub const CONTENT_TYPE: &str = "content-type";
/// Header carrying `Bearer <secret>`.
pub const AUTHORIZATION: &str = "authorization";
/// Header carrying the application id.
pub const APP_ID: &str = "app-id";
/// Identity override: act as the user with this email.
pub const AS_EMAIL: &str = "as-email";
/// Identity override: act as the user owning this refresh token.
pub const AS_TOKEN: &str = "as-token";
/// Identity override: act as an unauthenticated guest.
pub const AS_GUEST: &str = "as-guest";

/// A JSON POST request described as plain data.
///
/// Built by `AdminClient::build_*` methods. `url` is absolute (base URL plus
/// endpoint path) and `body` is already serialized JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpRequest {
    /// Look up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// An HTTP response described as plain data.
///
/// Produced by a `Transport` after executing an `HttpRequest`, then passed to
/// `AdminClient::parse_*` methods.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
