//! Request and response payloads for the admin API.

use serde::{Deserialize, Serialize};

use crate::step::Step;

/// A user record returned by the token endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub app_id: String,
    pub email: String,
    pub created_at: String,
    pub refresh_token: String,
}

/// `{"user": {...}}` wrapper around token endpoint responses.
#[derive(Debug, Deserialize)]
pub(crate) struct UserEnvelope {
    pub user: User,
}

#[derive(Debug, Serialize)]
pub(crate) struct QueryBody<'a, Q: ?Sized> {
    pub query: &'a Q,
}

#[derive(Debug, Serialize)]
pub(crate) struct TransactBody<'a> {
    pub steps: &'a [Step],
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateTokenBody<'a> {
    pub email: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct VerifyTokenBody<'a> {
    #[serde(rename = "app-id")]
    pub app_id: &'a str,
    #[serde(rename = "refresh-token")]
    pub refresh_token: &'a str,
}
