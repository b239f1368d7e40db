//! Blocking client for the InstantDB admin API.
//!
//! # Overview
//! Maps method calls onto JSON POSTs against the admin endpoints: queries,
//! transactions of update / delete / link / unlink steps, and refresh-token
//! issuance and verification.
//!
//! # Design
//! - `AdminClient` splits every operation into `build_*` (produces an
//!   `HttpRequest`) and `parse_*` (consumes an `HttpResponse`); the executing
//!   methods route between them through a `Transport`.
//! - `UreqTransport` is the default transport. Anything implementing
//!   `Transport` can replace it, e.g. to reuse an existing HTTP stack.
//! - A `Context` carries the caller's deadline down to the transport; the
//!   client adds no timeouts or retries of its own.
//! - Errors are split into transport failures, API errors (non-2xx, with
//!   the raw body and extracted message) and decode failures.
//!
//! ```no_run
//! use instant_core::{AdminClient, Context, Query, Step, new_id};
//! use serde_json::json;
//!
//! # fn main() -> instant_core::Result<()> {
//! let client = AdminClient::new("app-id", "admin-secret");
//! let ctx = Context::background();
//!
//! client.transact(&ctx, &[Step::update("todos", new_id(), &json!({"title": "a"}))?])?;
//! let todos: serde_json::Value = client.query(&ctx, &Query::new().include("todos"))?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod id;
pub mod query;
pub mod step;
pub mod transport;
pub mod types;

pub use client::{AdminClient, Identity};
pub use config::{ClientConfig, ConfigError};
pub use error::{ApiError, ClientError, Result, TransportError};
pub use http::{HttpRequest, HttpResponse};
pub use id::{lookup, new_id};
pub use query::Query;
pub use step::{Step, Target};
pub use transport::{Context, Transport, UreqTransport};
pub use types::User;
