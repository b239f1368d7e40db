//! Transport seam between the request/response builders and the network.
//!
//! # Design
//! `AdminClient` never performs I/O itself; it hands each `HttpRequest` to a
//! `Transport` together with the caller's `Context`. The context carries an
//! optional deadline that the transport must honour; the client holds no
//! timers of its own. Retries, pooling and TLS are left entirely to the
//! transport implementation.

use std::time::{Duration, Instant};

use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse};

/// Caller-supplied cancellation scope for one operation.
///
/// `Context::background()` never expires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Context {
    deadline: Option<Instant>,
}

impl Context {
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when there is no deadline.
    ///
    /// Fails with `DeadlineExceeded` once the deadline has passed.
    pub fn remaining(&self) -> Result<Option<Duration>, TransportError> {
        match self.deadline {
            None => Ok(None),
            Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                Some(left) if !left.is_zero() => Ok(Some(left)),
                _ => Err(TransportError::DeadlineExceeded),
            },
        }
    }
}

/// Executes one HTTP exchange.
///
/// Implementations must return non-2xx responses as `Ok(HttpResponse)`; only
/// failures to obtain a response are errors.
pub trait Transport {
    fn execute(&self, ctx: &Context, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, ctx: &Context, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).execute(ctx, request)
    }
}

/// Blocking transport backed by a `ureq` agent.
///
/// Response bodies are read in full regardless of size unless a limit is
/// set with [`UreqTransport::with_body_limit`].
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
    body_limit: u64,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self::from_agent(agent)
    }

    /// Wrap an existing agent.
    ///
    /// The agent must be configured with `http_status_as_error(false)`,
    /// otherwise API errors surface as transport errors.
    pub fn from_agent(agent: ureq::Agent) -> Self {
        Self {
            agent,
            body_limit: u64::MAX,
        }
    }

    /// Fail responses whose body exceeds `limit` bytes with a transport error.
    pub fn with_body_limit(mut self, limit: u64) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn body_limit(&self) -> u64 {
        self.body_limit
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn execute(&self, ctx: &Context, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let timeout = ctx.remaining()?;

        let mut builder = self.agent.post(request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = timeout {
            builder = builder.config().timeout_global(Some(timeout)).build();
        }

        let mut response = builder.send(request.body.as_bytes()).map_err(map_ureq_error)?;

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
        let body = response
            .body_mut()
            .with_config()
            .limit(self.body_limit)
            .read_to_string()
            .map_err(map_ureq_error)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_ureq_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Timeout(_) => TransportError::DeadlineExceeded,
        other => TransportError::Http(other.to_string()),
    }
}
