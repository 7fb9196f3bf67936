//! Credential header probing for providers with inconsistent auth schemes.
//!
//! The placement provider accepts its API key under one of several headers
//! depending on the account. The probe tries each scheme in order until one
//! is accepted, then pins it for the rest of the process. Header names are
//! case-insensitive on the wire, so `x-api-key` and `X-API-Key` are one
//! scheme.

use reqwest::RequestBuilder;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Mutex;

/// One way of presenting the API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthScheme {
    /// `x-api-key: <key>`
    XApiKey,
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `api-key: <key>`
    PlainApiKeyHeader,
}

/// Attempts made with a pinned scheme before a transport failure is final.
pub const PINNED_ATTEMPTS: usize = AuthScheme::ORDER.len();

impl AuthScheme {
    /// Schemes in probing order.
    pub const ORDER: [AuthScheme; 3] = [
        AuthScheme::XApiKey,
        AuthScheme::Bearer,
        AuthScheme::PlainApiKeyHeader,
    ];

    /// Attach the key to a request.
    #[must_use]
    pub fn apply(self, request: RequestBuilder, api_key: &str) -> RequestBuilder {
        match self {
            Self::XApiKey => request.header("x-api-key", api_key),
            Self::Bearer => request.bearer_auth(api_key),
            Self::PlainApiKeyHeader => request.header("api-key", api_key),
        }
    }

    /// Header name, for logging.
    #[must_use]
    pub fn header_name(self) -> &'static str {
        match self {
            Self::XApiKey => "x-api-key",
            Self::Bearer => "Authorization",
            Self::PlainApiKeyHeader => "api-key",
        }
    }
}

/// Where the probe stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No request has been accepted yet
    Unconfirmed,
    /// A probing pass is under way; `next` is the index being tried
    Probing {
        /// Index into [`AuthScheme::ORDER`]
        next: usize,
    },
    /// A scheme was accepted and is used for every request
    Pinned(AuthScheme),
}

/// Whether a response means the credentials were not recognized.
///
/// 401 and 403 always count; the provider also answers 500 with a
/// "No API key provided" body when the header name is wrong.
#[must_use]
pub fn is_credential_rejection(status: u16, body: &str) -> bool {
    match status {
        401 | 403 => true,
        500 => body.contains("No API key provided"),
        _ => false,
    }
}

/// Header probing state machine.
#[derive(Debug)]
pub struct AuthProbe {
    state: Mutex<AuthState>,
    passes: AtomicU32,
}

impl Default for AuthProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthProbe {
    /// Create an unconfirmed probe.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AuthState::Unconfirmed),
            passes: AtomicU32::new(0),
        }
    }

    /// Current state.
    pub async fn state(&self) -> AuthState {
        *self.state.lock().await
    }

    /// Number of probing passes started so far.
    pub fn probe_passes(&self) -> u32 {
        self.passes.load(Ordering::SeqCst)
    }

    /// Schemes to try for the next request, in order.
    ///
    /// A pinned scheme is repeated [`PINNED_ATTEMPTS`] times so transport
    /// failures get retried on it. Otherwise a new probing pass starts over
    /// the full order.
    pub async fn candidates(&self) -> Vec<AuthScheme> {
        let mut state = self.state.lock().await;
        match *state {
            AuthState::Pinned(scheme) => vec![scheme; PINNED_ATTEMPTS],
            AuthState::Unconfirmed | AuthState::Probing { .. } => {
                self.passes.fetch_add(1, Ordering::SeqCst);
                *state = AuthState::Probing { next: 0 };
                AuthScheme::ORDER.to_vec()
            }
        }
    }

    /// Record that `scheme` is about to be tried.
    pub async fn attempting(&self, scheme: AuthScheme) {
        let mut state = self.state.lock().await;
        if let AuthState::Probing { .. } = *state {
            let next = AuthScheme::ORDER
                .iter()
                .position(|s| *s == scheme)
                .unwrap_or(0);
            *state = AuthState::Probing { next };
        }
    }

    /// Pin the scheme that was accepted.
    pub async fn accept(&self, scheme: AuthScheme) {
        let mut state = self.state.lock().await;
        if *state != AuthState::Pinned(scheme) {
            tracing::info!(header = scheme.header_name(), "Pinned credential header");
        }
        *state = AuthState::Pinned(scheme);
    }

    /// Record a rejection. A pinned scheme that stops working is dropped so
    /// the next request probes again.
    pub async fn reject(&self, scheme: AuthScheme) {
        let mut state = self.state.lock().await;
        if *state == AuthState::Pinned(scheme) {
            tracing::warn!(
                header = scheme.header_name(),
                "Pinned credential header rejected, will probe again"
            );
            *state = AuthState::Unconfirmed;
        }
    }

    /// Mark a finished pass in which nothing was accepted.
    pub async fn exhausted(&self) {
        let mut state = self.state.lock().await;
        if let AuthState::Probing { .. } = *state {
            *state = AuthState::Unconfirmed;
        }
    }
}
