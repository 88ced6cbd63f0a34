//! Classify HTTP status codes and curl transport errors into fetch outcomes.

use std::fmt;

/// Transport-level failure kind, mapped from libcurl error predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// Hostname (or proxy) resolution failed.
    Dns,
    /// TCP-level failure: refused, reset, or the connection died mid-transfer.
    Connect,
    /// Connect or overall request timeout elapsed.
    Timeout,
    /// TLS handshake failed.
    Tls,
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NetworkErrorKind::Dns => "dns",
            NetworkErrorKind::Connect => "connect",
            NetworkErrorKind::Timeout => "timeout",
            NetworkErrorKind::Tls => "tls",
        };
        f.write_str(s)
    }
}

/// Classification of a failed attempt, consumed by the retry policy and the
/// error log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// 200 response whose body did not parse as JSON.
    InvalidPayload,
    /// HTTP 404. Permanent; never retried.
    NotFound,
    /// HTTP 429. Retried with amplified backoff.
    RateLimited,
    /// HTTP 5xx.
    ServerError(u16),
    /// Any other non-200 status.
    ClientProtocol(u16),
    /// Transport failure before a usable response arrived.
    Network(NetworkErrorKind),
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureClass::InvalidPayload => write!(f, "invalid_payload"),
            FailureClass::NotFound => write!(f, "not_found"),
            FailureClass::RateLimited => write!(f, "rate_limited"),
            FailureClass::ServerError(code) => write!(f, "server_error({})", code),
            FailureClass::ClientProtocol(code) => write!(f, "client_protocol({})", code),
            FailureClass::Network(kind) => write!(f, "network({})", kind),
        }
    }
}

/// Outcome of one fetch attempt. The executor is single-shot; deciding what
/// to do with a failure belongs to the retry policy.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// 200 response, body parsed as JSON, artifact moved into place.
    Success,
    /// Anything else, classified, with whatever detail was available.
    Failure { class: FailureClass, detail: String },
}

impl FetchOutcome {
    pub fn failure(class: FailureClass, detail: impl Into<String>) -> Self {
        FetchOutcome::Failure {
            class,
            detail: detail.into(),
        }
    }

    /// The failure classification, or `None` for a success.
    pub fn failure_class(&self) -> Option<FailureClass> {
        match self {
            FetchOutcome::Success => None,
            FetchOutcome::Failure { class, .. } => Some(*class),
        }
    }
}

/// Classify a non-200 HTTP status code.
pub fn classify_status(code: u16) -> FailureClass {
    match code {
        404 => FailureClass::NotFound,
        429 => FailureClass::RateLimited,
        500..=599 => FailureClass::ServerError(code),
        _ => FailureClass::ClientProtocol(code),
    }
}

/// Classify a curl transport error into a network failure kind.
pub fn classify_transport(e: &curl::Error) -> NetworkErrorKind {
    if e.is_operation_timedout() {
        return NetworkErrorKind::Timeout;
    }
    if e.is_couldnt_resolve_host() || e.is_couldnt_resolve_proxy() {
        return NetworkErrorKind::Dns;
    }
    if e.is_ssl_connect_error() {
        return NetworkErrorKind::Tls;
    }
    // couldnt_connect, reset/read/recv/send failures, empty replies.
    NetworkErrorKind::Connect
}
