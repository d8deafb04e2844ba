//! Classification of low-level transport failures.
//!
//! Failures are checked against three rules, in order, over the whole cause
//! chain: timeouts first, then TLS failures, then the fixed table of
//! connection-level kinds. Anything else is handed back untouched.

use std::error::Error as StdError;
use std::fmt;
use std::io;

use crate::transport::{ResolveFailure, TlsFailure};

/// Connection-level failure kinds reported as [`ClassifiedError::ConnectionFailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionFailureKind {
    AddrNotAvailable,
    ConnectionAborted,
    ConnectionRefused,
    ConnectionReset,
    HostUnreachable,
    /// Invalid argument at the socket layer.
    InvalidInput,
    NetworkUnreachable,
    BrokenPipe,
    /// Stream-level I/O failure with no more specific kind: `Other`,
    /// `UnexpectedEof`, `NotConnected` or `WriteZero`, and reqwest connect
    /// errors.
    Io,
    /// Host name resolution failed.
    SocketResolution,
}

/// Kinds that classify as a failed connection.
///
/// `io::Error`s outside these kinds (`PermissionDenied`, `NotFound`,
/// `InvalidData` and the like) are not connection failures and stay
/// unclassified.
pub const CONNECTION_FAILURES: &[ConnectionFailureKind] = &[
    ConnectionFailureKind::AddrNotAvailable,
    ConnectionFailureKind::ConnectionAborted,
    ConnectionFailureKind::ConnectionRefused,
    ConnectionFailureKind::ConnectionReset,
    ConnectionFailureKind::HostUnreachable,
    ConnectionFailureKind::InvalidInput,
    ConnectionFailureKind::NetworkUnreachable,
    ConnectionFailureKind::BrokenPipe,
    ConnectionFailureKind::Io,
    ConnectionFailureKind::SocketResolution,
];

impl ConnectionFailureKind {
    /// Maps a single error in a cause chain to its kind, if it has one.
    pub fn of(error: &(dyn StdError + 'static)) -> Option<Self> {
        if error.is::<ResolveFailure>() {
            return Some(ConnectionFailureKind::SocketResolution);
        }
        if let Some(e) = error.downcast_ref::<reqwest::Error>() {
            return e.is_connect().then_some(ConnectionFailureKind::Io);
        }

        let io = error.downcast_ref::<io::Error>()?;
        Some(match io.kind() {
            io::ErrorKind::AddrNotAvailable => ConnectionFailureKind::AddrNotAvailable,
            io::ErrorKind::ConnectionAborted => ConnectionFailureKind::ConnectionAborted,
            io::ErrorKind::ConnectionRefused => ConnectionFailureKind::ConnectionRefused,
            io::ErrorKind::ConnectionReset => ConnectionFailureKind::ConnectionReset,
            io::ErrorKind::HostUnreachable => ConnectionFailureKind::HostUnreachable,
            io::ErrorKind::InvalidInput => ConnectionFailureKind::InvalidInput,
            io::ErrorKind::NetworkUnreachable => ConnectionFailureKind::NetworkUnreachable,
            io::ErrorKind::BrokenPipe => ConnectionFailureKind::BrokenPipe,
            io::ErrorKind::Other
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
            | io::ErrorKind::WriteZero => ConnectionFailureKind::Io,
            _ => return None,
        })
    }
}

/// A transport failure sorted into one of the reported categories.
///
/// Every variant keeps the original failure, available through
/// [`ClassifiedError::cause`] and [`std::error::Error::source`].
#[derive(Debug)]
pub enum ClassifiedError {
    /// The adapter's timeout expired or the transport reported a timeout.
    Timeout(anyhow::Error),
    /// The TLS layer failed (handshake, certificate, protocol).
    TlsFailure(anyhow::Error),
    /// The connection could not be established or was lost.
    ConnectionFailed(anyhow::Error),
    /// Not a transport failure this adapter knows about.
    Unclassified(anyhow::Error),
}

impl ClassifiedError {
    pub fn cause(&self) -> &anyhow::Error {
        match self {
            ClassifiedError::Timeout(cause)
            | ClassifiedError::TlsFailure(cause)
            | ClassifiedError::ConnectionFailed(cause)
            | ClassifiedError::Unclassified(cause) => cause,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ClassifiedError::Timeout(_))
    }

    pub fn is_tls_failure(&self) -> bool {
        matches!(self, ClassifiedError::TlsFailure(_))
    }

    pub fn is_connection_failed(&self) -> bool {
        matches!(self, ClassifiedError::ConnectionFailed(_))
    }

    /// Converts into the error handed to callers. Unclassified failures come
    /// back exactly as they were raised.
    pub fn into_error(self) -> anyhow::Error {
        match self {
            ClassifiedError::Unclassified(original) => original,
            classified => anyhow::Error::new(classified),
        }
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifiedError::Timeout(cause) => write!(f, "Request timed out: {}", cause),
            ClassifiedError::TlsFailure(cause) => write!(f, "TLS failure: {}", cause),
            ClassifiedError::ConnectionFailed(cause) => write!(f, "Connection failed: {}", cause),
            ClassifiedError::Unclassified(cause) => write!(f, "{}", cause),
        }
    }
}

impl StdError for ClassifiedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        let cause: &(dyn StdError + 'static) = self.cause().as_ref();
        Some(cause)
    }
}

/// Sorts a failure into its category.
///
/// A failure that is already a [`ClassifiedError`] is returned as is.
pub fn classify(error: anyhow::Error) -> ClassifiedError {
    let error = match error.downcast::<ClassifiedError>() {
        Ok(already) => return already,
        Err(error) => error,
    };

    let causes = causes(&error);

    if causes.iter().any(|cause| is_timeout(*cause)) {
        return ClassifiedError::Timeout(error);
    }

    if causes.iter().any(|cause| is_tls(*cause)) {
        return ClassifiedError::TlsFailure(error);
    }

    let connection_failure = causes
        .iter()
        .filter_map(|cause| ConnectionFailureKind::of(*cause))
        .any(|kind| CONNECTION_FAILURES.contains(&kind));
    if connection_failure {
        return ClassifiedError::ConnectionFailed(error);
    }

    ClassifiedError::Unclassified(error)
}

/// Classifies and converts in one step; the form the dispatcher returns.
pub fn classify_error(error: anyhow::Error) -> anyhow::Error {
    classify(error).into_error()
}

fn is_timeout(cause: &(dyn StdError + 'static)) -> bool {
    if cause.is::<tokio::time::error::Elapsed>() {
        return true;
    }
    if let Some(io) = cause.downcast_ref::<io::Error>() {
        return io.kind() == io::ErrorKind::TimedOut;
    }
    cause
        .downcast_ref::<reqwest::Error>()
        .is_some_and(|e| e.is_timeout())
}

fn is_tls(cause: &(dyn StdError + 'static)) -> bool {
    cause.is::<rustls::Error>() || cause.is::<TlsFailure>()
}

/// Flattens the cause chain, also looking inside the payload of each
/// `io::Error` (which `source()` skips over).
fn causes(error: &anyhow::Error) -> Vec<&(dyn StdError + 'static)> {
    let mut out = Vec::new();
    let root: &(dyn StdError + 'static) = error.as_ref();
    expand(root, &mut out);
    out
}

fn expand<'a>(cause: &'a (dyn StdError + 'static), out: &mut Vec<&'a (dyn StdError + 'static)>) {
    let mut current = Some(cause);
    while let Some(err) = current {
        out.push(err);
        if let Some(inner) = err.downcast_ref::<io::Error>().and_then(|io| io.get_ref()) {
            expand(inner, out);
        }
        current = err.source();
    }
}
