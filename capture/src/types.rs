//! Primitives consumed from the host RPC framework: call direction, status codes,
//! call metadata and per-call context.

use serde::{Deserialize, Serialize};

use std::{
    collections::{btree_map, BTreeMap},
    error, fmt, io,
    net::SocketAddr,
    time::{Duration, Instant},
};

/// Direction of a call or of a single message, as seen from the current process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Call handled by this process (server side), or a message received by this process.
    Inbound,
    /// Call issued by this process (client side), or a message sent by this process.
    Outbound,
}

impl Direction {
    /// Returns the opposite direction.
    #[must_use]
    pub fn reverse(self) -> Self {
        match self {
            Self::Inbound => Self::Outbound,
            Self::Outbound => Self::Inbound,
        }
    }

    /// Returns a lowercase string presentation of this direction (`inbound` or `outbound`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }

    /// Prefix of the registry key for calls in this direction.
    pub(crate) fn key_prefix(self) -> &'static str {
        match self {
            Self::Inbound => "recv",
            Self::Outbound => "sent",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Canonical status code of a completed call.
///
/// The set of codes is fixed and mirrors the codes used by gRPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    /// The call completed successfully.
    Ok,
    /// The call was cancelled, typically by the caller.
    Cancelled,
    /// Unknown error; also used for errors that do not carry a code.
    Unknown,
    /// The client specified an invalid argument.
    InvalidArgument,
    /// The deadline expired before the call could complete.
    DeadlineExceeded,
    /// A requested entity was not found.
    NotFound,
    /// An entity the client attempted to create already exists.
    AlreadyExists,
    /// The caller does not have permission to execute the call.
    PermissionDenied,
    /// Some resource has been exhausted.
    ResourceExhausted,
    /// The system is not in a state required for the call's execution.
    FailedPrecondition,
    /// The call was aborted.
    Aborted,
    /// The call was attempted past the valid range.
    OutOfRange,
    /// The call is not implemented or not supported.
    Unimplemented,
    /// Internal error.
    Internal,
    /// The service is currently unavailable.
    Unavailable,
    /// Unrecoverable data loss or corruption.
    DataLoss,
    /// The call does not have valid authentication credentials.
    Unauthenticated,
}

impl Code {
    /// Returns the canonical name of this code, e.g. `DeadlineExceeded`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Cancelled => "Canceled",
            Self::Unknown => "Unknown",
            Self::InvalidArgument => "InvalidArgument",
            Self::DeadlineExceeded => "DeadlineExceeded",
            Self::NotFound => "NotFound",
            Self::AlreadyExists => "AlreadyExists",
            Self::PermissionDenied => "PermissionDenied",
            Self::ResourceExhausted => "ResourceExhausted",
            Self::FailedPrecondition => "FailedPrecondition",
            Self::Aborted => "Aborted",
            Self::OutOfRange => "OutOfRange",
            Self::Unimplemented => "Unimplemented",
            Self::Internal => "Internal",
            Self::Unavailable => "Unavailable",
            Self::DataLoss => "DataLoss",
            Self::Unauthenticated => "Unauthenticated",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Normalized outcome of a call: a [`Code`] and an optional human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    code: Code,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    message: String,
}

impl Status {
    /// Creates a status with the specified code and message.
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Creates a successful status with an empty message.
    pub fn ok() -> Self {
        Self::new(Code::Ok, String::new())
    }

    /// Converts an arbitrary error into a status. [`Status`]es and I/O errors are converted
    /// via [`ToStatus`]; other errors get the [`Code::Unknown`] code.
    pub fn from_error(err: &(dyn error::Error + 'static)) -> Self {
        if let Some(status) = err.downcast_ref::<Self>() {
            status.clone()
        } else if let Some(err) = err.downcast_ref::<io::Error>() {
            err.to_status()
        } else {
            Self::new(Code::Unknown, err.to_string())
        }
    }

    /// Normalizes the outcome of a call. `Ok(_)` always maps to [`Self::ok()`].
    pub fn from_result<T, E: ToStatus>(result: &Result<T, E>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(err) => err.to_status(),
        }
    }

    /// Returns the status code.
    pub fn code(&self) -> Code {
        self.code
    }

    /// Returns the status message. The message is empty for successful calls.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Checks whether this status denotes success.
    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }
}

impl fmt::Display for Status {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(formatter, "{}", self.code)
        } else {
            write!(formatter, "{}: {}", self.code, self.message)
        }
    }
}

impl error::Error for Status {}

/// Conversion of a host framework error into a normalized [`Status`].
pub trait ToStatus {
    /// Performs the conversion.
    fn to_status(&self) -> Status;
}

impl ToStatus for Status {
    fn to_status(&self) -> Status {
        self.clone()
    }
}

impl ToStatus for io::Error {
    fn to_status(&self) -> Status {
        let code = match self.kind() {
            io::ErrorKind::NotFound => Code::NotFound,
            io::ErrorKind::PermissionDenied => Code::PermissionDenied,
            io::ErrorKind::AlreadyExists => Code::AlreadyExists,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => Code::InvalidArgument,
            io::ErrorKind::TimedOut => Code::DeadlineExceeded,
            io::ErrorKind::Interrupted => Code::Cancelled,
            io::ErrorKind::Unsupported => Code::Unimplemented,
            io::ErrorKind::OutOfMemory => Code::ResourceExhausted,
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::AddrNotAvailable => Code::Unavailable,
            io::ErrorKind::UnexpectedEof => Code::OutOfRange,
            _ => Code::Unknown,
        };
        Status::new(code, self.to_string())
    }
}

impl<E: ToStatus + ?Sized> ToStatus for &E {
    fn to_status(&self) -> Status {
        (**self).to_status()
    }
}

impl<E: ToStatus + ?Sized> ToStatus for Box<E> {
    fn to_status(&self) -> Status {
        (**self).to_status()
    }
}

impl ToStatus for dyn error::Error {
    fn to_status(&self) -> Status {
        Status::from_error(self)
    }
}

impl ToStatus for dyn error::Error + Send + Sync {
    fn to_status(&self) -> Status {
        Status::from_error(self)
    }
}

/// Key-value multi-map of call metadata (e.g., gRPC headers).
///
/// Keys are case-insensitive and are stored in lowercase; values for the same key
/// keep their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata {
    inner: BTreeMap<String, Vec<String>>,
}

impl Metadata {
    /// Creates empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value for the specified key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let mut key = key.into();
        key.make_ascii_lowercase();
        self.inner.entry(key).or_default().push(value.into());
    }

    /// Returns the first value for the specified key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_all(key).first().map(String::as_str)
    }

    /// Returns all values for the specified key in their insertion order.
    pub fn get_all(&self, key: &str) -> &[String] {
        let values = if key.bytes().any(|ch| ch.is_ascii_uppercase()) {
            self.inner.get(&key.to_ascii_lowercase())
        } else {
            self.inner.get(key)
        };
        values.map_or(&[], Vec::as_slice)
    }

    /// Returns the number of distinct keys.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Checks whether the metadata has no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterates over keys and their values in the lexicographic key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> + '_ {
        self.inner
            .iter()
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Self::new();
        metadata.extend(iter);
        metadata
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for Metadata {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<'a> IntoIterator for &'a Metadata {
    type Item = (&'a String, &'a Vec<String>);
    type IntoIter = btree_map::Iter<'a, String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

/// Per-call information provided by the host framework.
///
/// For server calls, the context should carry incoming metadata and the caller address;
/// for client calls, outgoing metadata. The context is read once, when the call starts.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    metadata: Metadata,
    peer: Option<SocketAddr>,
}

impl CallContext {
    /// Creates a context without a deadline, metadata or peer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the absolute deadline of the call.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets the deadline of the call relative to the current instant. If the deadline
    /// is not representable (e.g., for `Duration::MAX`), the call is left without a deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now().checked_add(timeout);
        self
    }

    /// Sets call metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Sets the address of the remote party.
    #[must_use]
    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Returns the absolute deadline of the call, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns call metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Returns the address of the remote party, if known.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }
}
