//! Shared error type across qmsg crates.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Stable error kinds (one per `QmsgError` variant).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Static/startup misconfiguration.
    Configuration,
    /// Record could not be serialized.
    Encoding,
    /// Payload or header could not be turned into a record.
    Decoding,
    /// Record construction rejected by its schema.
    InvalidRecord,
    /// Permanent transport failure.
    QueueClient,
    /// Transient transport failure that outlived the retry budget.
    Transport,
    /// Send/receive/dead-letter wrapper.
    QueueMessaging,
    /// Typed access on an empty envelope.
    NoMessagesReceived,
    /// Envelope already acknowledged or dead-lettered.
    AlreadySettled,
}

impl ErrorKind {
    /// String representation used in logs and test vectors.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Configuration => "CONFIGURATION_ERROR",
            ErrorKind::Encoding => "ENCODING_ERROR",
            ErrorKind::Decoding => "DECODING_ERROR",
            ErrorKind::InvalidRecord => "INVALID_RECORD",
            ErrorKind::QueueClient => "QUEUE_CLIENT_ERROR",
            ErrorKind::Transport => "TRANSPORT_ERROR",
            ErrorKind::QueueMessaging => "QUEUE_MESSAGING_ERROR",
            ErrorKind::NoMessagesReceived => "NO_MESSAGES_RECEIVED",
            ErrorKind::AlreadySettled => "ALREADY_SETTLED",
        }
    }
}

/// Transport-level classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    ConnectionReset,
    BrokenPipe,
    ConnectionRefused,
    ConnectionAborted,
    TimedOut,
    /// Designated transient service error (e.g. backend unavailable).
    Unavailable,
    NotFound,
    PermissionDenied,
    InvalidArgument,
    Unsupported,
    Other,
}

impl TransportErrorKind {
    /// Whether a failure of this kind is worth another attempt.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            TransportErrorKind::ConnectionReset
                | TransportErrorKind::BrokenPipe
                | TransportErrorKind::ConnectionRefused
                | TransportErrorKind::ConnectionAborted
                | TransportErrorKind::TimedOut
                | TransportErrorKind::Unavailable
        )
    }
}

/// Error reported by a `Transport` implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::NotFound, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Unavailable, message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;

        let kind = match err.kind() {
            Io::ConnectionReset => TransportErrorKind::ConnectionReset,
            Io::BrokenPipe => TransportErrorKind::BrokenPipe,
            Io::ConnectionRefused => TransportErrorKind::ConnectionRefused,
            Io::ConnectionAborted => TransportErrorKind::ConnectionAborted,
            Io::TimedOut => TransportErrorKind::TimedOut,
            Io::NotFound => TransportErrorKind::NotFound,
            Io::PermissionDenied => TransportErrorKind::PermissionDenied,
            Io::InvalidInput => TransportErrorKind::InvalidArgument,
            _ => TransportErrorKind::Other,
        };
        Self::new(kind, err.to_string())
    }
}

/// Field-level validation messages, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Messages recorded for `field`, empty if none.
    pub fn field(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{field}: {}", messages.join(" "))?;
        }
        Ok(())
    }
}

/// How an envelope was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Acknowledged,
    DeadLettered,
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, QmsgError>;

/// Unified error type used by core and pubsub.
#[derive(Debug, Clone, Error)]
pub enum QmsgError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("error while encoding data: {message}")]
    Encoding {
        message: String,
        errors: ValidationErrors,
    },

    #[error("error while decoding data: {message}")]
    Decoding {
        message: String,
        errors: ValidationErrors,
    },

    #[error("invalid record: {0}")]
    InvalidRecord(ValidationErrors),

    #[error("error in queue client: {message}")]
    Client {
        message: String,
        #[source]
        source: TransportError,
    },

    #[error("transport error: {0}")]
    Transport(TransportError),

    #[error("error in queue messaging: {message}")]
    Messaging {
        message: String,
        attributes: BTreeMap<String, String>,
        payload: Option<String>,
        #[source]
        source: Box<QmsgError>,
    },

    #[error("no messages received")]
    NoMessagesReceived,

    #[error("envelope already settled ({0:?})")]
    AlreadySettled(Settlement),
}

impl QmsgError {
    pub fn encoding(message: impl Into<String>) -> Self {
        QmsgError::Encoding {
            message: message.into(),
            errors: ValidationErrors::new(),
        }
    }

    pub fn decoding(message: impl Into<String>) -> Self {
        QmsgError::Decoding {
            message: message.into(),
            errors: ValidationErrors::new(),
        }
    }

    /// Wrap a lower-level error with send/receive context.
    pub fn messaging(
        message: impl Into<String>,
        attributes: BTreeMap<String, String>,
        payload: Option<String>,
        source: QmsgError,
    ) -> Self {
        QmsgError::Messaging {
            message: message.into(),
            attributes,
            payload,
            source: Box::new(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            QmsgError::Configuration(_) => ErrorKind::Configuration,
            QmsgError::Encoding { .. } => ErrorKind::Encoding,
            QmsgError::Decoding { .. } => ErrorKind::Decoding,
            QmsgError::InvalidRecord(_) => ErrorKind::InvalidRecord,
            QmsgError::Client { .. } => ErrorKind::QueueClient,
            QmsgError::Transport(_) => ErrorKind::Transport,
            QmsgError::Messaging { .. } => ErrorKind::QueueMessaging,
            QmsgError::NoMessagesReceived => ErrorKind::NoMessagesReceived,
            QmsgError::AlreadySettled(_) => ErrorKind::AlreadySettled,
        }
    }

    /// Field-level messages carried by encode/decode/construction failures.
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            QmsgError::Encoding { errors, .. }
            | QmsgError::Decoding { errors, .. }
            | QmsgError::InvalidRecord(errors) => Some(errors),
            _ => None,
        }
    }

    /// The transport error at the bottom of a client/transport/messaging chain.
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            QmsgError::Client { source, .. } => Some(source),
            QmsgError::Transport(e) => Some(e),
            QmsgError::Messaging { source, .. } => source.transport_error(),
            _ => None,
        }
    }
}
