//! Error types for polydb.
//!
//! Every variant names the backend it came from so callers can tell a Redis
//! failure from a SQL Server one without inspecting the message. Callers branch
//! on the variant to tell "absent" (`NotFound`) apart from "broken"
//! (`Connection`, `Operation`).

use crate::config::BackendKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed ({backend}): {message}")]
    Connection {
        backend: BackendKind,
        message: String,
        suggestion: String,
    },

    #[error("{backend} adapter is already connected")]
    AlreadyConnected { backend: BackendKind },

    #[error("{backend} database not connected")]
    NotConnected { backend: BackendKind },

    #[error("{backend}: {target} not found")]
    NotFound { backend: BackendKind, target: String },

    #[error("Failed to reconnect to {backend} after {attempts} attempts")]
    ReconnectFailed { backend: BackendKind, attempts: u32 },

    #[error("{backend} operation failed: {message}")]
    Operation { backend: BackendKind, message: String },

    #[error("{backend} decode error: {message}")]
    Decode { backend: BackendKind, message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Cancelled: {operation}")]
    Cancelled { operation: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(
        backend: BackendKind,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Connection {
            backend,
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Wrap a raw driver error from a connect attempt. The suggestion is
    /// picked from the driver's message.
    pub fn connect_failed(backend: BackendKind, error: impl std::fmt::Display) -> Self {
        let message = error.to_string();
        let suggestion = connection_suggestion(backend, &message);
        Self::connection(backend, format!("Failed to connect: {}", message), suggestion)
    }

    pub fn already_connected(backend: BackendKind) -> Self {
        Self::AlreadyConnected { backend }
    }

    pub fn not_connected(backend: BackendKind) -> Self {
        Self::NotConnected { backend }
    }

    /// Create a not-found error for a key, row or document.
    pub fn not_found(backend: BackendKind, target: impl Into<String>) -> Self {
        Self::NotFound {
            backend,
            target: target.into(),
        }
    }

    pub fn reconnect_failed(backend: BackendKind, attempts: u32) -> Self {
        Self::ReconnectFailed { backend, attempts }
    }

    /// Create an error for a failed native call.
    pub fn operation(backend: BackendKind, message: impl Into<String>) -> Self {
        Self::Operation {
            backend,
            message: message.into(),
        }
    }

    pub fn decode(backend: BackendKind, message: impl Into<String>) -> Self {
        Self::Decode {
            backend,
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Get the backend this error originated from, if any.
    pub fn backend(&self) -> Option<BackendKind> {
        match self {
            Self::Connection { backend, .. }
            | Self::AlreadyConnected { backend }
            | Self::NotConnected { backend }
            | Self::NotFound { backend, .. }
            | Self::ReconnectFailed { backend, .. }
            | Self::Operation { backend, .. }
            | Self::Decode { backend, .. } => Some(*backend),
            Self::InvalidInput { .. } | Self::Cancelled { .. } => None,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::AlreadyConnected { .. } => Some("Disconnect first or call reconnect"),
            Self::NotConnected { .. } => Some("Call connect before issuing operations"),
            Self::ReconnectFailed { .. } => {
                Some("Check that the server is running and reachable, then reconnect")
            }
            _ => None,
        }
    }

    /// True for the zero-row / zero-document / missing-key condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error is retryable by reconnecting.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::NotConnected { .. } | Self::ReconnectFailed { .. }
        )
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        const PG: BackendKind = BackendKind::PostgreSQL;
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                PG,
                msg.to_string(),
                "Check the host, port and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let message = match db_err.code() {
                    Some(code) => format!("{} (SQLSTATE: {})", db_err.message(), code),
                    None => db_err.message().to_string(),
                };
                DbError::operation(PG, message)
            }
            sqlx::Error::RowNotFound => DbError::not_found(PG, "row"),
            sqlx::Error::PoolTimedOut => DbError::connection(
                PG,
                "Timed out acquiring a pooled connection",
                "Check database server status",
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection(PG, "Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                PG,
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                PG,
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                PG,
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::decode(PG, format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::decode(PG, format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::decode(PG, source.to_string()),
            _ => DbError::operation(PG, err.to_string()),
        }
    }
}

impl From<tiberius::error::Error> for DbError {
    fn from(err: tiberius::error::Error) -> Self {
        const MSSQL: BackendKind = BackendKind::SqlServer;
        match err {
            tiberius::error::Error::Io { kind, message } => DbError::connection(
                MSSQL,
                format!("I/O error ({:?}): {}", kind, message),
                "Check network connectivity and database server status",
            ),
            tiberius::error::Error::Server(token) => DbError::operation(
                MSSQL,
                format!("{} (code: {})", token.message(), token.code()),
            ),
            tiberius::error::Error::Conversion(msg) => DbError::decode(MSSQL, msg.to_string()),
            other => DbError::operation(MSSQL, other.to_string()),
        }
    }
}

impl From<bb8::RunError<bb8_tiberius::Error>> for DbError {
    fn from(err: bb8::RunError<bb8_tiberius::Error>) -> Self {
        match err {
            bb8::RunError::User(e) => DbError::connection(
                BackendKind::SqlServer,
                e.to_string(),
                "Check network connectivity and database server status",
            ),
            bb8::RunError::TimedOut => DbError::connection(
                BackendKind::SqlServer,
                "Timed out acquiring a pooled connection",
                "Check database server status",
            ),
        }
    }
}

impl From<mongodb::error::Error> for DbError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        const MONGO: BackendKind = BackendKind::MongoDB;
        match *err.kind {
            ErrorKind::Authentication { .. } => {
                DbError::connection(MONGO, err.to_string(), "Check the username and password")
            }
            ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) | ErrorKind::DnsResolve { .. } => {
                DbError::connection(
                    MONGO,
                    err.to_string(),
                    "Check network connectivity and database server status",
                )
            }
            ErrorKind::InvalidArgument { .. } => DbError::invalid_input(err.to_string()),
            ErrorKind::BsonDeserialization(_) | ErrorKind::BsonSerialization(_) => {
                DbError::decode(MONGO, err.to_string())
            }
            _ => DbError::operation(MONGO, err.to_string()),
        }
    }
}

impl From<redis::RedisError> for DbError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
            DbError::connection(
                BackendKind::Redis,
                err.to_string(),
                "Check network connectivity and Redis server status",
            )
        } else {
            DbError::operation(BackendKind::Redis, err.to_string())
        }
    }
}

impl From<etcd_client::Error> for DbError {
    fn from(err: etcd_client::Error) -> Self {
        match err {
            etcd_client::Error::TransportError(e) => DbError::connection(
                BackendKind::Etcd,
                e.to_string(),
                "Check network connectivity and etcd cluster status",
            ),
            etcd_client::Error::InvalidUri(e) => DbError::invalid_input(e.to_string()),
            other => DbError::operation(BackendKind::Etcd, other.to_string()),
        }
    }
}

/// Pick a connection hint from the text of a driver error.
pub fn connection_suggestion(backend: BackendKind, error: &str) -> String {
    let error = error.to_lowercase();

    if error.contains("connection refused") || error.contains("timed out") {
        return format!("Check that the {} server is running and accessible", backend);
    }

    if error.contains("authentication") || error.contains("password") || error.contains("login") {
        return "Verify the username and password in the configuration".to_string();
    }

    if error.contains("does not exist") || error.contains("cannot open database") {
        return "Check that the database name exists".to_string();
    }

    if error.contains("tls") || error.contains("ssl") || error.contains("certificate") {
        return "Check TLS/SSL configuration or try disabling it".to_string();
    }

    format!(
        "Verify the host and port ({} defaults to {})",
        backend,
        backend.default_port()
    )
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_backend() {
        let err = DbError::connection(BackendKind::Redis, "refused", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
        assert!(err.to_string().contains("Redis"));
    }

    #[test]
    fn test_connect_failed_wraps_once() {
        let err = DbError::connect_failed(BackendKind::Redis, "Connection refused (os error 111)");
        assert_eq!(
            err.to_string(),
            "Connection failed (Redis): Failed to connect: Connection refused (os error 111)"
        );
        assert!(err.suggestion().unwrap().contains("Redis server is running"));
    }

    #[test]
    fn test_not_connected_display() {
        let err = DbError::not_connected(BackendKind::PostgreSQL);
        assert_eq!(err.to_string(), "PostgreSQL database not connected");
    }

    #[test]
    fn test_reconnect_failed_names_attempts() {
        let err = DbError::reconnect_failed(BackendKind::MongoDB, 3);
        assert!(err.to_string().contains("after 3 attempts"));
    }

    #[test]
    fn test_not_found_is_distinct_from_connectivity() {
        let missing = DbError::not_found(BackendKind::Redis, "key 'a'");
        let broken = DbError::connection(BackendKind::Redis, "refused", "retry");
        assert!(missing.is_not_found());
        assert!(!missing.is_retryable());
        assert!(!broken.is_not_found());
        assert!(broken.is_retryable());
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::connection(BackendKind::Etcd, "dial timeout", "Check the endpoint");
        assert_eq!(err.suggestion(), Some("Check the endpoint"));
        assert!(DbError::invalid_input("bad").suggestion().is_none());
    }

    #[test]
    fn test_error_backend() {
        assert_eq!(
            DbError::operation(BackendKind::SqlServer, "boom").backend(),
            Some(BackendKind::SqlServer)
        );
        assert_eq!(DbError::cancelled("reconnect").backend(), None);
    }

    #[test]
    fn test_connection_suggestion() {
        assert!(
            connection_suggestion(BackendKind::Redis, "Connection refused (os error 111)")
                .contains("Redis server is running")
        );
        assert!(
            connection_suggestion(BackendKind::PostgreSQL, "password authentication failed")
                .contains("username and password")
        );
        assert!(connection_suggestion(BackendKind::Etcd, "weird").contains("2379"));
    }

    #[test]
    fn test_sqlx_row_not_found_maps_to_not_found() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(err.is_not_found());
        assert_eq!(err.backend(), Some(BackendKind::PostgreSQL));
    }

    #[test]
    fn test_sqlx_pool_closed_is_retryable() {
        let err: DbError = sqlx::Error::PoolClosed.into();
        assert!(err.is_retryable());
    }
}
