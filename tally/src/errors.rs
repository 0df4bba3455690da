use crate::db::errors::DbError;
use crate::db::models::counters::{Counter, CounterTable};
use rust_decimal::Decimal;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// A guarded decrement would take the counter below zero
    #[error("{} on {entity}: requested {requested}", .counter.shortfall_message())]
    Insufficient {
        entity: String,
        counter: Counter,
        requested: Decimal,
    },

    /// Negative delta, or more decimal places than the counter stores
    #[error("Invalid amount {amount} for {counter}: {reason}")]
    InvalidAmount {
        counter: Counter,
        amount: Decimal,
        reason: &'static str,
    },

    /// The result of a mutation cannot be represented
    #[error("{counter} on {entity} would overflow")]
    Overflow { entity: String, counter: Counter },

    /// The counter is not a column of the entity's table
    #[error("{table} has no counter {counter}")]
    UnsupportedCounter { table: CounterTable, counter: Counter },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} {id} not found")]
    NotFound { resource: String, id: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Database(DbError::from(err))
    }
}

impl Error {
    /// Whether the error was caused by the caller's input rather than by infrastructure
    pub fn is_validation(&self) -> bool {
        match self {
            Error::Insufficient { .. }
            | Error::InvalidAmount { .. }
            | Error::Overflow { .. }
            | Error::UnsupportedCounter { .. }
            | Error::BadRequest { .. }
            | Error::NotFound { .. } => true,
            Error::Database(db_err) => matches!(
                db_err,
                DbError::NotFound | DbError::OutOfRange { .. } | DbError::ProtectedEntity { .. }
            ),
            Error::Internal { .. } | Error::Other(_) => false,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Insufficient { counter, .. } => counter.shortfall_message().to_string(),
            Error::InvalidAmount { reason, .. } => format!("Invalid amount: {reason}"),
            Error::Overflow { .. } => "Amount out of range".to_string(),
            Error::UnsupportedCounter { .. } => "Unsupported counter".to_string(),
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, id } => format!("{resource} {id} not found"),
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { .. } => "Resource already exists".to_string(),
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::OutOfRange { .. } => "Amount out of range".to_string(),
                DbError::ProtectedEntity {
                    operation,
                    entity_type,
                    reason,
                    ..
                } => format!("Cannot {operation} {entity_type}: {reason}"),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
