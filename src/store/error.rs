//! Store error taxonomy and classification of storage failures.

use std::collections::BTreeMap;
use std::fmt;

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;
use uuid::Uuid;

use crate::registry::{ConstraintTarget, SchemaError, SchemaRegistry, SyncError};

/// Bad data on write, one message per offending field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationError {
    pub fields: BTreeMap<String, String>,
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new().with(name, message)
    }

    pub fn with(mut self, name: impl Into<String>, message: impl Into<String>) -> Self {
        self.fields.insert(name.into(), message.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("validation failed")?;
        for (i, (field, message)) in self.fields.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{} {}", sep, field, message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

impl From<validator::ValidationErrors> for ValidationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut out = ValidationError::new();
        for (field, errs) in errors.field_errors() {
            let message = errs
                .first()
                .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                .unwrap_or_else(|| "is invalid".to_string());
            out = out.with(field.to_string(), message);
        }
        out
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("timed out waiting for a pooled connection: {0}")]
    PoolTimeout(String),

    #[error("connection lost: {0}")]
    Lost(String),

    #[error("storage unreachable: {0}")]
    Unavailable(String),
}

/// A write pointed a foreign key at a row that does not exist.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{entity}.{foreign_key} references a {target} that does not exist")]
pub struct ReferentialError {
    pub entity: String,
    pub foreign_key: String,
    pub target: String,
    pub id: Option<Uuid>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Referential(#[from] ReferentialError),

    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: Uuid },

    #[error("database error: {0}")]
    Database(#[from] DieselError),

    #[error("{0}")]
    Internal(String),
}

impl StoreError {
    pub fn not_found(entity: impl Into<String>, id: Uuid) -> Self {
        StoreError::NotFound {
            entity: entity.into(),
            id,
        }
    }

    /// Only connectivity failures are worth repeating.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }

    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Schema(_) => "schema",
            StoreError::Sync(_) => "sync",
            StoreError::Validation(_) => "validation",
            StoreError::Connection(_) => "connection",
            StoreError::Referential(_) => "referential",
            StoreError::NotFound { .. } => "not_found",
            StoreError::Database(_) => "database",
            StoreError::Internal(_) => "internal",
        }
    }
}

impl From<diesel::r2d2::PoolError> for StoreError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        StoreError::Connection(ConnectionError::PoolTimeout(err.to_string()))
    }
}

/// Rewrites raw diesel failures into the store taxonomy, using the registry to
/// map constraint names back to fields and relationships.
pub fn classify(registry: &SchemaRegistry, err: StoreError) -> StoreError {
    let StoreError::Database(err) = err else {
        return err;
    };

    match err {
        DieselError::DatabaseError(kind, info) => {
            let constraint = info.constraint_name().map(str::to_string);
            let column = info.column_name().map(str::to_string);
            let message = info.message().to_string();

            match kind {
                DatabaseErrorKind::UniqueViolation => {
                    let field = match constraint.as_deref().and_then(|c| registry.constraint(c)) {
                        Some(ConstraintTarget::Unique { column, .. }) => column.to_string(),
                        _ => column.or(constraint).unwrap_or_else(|| "record".to_string()),
                    };
                    ValidationError::field(field, "must be unique").into()
                }
                DatabaseErrorKind::NotNullViolation => {
                    let field = column.unwrap_or_else(|| "record".to_string());
                    ValidationError::field(field, "is required").into()
                }
                DatabaseErrorKind::CheckViolation => {
                    let field = column.or(constraint).unwrap_or_else(|| "record".to_string());
                    ValidationError::field(field, message).into()
                }
                DatabaseErrorKind::ForeignKeyViolation => {
                    match constraint.as_deref().and_then(|c| registry.constraint(c)) {
                        Some(ConstraintTarget::ForeignKey(relation)) => ReferentialError {
                            entity: registry.entity(relation.dependent).name().to_string(),
                            foreign_key: relation.foreign_key.to_string(),
                            target: registry.entity(relation.owner).name().to_string(),
                            id: None,
                        }
                        .into(),
                        _ => ReferentialError {
                            entity: info.table_name().unwrap_or("record").to_string(),
                            foreign_key: constraint.unwrap_or_else(|| "unknown".to_string()),
                            target: "record".to_string(),
                            id: None,
                        }
                        .into(),
                    }
                }
                DatabaseErrorKind::ClosedConnection | DatabaseErrorKind::UnableToSendCommand => {
                    ConnectionError::Lost(message).into()
                }
                other => StoreError::Database(DieselError::DatabaseError(other, info)),
            }
        }
        DieselError::BrokenTransactionManager => {
            ConnectionError::Lost("transaction manager is broken".to_string()).into()
        }
        other => StoreError::Database(other),
    }
}
