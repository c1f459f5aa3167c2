//! Domain error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::{StoreId, UserId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Classifier attached to every validation failure.
///
/// Wire names are snake_case and stable; downstream consumers branch on them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCode {
    InsufficientStock,
    InvalidQuantity,
    InvalidMovement,
    InvalidTransition,
    RequiresFullUnit,
    DuplicateDevice,
    AuthorizationConflict,
    AuthorizationExhausted,
    PurchaseNotReceivable,
}

impl ValidationCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationCode::InsufficientStock => "insufficient_stock",
            ValidationCode::InvalidQuantity => "invalid_quantity",
            ValidationCode::InvalidMovement => "invalid_movement",
            ValidationCode::InvalidTransition => "invalid_transition",
            ValidationCode::RequiresFullUnit => "requires_full_unit",
            ValidationCode::DuplicateDevice => "duplicate_device",
            ValidationCode::AuthorizationConflict => "authorization_conflict",
            ValidationCode::AuthorizationExhausted => "authorization_exhausted",
            ValidationCode::PurchaseNotReceivable => "purchase_not_receivable",
        }
    }
}

impl core::fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain-level error.
///
/// Keep this focused on deterministic business failures. Every error returns
/// synchronously inside the caller's unit of work and rolls the whole
/// transaction back; nothing here is retried internally.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A business rule rejected the operation.
    #[error("{code}: {message}")]
    Validation {
        code: ValidationCode,
        message: String,
    },

    /// A requested entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// The acting user lacks the required store-scoped grant.
    #[error("user {user} is not allowed to {action} on store {store}")]
    PermissionDenied {
        user: UserId,
        store: StoreId,
        action: &'static str,
    },

    /// An identifier failed to parse.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(code: ValidationCode, message: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: message.into(),
        }
    }

    pub fn insufficient_stock(message: impl Into<String>) -> Self {
        Self::validation(ValidationCode::InsufficientStock, message)
    }

    pub fn invalid_quantity(message: impl Into<String>) -> Self {
        Self::validation(ValidationCode::InvalidQuantity, message)
    }

    pub fn invalid_movement(message: impl Into<String>) -> Self {
        Self::validation(ValidationCode::InvalidMovement, message)
    }

    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::validation(ValidationCode::InvalidTransition, message)
    }

    pub fn requires_full_unit(message: impl Into<String>) -> Self {
        Self::validation(ValidationCode::RequiresFullUnit, message)
    }

    pub fn duplicate_device(message: impl Into<String>) -> Self {
        Self::validation(ValidationCode::DuplicateDevice, message)
    }

    pub fn authorization_conflict(message: impl Into<String>) -> Self {
        Self::validation(ValidationCode::AuthorizationConflict, message)
    }

    pub fn authorization_exhausted(message: impl Into<String>) -> Self {
        Self::validation(ValidationCode::AuthorizationExhausted, message)
    }

    pub fn purchase_not_receivable(message: impl Into<String>) -> Self {
        Self::validation(ValidationCode::PurchaseNotReceivable, message)
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn permission_denied(user: UserId, store: StoreId, action: &'static str) -> Self {
        Self::PermissionDenied {
            user,
            store,
            action,
        }
    }

    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::InvalidId(message.into())
    }

    /// Validation classifier, when this is a validation failure.
    pub fn code(&self) -> Option<ValidationCode> {
        match self {
            Self::Validation { code, .. } => Some(*code),
            _ => None,
        }
    }
}
