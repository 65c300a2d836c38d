use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    application::{
        interactions::InteractionError,
        repos::{COMMENTS_COLLECTION, POSTS_COLLECTION, StoreError, USERS_COLLECTION},
        transaction::TransactionError,
    },
    domain::error::DomainError,
    infra::error::InfraError,
};

/// Flattened error chain for logging at the process boundary.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }

    pub fn render(&self) -> String {
        self.messages.join(": ")
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Interaction(#[from] InteractionError),
    #[error(transparent)]
    Transaction(TransactionError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn not_found(entity: &'static str, id: &str) -> Self {
        Self::Domain(DomainError::not_found(entity, id))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AppError::Domain(DomainError::NotFound { .. })
                | AppError::Interaction(InteractionError::PostNotFound { .. })
        )
    }
}

impl From<TransactionError> for AppError {
    fn from(error: TransactionError) -> Self {
        match error {
            TransactionError::NotFound { collection, key } => {
                AppError::Domain(DomainError::not_found(entity_name(&collection), key))
            }
            TransactionError::Store(err) => AppError::Store(err),
            other => AppError::Transaction(other),
        }
    }
}

fn entity_name(collection: &str) -> &'static str {
    match collection {
        POSTS_COLLECTION => "post",
        COMMENTS_COLLECTION => "comment",
        USERS_COLLECTION => "user",
        _ => "document",
    }
}
