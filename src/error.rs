//! Domain error taxonomy mapped onto HTTP status codes.
//!
//! `NotFound` deliberately covers both "doesn't exist" and "no
//! permission to see it" so the API never leaks battle existence.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BattleError {
    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl BattleError {
    pub fn forbidden(msg: impl Into<String>) -> Self {
        BattleError::Forbidden(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        BattleError::InvalidState(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        BattleError::Validation(msg.into())
    }
}

impl ResponseError for BattleError {
    fn status_code(&self) -> StatusCode {
        match self {
            BattleError::NotFound => StatusCode::NOT_FOUND,
            BattleError::Forbidden(_) => StatusCode::FORBIDDEN,
            BattleError::InvalidState(_) | BattleError::Validation(_) => StatusCode::BAD_REQUEST,
            BattleError::Db(_) | BattleError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code() == StatusCode::INTERNAL_SERVER_ERROR {
            log::error!("internal error: {self:?}");
            return HttpResponse::InternalServerError().finish();
        }
        HttpResponse::build(self.status_code())
            .json(serde_json::json!({ "error": self.to_string() }))
    }
}
