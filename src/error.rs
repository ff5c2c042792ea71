use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::repo::RepoError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("not found")] NotFound,
    #[error("already voted")] AlreadyVoted,
    #[error("item hidden")] ItemHidden,
    #[error("insufficient karma")] InsufficientKarma,
    #[error("not authorized")] NotAuthorized { title: String, detail: String },
    #[error("bad request")] BadRequest { title: String, detail: String },
    #[error("internal error")] Internal,
}

impl ApiError {
    pub fn not_authorized(title: &str, detail: &str) -> Self {
        ApiError::NotAuthorized { title: title.into(), detail: detail.into() }
    }

    pub fn bad_request(title: &str, detail: &str) -> Self {
        ApiError::BadRequest { title: title.into(), detail: detail.into() }
    }

    /// User-facing title/detail pair for the error body.
    fn title_detail(&self) -> Option<(String, String)> {
        match self {
            ApiError::AlreadyVoted => Some((
                "Vote Failed".into(),
                "Sorry you are not allowed to vote twice, nice try!".into(),
            )),
            ApiError::ItemHidden => Some((
                "Vote Failed".into(),
                "This item is already hidden".into(),
            )),
            ApiError::InsufficientKarma => Some((
                "Not Allowed".into(),
                "Sorry, you don't have enough points for that yet".into(),
            )),
            ApiError::NotAuthorized { title, detail }
            | ApiError::BadRequest { title, detail } => {
                Some((title.clone(), detail.clone()))
            }
            _ => None,
        }
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound,
            // A ledger conflict is a duplicate vote everywhere it can occur.
            RepoError::Conflict => ApiError::AlreadyVoted,
            RepoError::Internal(msg) => {
                log::error!("repo error: {msg}");
                ApiError::Internal
            }
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;
        let status = match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::AlreadyVoted
            | ApiError::ItemHidden
            | ApiError::InsufficientKarma
            | ApiError::NotAuthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let (title, detail) = match self.title_detail() {
            Some((t, d)) => (Some(t), Some(d)),
            None => (None, None),
        };
        HttpResponse::build(status).json(ApiErrorBody {
            error: self.to_string(),
            title,
            detail,
        })
    }
}
