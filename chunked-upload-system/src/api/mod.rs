pub mod dtos;
pub mod upload;

use actix_web::{http::StatusCode, web, HttpResponse, ResponseError};
use domain_upload::exception::UploadException;
use serde::Serialize;

/// Envelope of every response body.
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub status: i32,
    pub message: String,
    pub content: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(content: T) -> Self {
        Self {
            status: 0,
            message: String::new(),
            content: Some(content),
        }
    }
}

pub type ApiResult<T> = Result<web::Json<ApiResponse<T>>, ApiError>;

pub fn respond<T>(content: T) -> ApiResult<T> {
    Ok(web::Json(ApiResponse::ok(content)))
}

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub UploadException);

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            UploadException::InvalidFragment { .. } => StatusCode::BAD_REQUEST,
            UploadException::SessionNotFound { .. } => StatusCode::NOT_FOUND,
            UploadException::UnmatchedHash { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            UploadException::Storage { .. }
            | UploadException::MissingFragment { .. }
            | UploadException::AssemblyWrite { .. }
            | UploadException::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ApiResponse::<()> {
            status: self.0.status(),
            message: self.0.to_string(),
            content: None,
        })
    }
}
