use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

pub type AppResult<T> = Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Missing URL parameter")]
    MissingUrl,

    #[error("Invalid URL parameter")]
    InvalidUrl,

    #[error("URL not allowed")]
    UrlNotAllowed,

    // the origin couldn't be reached or the body broke halfway, a reachable origin that answers
    // with an error status is forwarded as is and never ends up here
    #[error("Error fetching stream: {0}")]
    Upstream(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("internal server error: {0}")]
    InternalServerErrorWithContext(String),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingUrl | Self::InvalidUrl => StatusCode::BAD_REQUEST,
            Self::UrlNotAllowed => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_) | Self::InternalServerErrorWithContext(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if let Self::InternalServerErrorWithContext(ref context) = self {
            error!("internal server error: {}", context);
        }

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}
