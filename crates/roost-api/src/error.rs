use roost_core::{CoreError, LinkError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[cfg(feature = "client")]
    #[error("http client: {0}")]
    Client(#[from] reqwest::Error),
}

#[cfg(feature = "http")]
mod response {
    use axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    };
    use roost_core::CoreError;
    use serde::Serialize;

    use super::ApiError;

    #[derive(Serialize)]
    struct ErrorBody {
        error: String,
    }

    impl ApiError {
        pub fn status(&self) -> StatusCode {
            match self {
                ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                ApiError::NotFound(_) => StatusCode::NOT_FOUND,
                ApiError::Unauthorized(_) => StatusCode::FORBIDDEN,
                ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::Core(e) => match e {
                    CoreError::Unauthorized(_) => StatusCode::FORBIDDEN,
                    CoreError::TaskNotFound(_) | CoreError::SpawnerNotFound(_) => {
                        StatusCode::NOT_FOUND
                    }
                    CoreError::DuplicateRequest(_)
                    | CoreError::AlreadyFinalized(_)
                    | CoreError::NotFinalized(_)
                    | CoreError::InvalidState(_) => StatusCode::CONFLICT,
                    CoreError::NoCapacity(_) => StatusCode::SERVICE_UNAVAILABLE,
                    CoreError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
                    CoreError::Link(_) => StatusCode::BAD_GATEWAY,
                },
                ApiError::Link(_) => StatusCode::BAD_GATEWAY,
                #[cfg(feature = "client")]
                ApiError::Client(_) => StatusCode::BAD_GATEWAY,
            }
        }
    }

    impl IntoResponse for ApiError {
        fn into_response(self) -> Response {
            let status = self.status();
            if status.is_server_error() {
                tracing::warn!(target: "roost.api", status = status.as_u16(), error = %self, "request failed");
            }
            (
                status,
                Json(ErrorBody {
                    error: self.to_string(),
                }),
            )
                .into_response()
        }
    }
}

#[cfg(all(test, feature = "http"))]
mod tests {
    use axum::http::StatusCode;
    use roost_model::SpawnTaskId;

    use super::*;

    #[test]
    fn core_errors_map_to_status_codes() {
        let cases = [
            (CoreError::Unauthorized("x".into()), StatusCode::FORBIDDEN),
            (CoreError::TaskNotFound(SpawnTaskId(1)), StatusCode::NOT_FOUND),
            (CoreError::DuplicateRequest("x".into()), StatusCode::CONFLICT),
            (CoreError::NotFinalized(SpawnTaskId(1)), StatusCode::CONFLICT),
            (CoreError::NoCapacity("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (
                CoreError::Link(LinkError::Unreachable("x".into())),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
        assert_eq!(
            ApiError::InvalidRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
