use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("scenario not found: {0}")]
    ScenarioNotFound(uuid::Uuid),

    #[error("scene not found: {0}")]
    SceneNotFound(uuid::Uuid),

    #[error("persona not found: {0}")]
    PersonaNotFound(String),

    #[error("user progress not found: {0}")]
    ProgressNotFound(uuid::Uuid),

    #[error("scenario {0} has no scenes")]
    SceneHasNoScenes(uuid::Uuid),

    #[error("user progress {0} is already completed")]
    ProgressCompleted(uuid::Uuid),

    #[error("user id is required")]
    MissingUser,

    #[error("caller does not own this resource")]
    NotOwner,

    #[error("a turn is already in progress for this user progress")]
    Busy,

    #[error("llm call failed: {0}")]
    Llm(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP status code this error maps to, per the error taxonomy table.
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::ScenarioNotFound(_)
            | Error::SceneNotFound(_)
            | Error::PersonaNotFound(_)
            | Error::ProgressNotFound(_) => StatusCode::NOT_FOUND,
            Error::SceneHasNoScenes(_)
            | Error::ProgressCompleted(_)
            | Error::MissingUser
            | Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotOwner => StatusCode::FORBIDDEN,
            Error::Busy => StatusCode::CONFLICT,
            Error::Llm(_) | Error::Io(_) | Error::Json(_) | Error::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
