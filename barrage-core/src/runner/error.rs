pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("`vus` must be a positive integer")]
    InvalidVus,

    #[error("`duration` must be a positive duration")]
    InvalidDuration,

    #[error("`duration` is required when no `stages` are given")]
    MissingDuration,

    #[error("`stages` must be a non-empty array of {{ duration, target }} with positive durations")]
    InvalidStages,

    #[error("`tick` must be a positive duration")]
    InvalidTick,

    #[error("unknown metric `{0}` in thresholds")]
    UnknownMetric(String),

    #[error("invalid threshold `{expression}` on `{metric}`: {reason}")]
    InvalidThreshold {
        metric: String,
        expression: String,
        reason: String,
    },

    #[error("invalid check `{name}`: {reason}")]
    InvalidCheck { name: String, reason: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    /// Errors caused by the run configuration rather than by running it.
    pub fn is_config(&self) -> bool {
        !matches!(self, Error::Join(_))
    }
}
