use solve_core::SolveError;

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error(transparent)]
    Core(#[from] SolveError),

    #[error("Not a problem URL: {0}")]
    NotAProblemUrl(String),

    #[error("No stored record for {0}")]
    NoRecord(String),

    #[error("No timer stored for {0}")]
    NoTimer(String),

    #[error("Failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
}
