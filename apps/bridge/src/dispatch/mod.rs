pub mod slack;
pub mod teams;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    ConfigurationMissing(String),
    #[error(transparent)]
    Upstream(#[from] gsm_core::HttpError),
}
