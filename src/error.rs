use thiserror::Error;

/// Failure to hand a rendered report to the email provider.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("email request failed: {0}")]
    Transport(#[from] reqwest_middleware::Error),
    #[error("email provider rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("email provider response had no delivery id: {0}")]
    MalformedResponse(String),
}

/// Reasons the scorecard page is refused. Each has its own message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessDenied {
    #[error("Access link not recognised. Please contact your safety representative for a new link.")]
    TokenNotFound,
    #[error("This access link has been deactivated. Please contact your safety representative.")]
    TokenInactive,
    #[error("Unable to load safety data right now: {0}")]
    DataLoad(String),
}
