use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{0}")]
    InvalidCredentials(String),

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid response from identity provider: {0}")]
    MalformedResponse(String),

    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),

    #[error("Session storage error: {0}")]
    Storage(String),

    #[error("Not supported by this identity provider: {0}")]
    Unsupported(&'static str),

    #[error("Not signed in")]
    NotSignedIn,
}

impl AuthError {
    /// Message suitable for showing on a login form.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::InvalidCredentials(msg) => msg.clone(),
            AuthError::Transport(e) if e.is_timeout() => {
                "The server took too long to respond".to_string()
            }
            AuthError::Transport(_) => "Could not reach the server".to_string(),
            other => other.to_string(),
        }
    }
}
