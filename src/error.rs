use thiserror::Error;

/// Request-level failures, classified by how they surface to the user.
///
/// Authentication and validation errors are terminal for the request.
/// Upstream failures on required paths abort the command with a generic
/// user-facing message; the detail stays in the server log.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request authentication failed")]
    Authentication,

    #[error("invalid {field}")]
    Validation { field: &'static str },

    #[error("upstream service unavailable")]
    UpstreamUnavailable,

    #[error("unknown command: {0}")]
    UnknownCommand(String),
}

impl GatewayError {
    /// Text safe to show the requester. Never includes upstream error
    /// payloads, secrets, or stack traces.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Authentication => "Unauthorized".to_string(),
            GatewayError::Validation { field } => {
                format!("Invalid {field}. Please check your input and try again.")
            }
            GatewayError::UpstreamUnavailable => {
                "Something went wrong talking to RewardStation. Please try again.".to_string()
            }
            GatewayError::UnknownCommand(verb) => format!(
                "Unknown command: `{verb}`\n\nValid commands: `/help`, `/thanks`, `/give`, `/balance`"
            ),
        }
    }
}
