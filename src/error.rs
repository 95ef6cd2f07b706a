use std::fmt;

/// Custom error type for azchat operations
/// Implements Clone so callers can keep and compare results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error
{   /// API key is missing or empty
    MissingApiKey(String)
  , /// Endpoint, deployment or api-version could not be resolved
    InvalidConfiguration(String)
  , /// Transport-level HTTP failure
    HttpError(String)
  , /// Endpoint rejected the credential (401/403)
    AuthenticationFailed(String)
  , /// Rate limit exceeded (429)
    RateLimitExceeded
  , /// Any other non-success status
    ApiError
    {   status: u16
      , message: String
    }
  , /// Failed to parse API response
    ParseError(String)
  , /// No choices in API response
    NoChoicesInResponse
  , /// First choice carried a null message content
    NoContentInChoice
  , /// Token endpoint refused the client credentials
    TokenError(String)
  , /// Report export job ended in the Failed state
    ExportFailed(String)
  , /// Export job still running after the poll limit
    ExportTimedOut(u32)
  , /// Writing output failed
    Io(String)
}

impl fmt::Display for Error
{   fn fmt(&self, f: &mut fmt::Formatter<'_>)
      -> fmt::Result
    {   match self
        {   Error::MissingApiKey(var) => {
              write!(f, "Missing API key: set {}", var)
            }
          , Error::InvalidConfiguration(msg) => {
              write!(f, "Invalid configuration: {}", msg)
            }
          , Error::HttpError(msg) => {
              write!(f, "HTTP error: {}", msg)
            }
          , Error::AuthenticationFailed(msg) => {
              write!(f, "Authentication failed: {}", msg)
            }
          , Error::RateLimitExceeded => {
              write!(f, "API rate limit exceeded")
            }
          , Error::ApiError { status, message } => {
              write!(f, "API error ({}): {}", status, message)
            }
          , Error::ParseError(msg) => {
              write!(f, "Parse error: {}", msg)
            }
          , Error::NoChoicesInResponse => {
              write!(f, "API response contained no choices")
            }
          , Error::NoContentInChoice => {
              write!(f, "First choice has no message content")
            }
          , Error::TokenError(msg) => {
              write!(f, "Token request failed: {}", msg)
            }
          , Error::ExportFailed(msg) => {
              write!(f, "Export failed: {}", msg)
            }
          , Error::ExportTimedOut(polls) => {
              write!(f, "Export not finished after {} polls", polls)
            }
          , Error::Io(msg) => {
              write!(f, "I/O error: {}", msg)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error
{   fn from(e: std::io::Error) -> Self
    {   Error::Io(e.to_string())
    }
}

/// Map a non-success status and its extracted message onto an Error
pub fn status_error(
  status: reqwest::StatusCode
, message: String
) -> Error
{   match status
    {   reqwest::StatusCode::UNAUTHORIZED
      | reqwest::StatusCode::FORBIDDEN => {
          Error::AuthenticationFailed(message)
        }
      , reqwest::StatusCode::TOO_MANY_REQUESTS => Error::RateLimitExceeded
      , _ => Error::ApiError
        {   status: status.as_u16()
          , message
        }
    }
}
