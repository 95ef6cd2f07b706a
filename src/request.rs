//! Wire types for the chat-completions request and response

use serde::{Deserialize, Serialize};
use log::error;

use crate::error::Error;

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role
{   User
  , Assistant
  , System
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage
{   pub role: Role
  , /// Null when the service withholds content (e.g. content filter)
    pub content: Option<String>
}

impl ChatMessage
{   pub fn user(content: impl Into<String>) -> Self
    {   ChatMessage
        {   role: Role::User
          , content: Some(content.into())
        }
    }
}

/// Request body; `model` carries the deployment name
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest
{   pub model: String
  , pub messages: Vec<ChatMessage>
}

impl ChatRequest
{   /// Single-turn conversation with one user message
    pub fn single_turn(
      deployment: &str
    , prompt: &str
    ) -> Self
    {   ChatRequest
        {   model: deployment.to_string()
          , messages: vec![ChatMessage::user(prompt)]
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse
{   #[serde(default)]
    pub id: Option<String>
  , #[serde(default)]
    pub model: Option<String>
  , pub choices: Vec<Choice>
  , #[serde(default)]
    pub usage: Option<Usage>
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice
{   pub message: ChatMessage
  , #[serde(default)]
    pub finish_reason: Option<String>
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct Usage
{   pub prompt_tokens: u32
  , pub completion_tokens: u32
  , pub total_tokens: u32
}

impl ChatResponse
{   /// `choices[0].message.content`
    pub fn first_content(&self) -> Result<&str, Error>
    {   let choice = self.choices.first().ok_or_else(|| {
          error!("No choices in response");
          Error::NoChoicesInResponse
        })?;
        choice.message.content.as_deref().ok_or_else(|| {
          error!(
            "First choice has null content (finish_reason: {:?})",
            choice.finish_reason
          );
          Error::NoContentInChoice
        })
    }
}

/// Error body returned on non-success statuses
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse
{   pub error: ErrorDetail
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail
{   #[serde(default)]
    pub code: Option<String>
  , pub message: String
}

impl ErrorResponse
{   /// Provider message if the body is a recognised error object,
    /// otherwise the raw text
    pub fn message_from_body(body: &str) -> String
    {   match serde_json::from_str::<ErrorResponse>(body)
        {   Ok(parsed) => match parsed.error.code
            {   Some(code) => format!("{} ({})", parsed.error.message, code)
              , None => parsed.error.message
            }
          , Err(_) if body.trim().is_empty() => "Unknown error".to_string()
          , Err(_) => body.to_string()
        }
    }
}
