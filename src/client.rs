use log::{debug, trace, error, info, warn};

use crate::config::ClientConfig;
use crate::error::{status_error, Error};
use crate::request::{ChatRequest, ChatResponse, ErrorResponse};

/// Header Azure OpenAI reads the key from
const API_KEY_HEADER: &str = "api-key";

/// Client bound to one Azure OpenAI deployment
pub struct AzureChatClient
{   config: ClientConfig
  , http_client: reqwest::Client
}

impl AzureChatClient
{   pub fn new(config: ClientConfig) -> Self
    {   debug!(
          "Creating AzureChatClient for deployment {} (api-version {})",
          config.deployment(), config.api_version()
        );
        AzureChatClient
        {   config
          , http_client: reqwest::Client::new()
        }
    }

    pub fn config(&self) -> &ClientConfig
    {   &self.config
    }

    /// POST one single-turn conversation and return the parsed response
    pub async fn send(
      &self
    , prompt: &str
    ) -> Result<ChatResponse, Error>
    {   if prompt.is_empty()
        {   warn!("Sending empty prompt");
        }

        let url = self.config.completions_url()?;
        let request = ChatRequest::single_turn(
          self.config.deployment(), prompt
        );

        debug!("POST {}", url);
        trace!("Chat request: {:?}", request);

        let response = self.http_client
          .post(url)
          .header(API_KEY_HEADER, self.config.api_key().expose())
          .json(&request)
          .send()
          .await
          .map_err(|e| {
            error!("HTTP error: {}", e);
            Error::HttpError(e.to_string())
          })?;

        let status = response.status();
        trace!("Chat response status: {}", status);

        if !status.is_success()
        {   let error_text = response.text().await
              .unwrap_or_default();
            let message = ErrorResponse::message_from_body(&error_text);
            error!("API error {}: {}", status, message);
            return Err(status_error(status, message));
        }

        let chat_response: ChatResponse
          = response.json().await.map_err(|e| {
            error!("Parse error: {}", e);
            Error::ParseError(e.to_string())
          })?;

        if let Some(usage) = chat_response.usage
        {   info!(
              "Completion {:?} used {} tokens ({} prompt, {} completion)",
              chat_response.id, usage.total_tokens,
              usage.prompt_tokens, usage.completion_tokens
            );
        }
        debug!(
          "Received {} choice(s) from model {:?}",
          chat_response.choices.len(), chat_response.model
        );

        Ok(chat_response)
    }

    /// Send `prompt` and return `choices[0].message.content`
    pub async fn complete(
      &self
    , prompt: &str
    ) -> Result<String, Error>
    {   let response = self.send(prompt).await?;
        response.first_content().map(str::to_string)
    }
}
