//! Power BI REST access: client-credentials token, report and dataset
//! table lookup, report export with status polling.

use std::fmt;
use std::time::Duration;
use log::{debug, trace, error, info, warn};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{status_error, Error};

pub const TENANT_ID_VAR: &str = "TENANT_ID";
pub const CLIENT_ID_VAR: &str = "CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "CLIENT_SECRET";
pub const WORKSPACE_ID_VAR: &str = "WORKSPACE_ID";
pub const REPORT_ID_VAR: &str = "REPORT_ID";

pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
pub const DEFAULT_API_BASE: &str = "https://api.powerbi.com/v1.0/myorg";
pub const POWERBI_SCOPE: &str
  = "https://analysis.windows.net/powerbi/api/.default";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

// ===== Wire types =====

#[derive(Debug, Clone, Deserialize)]
struct TokenResponse
{   access_token: String
  , #[serde(default)]
    expires_in: Option<u64>
}

/// Error body of the token endpoint
#[derive(Debug, Clone, Deserialize)]
struct TokenErrorResponse
{   error: String
  , #[serde(default)]
    error_description: Option<String>
}

/// Bearer token for the Power BI API; never printed
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken
{   pub fn new(token: impl Into<String>) -> Self
    {   AccessToken(token.into())
    }

    pub fn expose(&self) -> &str
    {   &self.0
    }
}

impl fmt::Debug for AccessToken
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   f.write_str("AccessToken(***)")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report
{   pub id: String
  , #[serde(default)]
    pub name: Option<String>
  , pub dataset_id: String
  , #[serde(default)]
    pub web_url: Option<String>
  , #[serde(default)]
    pub embed_url: Option<String>
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column
{   pub name: String
  , #[serde(default, rename = "dataType")]
    pub data_type: Option<String>
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table
{   pub name: String
  , #[serde(default)]
    pub columns: Vec<Column>
}

#[derive(Debug, Clone, Deserialize)]
struct TablesResponse
{   value: Vec<Table>
}

/// File formats the export job can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExportFormat
{   Pdf
  , Pptx
  , Png
}

impl ExportFormat
{   pub fn extension(&self) -> &'static str
    {   match self
        {   ExportFormat::Pdf => "pdf"
          , ExportFormat::Pptx => "pptx"
          , ExportFormat::Png => "png"
        }
    }
}

impl std::str::FromStr for ExportFormat
{   type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {   match s.to_ascii_lowercase().as_str()
        {   "pdf" => Ok(ExportFormat::Pdf)
          , "pptx" => Ok(ExportFormat::Pptx)
          , "png" => Ok(ExportFormat::Png)
          , other => Err(Error::InvalidConfiguration(
              format!("unknown export format {:?}", other)
            ))
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ExportRequest
{   format: ExportFormat
}

/// State of an export job as reported by the service
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum ExportStatus
{   NotStarted
  , Running
  , Succeeded
  , Failed
  , #[serde(other)]
    Unknown
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportJob
{   pub id: String
  , #[serde(default = "unknown_status")]
    pub status: ExportStatus
  , #[serde(default)]
    pub percent_complete: Option<u32>
}

fn unknown_status() -> ExportStatus
{   ExportStatus::Unknown
}

// ===== PowerBiConfig =====

#[derive(Debug, Clone)]
pub struct PowerBiConfig
{   tenant_id: String
  , client_id: String
  , client_secret: crate::config::ApiKey
  , workspace_id: String
  , report_id: Option<String>
  , authority: Url
  , api_base: Url
  , poll_interval: Duration
  , max_polls: Option<u32>
}

fn parse_base(
  what: &str
, raw: &str
) -> Result<Url, Error>
{   let url = Url::parse(raw.trim()).map_err(|e| {
      error!("Bad {} URL {:?}: {}", what, raw, e);
      Error::InvalidConfiguration(
        format!("{} {:?} is not a URL: {}", what, raw, e)
      )
    })?;
    if url.cannot_be_a_base()
    {   return Err(Error::InvalidConfiguration(
          format!("{} {:?} cannot take a path", what, raw)
        ));
    }
    Ok(url)
}

fn require(
  name: &str
, value: impl Into<String>
) -> Result<String, Error>
{   let value = value.into().trim().to_string();
    if value.is_empty()
    {   error!("{} is empty", name);
        return Err(Error::InvalidConfiguration(
          format!("{} must not be empty", name)
        ));
    }
    Ok(value)
}

impl PowerBiConfig
{   pub fn new(
      tenant_id: impl Into<String>
    , client_id: impl Into<String>
    , client_secret: impl Into<String>
    , workspace_id: impl Into<String>
    ) -> Result<Self, Error>
    {   let client_secret = crate::config::ApiKey::new(client_secret)
          .map_err(|_| Error::MissingApiKey(CLIENT_SECRET_VAR.to_string()))?;
        Ok(PowerBiConfig
        {   tenant_id: require(TENANT_ID_VAR, tenant_id)?
          , client_id: require(CLIENT_ID_VAR, client_id)?
          , client_secret
          , workspace_id: require(WORKSPACE_ID_VAR, workspace_id)?
          , report_id: None
          , authority: parse_base("authority", DEFAULT_AUTHORITY)?
          , api_base: parse_base("api base", DEFAULT_API_BASE)?
          , poll_interval: DEFAULT_POLL_INTERVAL
          , max_polls: None
        })
    }

    /// Build from `TENANT_ID`, `CLIENT_ID`, `CLIENT_SECRET`,
    /// `WORKSPACE_ID` and optional `REPORT_ID`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where F: Fn(&str) -> Option<String>
    {   let get = |name: &str| {
          lookup(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
        };
        let need = |name: &str| {
          get(name).ok_or_else(|| {
            error!("{} is not set", name);
            if name == CLIENT_SECRET_VAR
            {   Error::MissingApiKey(name.to_string())
            } else
            {   Error::InvalidConfiguration(format!("{} is not set", name))
            }
          })
        };

        let config = PowerBiConfig::new(
          need(TENANT_ID_VAR)?
        , need(CLIENT_ID_VAR)?
        , need(CLIENT_SECRET_VAR)?
        , need(WORKSPACE_ID_VAR)?
        )?;
        Ok(match get(REPORT_ID_VAR)
        {   Some(id) => config.with_report_id(id)
          , None => config
        })
    }

    pub fn from_env() -> Result<Self, Error>
    {   debug!("Loading Power BI configuration from environment");
        PowerBiConfig::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn with_report_id(mut self, report_id: impl Into<String>) -> Self
    {   self.report_id = Some(report_id.into());
        self
    }

    /// Token authority, `https://login.microsoftonline.com` by default
    pub fn with_authority(mut self, raw: &str) -> Result<Self, Error>
    {   self.authority = parse_base("authority", raw)?;
        Ok(self)
    }

    /// REST root, `https://api.powerbi.com/v1.0/myorg` by default
    pub fn with_api_base(mut self, raw: &str) -> Result<Self, Error>
    {   self.api_base = parse_base("api base", raw)?;
        Ok(self)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self
    {   self.poll_interval = interval;
        self
    }

    /// Give up on an export after this many status polls
    pub fn with_max_polls(mut self, max_polls: u32) -> Self
    {   self.max_polls = Some(max_polls);
        self
    }

    pub fn workspace_id(&self) -> &str
    {   &self.workspace_id
    }

    pub fn report_id(&self) -> Option<&str>
    {   self.report_id.as_deref()
    }

    /// `{authority}/{tenant}/oauth2/v2.0/token`
    pub fn token_url(&self) -> Result<Url, Error>
    {   extend_url(
          &self.authority
        , &[self.tenant_id.as_str(), "oauth2", "v2.0", "token"]
        )
    }

    /// `{api_base}/groups/{workspace}/...`
    pub fn workspace_url(&self, rest: &[&str]) -> Result<Url, Error>
    {   let mut segments = vec!["groups", self.workspace_id.as_str()];
        segments.extend_from_slice(rest);
        extend_url(&self.api_base, &segments)
    }
}

fn extend_url(
  base: &Url
, segments: &[&str]
) -> Result<Url, Error>
{   let mut url = base.clone();
    url.path_segments_mut()
      .map_err(|_| {
        Error::InvalidConfiguration(format!("{} cannot take a path", base))
      })?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
}

/// Provider message from an error body, or the raw text
fn message_from_body(body: &str) -> String
{   if let Ok(parsed) = serde_json::from_str::<TokenErrorResponse>(body)
    {   return match parsed.error_description
        {   Some(desc) => format!("{}: {}", parsed.error, desc)
          , None => parsed.error
        };
    }
    crate::request::ErrorResponse::message_from_body(body)
}

// ===== PowerBiClient =====

pub struct PowerBiClient
{   config: PowerBiConfig
  , http_client: reqwest::Client
}

impl PowerBiClient
{   pub fn new(config: PowerBiConfig) -> Self
    {   debug!(
          "Creating PowerBiClient for workspace {}",
          config.workspace_id
        );
        PowerBiClient
        {   config
          , http_client: reqwest::Client::new()
        }
    }

    pub fn config(&self) -> &PowerBiConfig
    {   &self.config
    }

    /// Client-credentials grant against the tenant's token endpoint
    pub async fn access_token(&self) -> Result<AccessToken, Error>
    {   let url = self.config.token_url()?;
        debug!("Requesting access token from {}", url);

        let params = [
          ("grant_type", "client_credentials")
        , ("client_id", self.config.client_id.as_str())
        , ("client_secret", self.config.client_secret.expose())
        , ("scope", POWERBI_SCOPE)
        ];

        let response = self.http_client
          .post(url)
          .form(&params)
          .send()
          .await
          .map_err(|e| {
            error!("Token HTTP error: {}", e);
            Error::HttpError(e.to_string())
          })?;

        let status = response.status();
        trace!("Token response status: {}", status);

        if !status.is_success()
        {   let error_text = response.text().await.unwrap_or_default();
            let message = message_from_body(&error_text);
            error!("Token request failed {}: {}", status, message);
            return Err(Error::TokenError(message));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
          error!("Token parse error: {}", e);
          Error::ParseError(e.to_string())
        })?;
        debug!("Access token acquired (expires_in: {:?})", token.expires_in);
        Ok(AccessToken::new(token.access_token))
    }

    async fn check(
      &self
    , response: reqwest::Response
    ) -> Result<reqwest::Response, Error>
    {   let status = response.status();
        trace!("Power BI response status: {}", status);
        if status.is_success()
        {   return Ok(response);
        }
        let error_text = response.text().await.unwrap_or_default();
        let message = message_from_body(&error_text);
        error!("Power BI error {}: {}", status, message);
        Err(status_error(status, message))
    }

    async fn get_json<T: DeserializeOwned>(
      &self
    , token: &AccessToken
    , url: Url
    ) -> Result<T, Error>
    {   debug!("GET {}", url);
        let response = self.http_client
          .get(url)
          .bearer_auth(token.expose())
          .send()
          .await
          .map_err(|e| {
            error!("HTTP error: {}", e);
            Error::HttpError(e.to_string())
          })?;
        self.check(response).await?
          .json()
          .await
          .map_err(|e| {
            error!("Parse error: {}", e);
            Error::ParseError(e.to_string())
          })
    }

    /// Report metadata, including the dataset behind it
    pub async fn get_report(
      &self
    , token: &AccessToken
    , report_id: &str
    ) -> Result<Report, Error>
    {   let url = self.config.workspace_url(&["reports", report_id])?;
        let report: Report = self.get_json(token, url).await?;
        debug!("Report {} uses dataset {}", report.id, report.dataset_id);
        Ok(report)
    }

    /// Tables of a dataset in the workspace
    pub async fn get_dataset_tables(
      &self
    , token: &AccessToken
    , dataset_id: &str
    ) -> Result<Vec<Table>, Error>
    {   let url = self.config
          .workspace_url(&["datasets", dataset_id, "tables"])?;
        let tables: TablesResponse = self.get_json(token, url).await?;
        debug!("Dataset {} has {} table(s)", dataset_id, tables.value.len());
        Ok(tables.value)
    }

    /// Start an export job for a report
    pub async fn start_export(
      &self
    , token: &AccessToken
    , report_id: &str
    , format: ExportFormat
    ) -> Result<ExportJob, Error>
    {   let url = self.config
          .workspace_url(&["reports", report_id, "ExportTo"])?;
        debug!("POST {} ({:?})", url, format);
        let response = self.http_client
          .post(url)
          .bearer_auth(token.expose())
          .json(&ExportRequest { format })
          .send()
          .await
          .map_err(|e| {
            error!("HTTP error: {}", e);
            Error::HttpError(e.to_string())
          })?;
        let job: ExportJob = self.check(response).await?
          .json()
          .await
          .map_err(|e| {
            error!("Parse error: {}", e);
            Error::ParseError(e.to_string())
          })?;
        info!("Export started: {}", job.id);
        Ok(job)
    }

    /// Poll the export job until it succeeds or fails
    pub async fn wait_for_export(
      &self
    , token: &AccessToken
    , report_id: &str
    , export_id: &str
    ) -> Result<ExportJob, Error>
    {   let mut polls: u32 = 0;
        loop
        {   let url = self.config.workspace_url(
              &["reports", report_id, "exports", export_id]
            )?;
            let job: ExportJob = self.get_json(token, url).await?;
            polls += 1;
            info!(
              "Export status: {:?} ({:?}%)",
              job.status, job.percent_complete
            );

            match job.status
            {   ExportStatus::Succeeded => return Ok(job)
              , ExportStatus::Failed => {
                  error!("Export {} failed", export_id);
                  return Err(Error::ExportFailed(export_id.to_string()));
                }
              , ExportStatus::Unknown => {
                  warn!("Unrecognised export status, polling again");
                }
              , _ => {}
            }

            if let Some(max) = self.config.max_polls
            {   if polls >= max
                {   error!("Export {} still pending after {} polls", export_id, polls);
                    return Err(Error::ExportTimedOut(polls));
                }
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Download the finished export's file
    pub async fn download_export(
      &self
    , token: &AccessToken
    , report_id: &str
    , export_id: &str
    ) -> Result<Vec<u8>, Error>
    {   let url = self.config.workspace_url(
          &["reports", report_id, "exports", export_id, "file"]
        )?;
        debug!("GET {}", url);
        let response = self.http_client
          .get(url)
          .bearer_auth(token.expose())
          .send()
          .await
          .map_err(|e| {
            error!("HTTP error: {}", e);
            Error::HttpError(e.to_string())
          })?;
        let bytes = self.check(response).await?
          .bytes()
          .await
          .map_err(|e| {
            error!("Download error: {}", e);
            Error::HttpError(e.to_string())
          })?;
        debug!("Downloaded {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }

    /// Start, await and download one export
    pub async fn export_report(
      &self
    , token: &AccessToken
    , report_id: &str
    , format: ExportFormat
    ) -> Result<Vec<u8>, Error>
    {   let job = self.start_export(token, report_id, format).await?;
        self.wait_for_export(token, report_id, &job.id).await?;
        self.download_export(token, report_id, &job.id).await
    }
}
