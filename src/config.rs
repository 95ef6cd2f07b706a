//! Client configuration for the Azure OpenAI chat-completions endpoint
//!
//! Deployment name and api-version are held once; the request URL is
//! always derived from them by `completions_url`.

use std::fmt;
use log::{debug, error, trace};
use reqwest::Url;

use crate::error::Error;

/// Environment variable holding the secret key
pub const API_KEY_VAR: &str = "AZURE_OPENAI_API_KEY";
/// Environment variable holding the resource or full deployment URL
pub const ENDPOINT_VAR: &str = "AZURE_OPENAI_ENDPOINT";
/// Environment variable naming the deployment
pub const DEPLOYMENT_VAR: &str = "AZURE_OPENAI_DEPLOYMENT";
/// Environment variable holding the api-version
pub const API_VERSION_VAR: &str = "OPENAI_API_VERSION";

pub const DEFAULT_ENDPOINT: &str
  = "https://psacodesprint2025.azure-api.net";
pub const DEFAULT_DEPLOYMENT: &str = "gpt-4.1-nano";
pub const DEFAULT_API_VERSION: &str = "2025-01-01-preview";

const API_VERSION_PARAM: &str = "api-version";

// ===== ApiKey =====

/// Secret credential; never printed by Debug or Display
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey
{   pub fn new(key: impl Into<String>) -> Result<Self, Error>
    {   let key = key.into();
        let key = key.trim();
        if key.is_empty()
        {   error!("Empty API key");
            return Err(Error::MissingApiKey(API_KEY_VAR.to_string()));
        }
        Ok(ApiKey(key.to_string()))
    }

    /// Raw key, for the request header only
    pub fn expose(&self) -> &str
    {   &self.0
    }
}

impl fmt::Debug for ApiKey
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   f.write_str("ApiKey(***)")
    }
}

impl fmt::Display for ApiKey
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   f.write_str("***")
    }
}

// ===== Endpoint parsing =====

/// Pieces recovered from an endpoint string
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEndpoint
{   /// Resource base URL without the `/openai/...` path; keeps every
    /// query pair except `api-version`
    pub base: Url
  , /// Deployment named by a `/deployments/{name}` segment
    pub deployment: Option<String>
  , /// Value of the `api-version` query parameter
    pub api_version: Option<String>
}

/// Split an endpoint into base URL, deployment and api-version.
///
/// Accepts either a resource URL (`https://host`) or a full deployment
/// URL (`https://host/openai/deployments/{name}/chat/completions?api-version=v`).
pub fn parse_endpoint(raw: &str) -> Result<ParsedEndpoint, Error>
{   trace!("Parsing endpoint: {}", raw);
    let url = Url::parse(raw.trim()).map_err(|e| {
      error!("Bad endpoint URL {:?}: {}", raw, e);
      Error::InvalidConfiguration(
        format!("endpoint {:?} is not a URL: {}", raw, e)
      )
    })?;

    if url.cannot_be_a_base()
      || !matches!(url.scheme(), "http" | "https")
    {   error!("Unsupported endpoint URL: {}", raw);
        return Err(Error::InvalidConfiguration(
          format!("endpoint {:?} must be an http(s) URL", raw)
        ));
    }

    let segments: Vec<String> = url.path_segments()
      .map(|s| s.filter(|seg| !seg.is_empty())
        .map(String::from)
        .collect())
      .unwrap_or_default();

    let api_version = url.query_pairs()
      .find(|(k, _)| k == API_VERSION_PARAM)
      .map(|(_, v)| v.into_owned())
      .filter(|v| !v.is_empty());
    // Gateway hosts may need e.g. a subscription-key pair
    let extra_query: Vec<(String, String)> = url.query_pairs()
      .filter(|(k, _)| k != API_VERSION_PARAM)
      .map(|(k, v)| (k.into_owned(), v.into_owned()))
      .collect();

    let (mut prefix, deployment)
      = match segments.iter().position(|s| s == "deployments")
      {   Some(i) => {
            let name = segments.get(i + 1).ok_or_else(|| {
              Error::InvalidConfiguration(
                format!("endpoint {:?} names no deployment", raw)
              )
            })?;
            (segments[..i].to_vec(), Some(name.clone()))
          }
        , None => (segments, None)
      };

    if prefix.last().map(|s| s == "openai").unwrap_or(false)
    {   prefix.pop();
    }

    let mut base = url.clone();
    base.set_query(None);
    base.set_fragment(None);
    base.set_path(&prefix.join("/"));
    if !extra_query.is_empty()
    {   base.query_pairs_mut().extend_pairs(extra_query.iter());
    }

    debug!(
      "Endpoint base: {}, deployment: {:?}, api-version: {:?}",
      base, deployment, api_version
    );
    Ok(ParsedEndpoint { base, deployment, api_version })
}

/// Pick one value for a field that may appear both in the endpoint URL
/// and as an explicit setting. Both present and different is an error.
fn reconcile(
  field: &str
, embedded: Option<String>
, explicit: Option<String>
, default: &str
) -> Result<String, Error>
{   match (embedded, explicit)
    {   (Some(a), Some(b)) if a != b => {
          error!("{} conflict: endpoint {:?}, configured {:?}", field, a, b);
          Err(Error::InvalidConfiguration(
            format!(
              "{} {:?} in endpoint URL conflicts with configured {:?}",
              field, a, b
            )
          ))
        }
      , (Some(v), _) | (None, Some(v)) => Ok(v)
      , (None, None) => {
          debug!("Using default {}: {}", field, default);
          Ok(default.to_string())
        }
    }
}

// ===== ClientConfig =====

/// Everything needed to reach one deployment
#[derive(Debug, Clone)]
pub struct ClientConfig
{   endpoint: Url
  , deployment: String
  , api_version: String
  , api_key: ApiKey
}

impl ClientConfig
{   /// Build from an endpoint string and key, defaulting anything the
    /// endpoint does not name
    pub fn new(
      endpoint: &str
    , api_key: impl Into<String>
    ) -> Result<Self, Error>
    {   ClientConfig::resolve(endpoint, None, None, api_key)
    }

    /// Build with explicit deployment and api-version; these must agree
    /// with anything embedded in `endpoint`
    pub fn resolve(
      endpoint: &str
    , deployment: Option<String>
    , api_version: Option<String>
    , api_key: impl Into<String>
    ) -> Result<Self, Error>
    {   let api_key = ApiKey::new(api_key)?;
        let parsed = parse_endpoint(endpoint)?;
        let deployment = reconcile(
          "deployment", parsed.deployment, deployment, DEFAULT_DEPLOYMENT
        )?;
        let api_version = reconcile(
          "api-version", parsed.api_version, api_version,
          DEFAULT_API_VERSION
        )?;
        Ok(ClientConfig
        {   endpoint: parsed.base
          , deployment
          , api_version
          , api_key
        })
    }

    /// Build from a variable lookup; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where F: Fn(&str) -> Option<String>
    {   let get = |name: &str| {
          lookup(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
        };

        let api_key = get(API_KEY_VAR).ok_or_else(|| {
          error!("{} is not set", API_KEY_VAR);
          Error::MissingApiKey(API_KEY_VAR.to_string())
        })?;
        let endpoint = get(ENDPOINT_VAR)
          .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        ClientConfig::resolve(
          &endpoint
        , get(DEPLOYMENT_VAR)
        , get(API_VERSION_VAR)
        , api_key
        )
    }

    /// Build from the process environment
    pub fn from_env() -> Result<Self, Error>
    {   debug!("Loading client configuration from environment");
        ClientConfig::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn endpoint(&self) -> &Url
    {   &self.endpoint
    }

    pub fn deployment(&self) -> &str
    {   &self.deployment
    }

    pub fn api_version(&self) -> &str
    {   &self.api_version
    }

    pub fn api_key(&self) -> &ApiKey
    {   &self.api_key
    }

    /// `{endpoint}/openai/deployments/{deployment}/chat/completions?api-version={v}`,
    /// after any query pairs the endpoint carried
    pub fn completions_url(&self) -> Result<Url, Error>
    {   let mut url = self.endpoint.clone();
        url.path_segments_mut()
          .map_err(|_| {
            Error::InvalidConfiguration(
              format!("endpoint {} cannot take a path", self.endpoint)
            )
          })?
          .pop_if_empty()
          .extend([
            "openai"
          , "deployments"
          , self.deployment.as_str()
          , "chat"
          , "completions"
          ]);
        url.query_pairs_mut()
          .append_pair(API_VERSION_PARAM, &self.api_version);
        Ok(url)
    }
}
