//! Sentry DSN parsing
//!
//! `https://<public_key>[:<secret>]@<host>[:<port>][/<path>]/<project_id>`

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::SentryError;

/// Parsed Data Source Name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
    public_key: String,
    secret_key: Option<String>,
    project_id: String,
    store_url: Url,
}

impl Dsn {
    pub fn parse(raw: &str) -> Result<Self, SentryError> {
        let url = Url::parse(raw.trim()).map_err(|e| SentryError::InvalidDsn(e.to_string()))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SentryError::InvalidDsn(format!(
                "unsupported scheme {:?}",
                url.scheme()
            )));
        }
        let host = url
            .host_str()
            .ok_or_else(|| SentryError::InvalidDsn("missing host".to_string()))?;
        if url.username().is_empty() {
            return Err(SentryError::InvalidDsn("missing public key".to_string()));
        }

        let path = url.path().trim_end_matches('/');
        let (prefix, project_id) = path.rsplit_once('/').unwrap_or(("", path));
        if project_id.is_empty() {
            return Err(SentryError::InvalidDsn("missing project id".to_string()));
        }

        let mut base = format!("{}://{}", url.scheme(), host);
        if let Some(port) = url.port() {
            base.push_str(&format!(":{}", port));
        }
        let store_url = Url::parse(&format!(
            "{}{}/api/{}/store/",
            base, prefix, project_id
        ))
        .map_err(|e| SentryError::InvalidDsn(e.to_string()))?;

        Ok(Self {
            public_key: url.username().to_string(),
            secret_key: url.password().map(str::to_string),
            project_id: project_id.to_string(),
            store_url,
        })
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Endpoint events are POSTed to
    pub fn store_url(&self) -> &Url {
        &self.store_url
    }

    /// Value of the `X-Sentry-Auth` header
    pub fn auth_header(&self, client: &str) -> String {
        let mut header = format!(
            "Sentry sentry_version=7, sentry_client={}, sentry_key={}",
            client, self.public_key
        );
        if let Some(secret) = &self.secret_key {
            header.push_str(&format!(", sentry_secret={}", secret));
        }
        header
    }
}

impl FromStr for Dsn {
    type Err = SentryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Dsn {
    // Never print the key
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (project {})", self.store_url, self.project_id)
    }
}
