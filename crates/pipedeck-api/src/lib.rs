// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use pipedeck_app::{FetchKey, OptionItem, PlotLink, SubmissionPayload};
use reqwest::blocking::{Client as HttpClient, Response};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

pub const CLIENTS_PATH: &str = "/get_client_data";
pub const VESSELS_PATH: &str = "/get_vessel_data";
pub const PARAMETERS_PATH: &str = "/get_parameters";
pub const SUBMIT_PATH: &str = "/pipelineuiview/submit";

const ERROR_BODY_LIMIT: usize = 200;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("cannot reach {url} ({source}); check [server].base_url and that the server is running")]
    Connect {
        url: String,
        source: reqwest::Error,
    },
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("decode response from {url}: {source}")]
    Decode {
        url: String,
        source: serde_json::Error,
    },
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        source: reqwest::Error,
    },
    #[error("invalid endpoint url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
}

impl FetchError {
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Blocking client for the option endpoints and the submit endpoint.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    timeout: Duration,
    http: HttpClient,
}

impl Client {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            bail!("server.base_url must not be empty");
        }
        Url::parse(&base_url)
            .with_context(|| format!("server.base_url {base_url:?} is not a valid URL"))?;
        if timeout.is_zero() {
            bail!("server.timeout must be positive");
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            timeout,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn endpoint(&self, key: &FetchKey) -> Result<Url, FetchError> {
        let (path, query): (&str, Vec<(&str, &str)>) = match key {
            FetchKey::Clients => (CLIENTS_PATH, Vec::new()),
            FetchKey::Vessels { client } => (VESSELS_PATH, vec![("client", client.as_str())]),
            FetchKey::Parameters { client, vessel } => (
                PARAMETERS_PATH,
                vec![("client", client.as_str()), ("vessel", vessel.as_str())],
            ),
        };

        let mut url = self.url_for(path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    pub fn fetch(&self, key: &FetchKey) -> Result<Vec<OptionItem>, FetchError> {
        let url = self.endpoint(key)?;
        debug!(%url, "fetching options");
        let response = self
            .http
            .get(url.clone())
            .send()
            .map_err(|error| self.transport_error(&url, error))?;
        let body = self.success_body(&url, response)?;
        serde_json::from_str(&body).map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })
    }

    pub fn submit(&self, payload: &SubmissionPayload) -> Result<(), FetchError> {
        let url = self.url_for(SUBMIT_PATH)?;
        let response = self
            .http
            .post(url.clone())
            .json(payload)
            .send()
            .map_err(|error| self.transport_error(&url, error))?;
        self.success_body(&url, response)?;
        Ok(())
    }

    pub fn plot_url(&self, link: &PlotLink) -> String {
        link.url(&self.base_url)
    }

    fn url_for(&self, path: &str) -> Result<Url, FetchError> {
        let raw = format!("{}{path}", self.base_url);
        Url::parse(&raw).map_err(|source| FetchError::InvalidUrl { url: raw, source })
    }

    fn success_body(&self, url: &Url, response: Response) -> Result<String, FetchError> {
        let status = response.status();
        let body = response
            .text()
            .map_err(|error| self.transport_error(url, error))?;
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: clip_body(&body),
            });
        }
        Ok(body)
    }

    fn transport_error(&self, url: &Url, error: reqwest::Error) -> FetchError {
        let url = url.to_string();
        if error.is_timeout() {
            FetchError::Timeout {
                url,
                timeout: self.timeout,
            }
        } else if error.is_connect() {
            FetchError::Connect { url, source: error }
        } else {
            FetchError::Request { url, source: error }
        }
    }
}

fn clip_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= ERROR_BODY_LIMIT {
        return trimmed.to_owned();
    }
    let mut clipped: String = trimmed.chars().take(ERROR_BODY_LIMIT).collect();
    clipped.push('…');
    clipped
}
