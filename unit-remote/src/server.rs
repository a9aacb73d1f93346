use std::{sync::RwLock, time::Duration};

use log::debug;
use serde::Serialize;

use unit_logic::{RemoteSync, UnitLocationReport, UnitStatusReport, prelude::*};

use crate::wire::{SaveUnitLocationInput, SaveUnitStatusInput};

const fn server_host() -> &'static str {
    if let Some(host) = option_env!("DISPATCH_API_HOST") {
        host
    } else {
        "localhost"
    }
}

const fn server_port() -> u16 {
    if let Some(port) = option_env!("DISPATCH_API_PORT") {
        const_str::parse!(port, u16)
    } else {
        5000
    }
}

const fn server_secure() -> bool {
    if let Some(secure) = option_env!("DISPATCH_API_SECURE") {
        const_str::eq_ignore_ascii_case!(secure, "true") || const_str::equal!(secure, "1")
    } else {
        false
    }
}

const fn server_http_proto() -> &'static str {
    if server_secure() { "https" } else { "http" }
}

const SERVER_HOST: &str = server_host();
const SERVER_PORT: u16 = server_port();
const SERVER_HTTP_PROTO: &str = server_http_proto();

const SERVER_SOCKET: &str = const_str::concat!(SERVER_HOST, ":", SERVER_PORT);

pub const API_BASE_URL: &str = const_str::concat!(SERVER_HTTP_PROTO, "://", SERVER_SOCKET, "/api/v4");

const SAVE_UNIT_LOCATION: &str = "UnitLocation/SetUnitLocation";
const SAVE_UNIT_STATUS: &str = "UnitStatus/SaveUnitStatus";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn endpoint_url(base: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

/// [RemoteSync] over the dispatch REST API
pub struct HttpRemoteSync {
    client: reqwest::Client,
    base_url: String,
    access_token: RwLock<Option<String>>,
}

impl HttpRemoteSync {
    pub fn new() -> Result<Self> {
        Self::with_base_url(API_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            access_token: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Set (or clear) the bearer token sent with every request
    pub fn set_access_token(&self, token: Option<String>) {
        if let Ok(mut current) = self.access_token.write() {
            *current = token;
        }
    }

    fn access_token(&self) -> Option<String> {
        self.access_token.read().ok().and_then(|t| t.clone())
    }

    async fn post<T: Serialize>(&self, endpoint: &str, body: &T) -> Result {
        let url = endpoint_url(&self.base_url, endpoint);

        debug!("POST {url}");

        let mut req = self.client.post(url).json(body);

        if let Some(token) = self.access_token() {
            req = req.bearer_auth(token);
        }

        req.send()
            .await
            .context("Could not send request")?
            .error_for_status()
            .context("Server returned error")?;

        Ok(())
    }
}

impl RemoteSync for HttpRemoteSync {
    async fn save_unit_location(&self, report: UnitLocationReport) -> Result {
        let body = SaveUnitLocationInput::from(report);
        self.post(SAVE_UNIT_LOCATION, &body)
            .await
            .with_context(|| format!("Failed to save location for unit {}", body.unit_id))
    }

    async fn save_unit_status(&self, report: UnitStatusReport) -> Result {
        let body = SaveUnitStatusInput::from(report);
        self.post(SAVE_UNIT_STATUS, &body)
            .await
            .with_context(|| format!("Failed to save status {} for unit {}", body.status_type, body.id))
    }
}
