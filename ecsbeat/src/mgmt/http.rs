//! reqwest-backed management client.
//!
//! Each VDC is reachable through the management port of any of its nodes.
//! Endpoints are tried in configured order; one that fails at the transport
//! level (or answers 5xx) is skipped for `block_duration`.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use common::config::Customer;

use super::{ManagementClient, MgmtError, NodeList, VdcIdentity};

const AUTH_HEADER: &str = "X-SDS-AUTH-TOKEN";
const LOGIN_PATH: &str = "/login";
const LOCAL_VDC_PATH: &str = "/object/vdcs/vdc/local";
const NODES_PATH: &str = "/vdc/nodes";

pub struct HttpMgmtClient {
    client: reqwest::Client,
    username: String,
    password: String,
    block_duration: Duration,
    /// VDC name → management base URLs.
    endpoints: BTreeMap<String, Vec<String>>,
    /// Cached auth token per VDC.
    tokens: Mutex<HashMap<String, String>>,
    /// Endpoint → instant it becomes usable again.
    blocked: Mutex<HashMap<String, Instant>>,
}

impl HttpMgmtClient {
    pub fn new(
        endpoints: BTreeMap<String, Vec<String>>,
        username: impl Into<String>,
        password: impl Into<String>,
        req_timeout: Duration,
        block_duration: Duration,
        insecure_skip_verify: bool,
    ) -> Result<Self, MgmtError> {
        let client = reqwest::Client::builder()
            .timeout(req_timeout)
            .danger_accept_invalid_certs(insecure_skip_verify)
            .build()?;

        Ok(Self::with_client(client, endpoints, username, password, block_duration))
    }

    /// Wraps an already configured `reqwest::Client`.
    pub fn with_client(
        client: reqwest::Client,
        endpoints: BTreeMap<String, Vec<String>>,
        username: impl Into<String>,
        password: impl Into<String>,
        block_duration: Duration,
    ) -> Self {
        Self {
            client,
            username: username.into(),
            password: password.into(),
            block_duration,
            endpoints,
            tokens: Mutex::new(HashMap::new()),
            blocked: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_customer(customer: &Customer) -> Result<Self, MgmtError> {
        Self::new(
            customer.management_endpoints(),
            &customer.username,
            &customer.password,
            customer.req_timeout,
            customer.block_duration,
            customer.insecure_skip_verify,
        )
    }

    async fn is_blocked(&self, endpoint: &str) -> bool {
        let mut blocked = self.blocked.lock().await;
        match blocked.get(endpoint) {
            Some(until) if Instant::now() < *until => true,
            Some(_) => {
                blocked.remove(endpoint);
                false
            }
            None => false,
        }
    }

    async fn block(&self, endpoint: &str) {
        if self.block_duration.is_zero() {
            return;
        }
        self.blocked
            .lock()
            .await
            .insert(endpoint.to_string(), Instant::now() + self.block_duration);
    }

    /// GET `path` from the first usable endpoint of `vdc`.
    async fn get_json<T: DeserializeOwned>(&self, vdc: &str, path: &str) -> Result<T, MgmtError> {
        let endpoints = match self.endpoints.get(vdc) {
            Some(e) if !e.is_empty() => e,
            _ => return Err(MgmtError::UnknownVdc(vdc.to_string())),
        };

        let mut last_err = None;
        for endpoint in endpoints {
            if self.is_blocked(endpoint).await {
                debug!(vdc, endpoint = %endpoint, "Endpoint blocked, skipping");
                continue;
            }
            match self.fetch(vdc, endpoint, path).await {
                Ok(body) => return Ok(body),
                Err(e) if is_endpoint_failure(&e) => {
                    warn!(
                        vdc,
                        endpoint = %endpoint,
                        block_secs = self.block_duration.as_secs(),
                        "Endpoint failed, blocking: {}",
                        e
                    );
                    self.block(endpoint).await;
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| MgmtError::NoAvailableEndpoint(vdc.to_string())))
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        vdc: &str,
        endpoint: &str,
        path: &str,
    ) -> Result<T, MgmtError> {
        let token = self.token(vdc, endpoint).await?;
        let resp = self
            .client
            .get(format!("{}{}", endpoint, path))
            .header(AUTH_HEADER, token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            // Token expired; the next call logs in again.
            self.tokens.lock().await.remove(vdc);
        }
        if !status.is_success() {
            return Err(MgmtError::Status {
                endpoint: endpoint.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(resp.json::<T>().await?)
    }

    async fn token(&self, vdc: &str, endpoint: &str) -> Result<String, MgmtError> {
        if let Some(token) = self.tokens.lock().await.get(vdc) {
            return Ok(token.clone());
        }

        let resp = self
            .client
            .get(format!("{}{}", endpoint, LOGIN_PATH))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(MgmtError::Status {
                endpoint: endpoint.to_string(),
                path: LOGIN_PATH.to_string(),
                status: resp.status().as_u16(),
            });
        }

        let token = resp
            .headers()
            .get(AUTH_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| MgmtError::MissingToken {
                endpoint: endpoint.to_string(),
            })?;

        debug!(vdc, endpoint = %endpoint, "Logged in to management API");
        self.tokens.lock().await.insert(vdc.to_string(), token.clone());
        Ok(token)
    }
}

/// Failures that say something about the endpoint rather than the request.
fn is_endpoint_failure(err: &MgmtError) -> bool {
    match err {
        MgmtError::Http(e) => !e.is_decode(),
        MgmtError::Status { status, .. } => *status >= 500,
        _ => false,
    }
}

#[async_trait]
impl ManagementClient for HttpMgmtClient {
    async fn get_local_vdc(&self, vdc: &str) -> Result<VdcIdentity, MgmtError> {
        self.get_json(vdc, LOCAL_VDC_PATH).await
    }

    async fn get_nodes(&self, vdc: &str) -> Result<NodeList, MgmtError> {
        self.get_json(vdc, NODES_PATH).await
    }
}
