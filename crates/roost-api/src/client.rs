//! reqwest-backed links: the master calling workers and workers calling the master.

use std::{net::IpAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use roost_core::{LinkError, MasterLink, SpawnerLink};
use roost_model::{
    SpawnerId, SpawnerOptions,
    message::{
        Ack, KillProcessRequest, ProcessKilled, ProcessStarted, RegisterSpawner,
        RegisterSpawnerResponse, SpawnProcessRequest, UpdateSpawnerProcessesCount,
    },
};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::{
    PEER_HEADER, config::ApiConfig, connector::SpawnerConnector, error::ApiError,
    wire::CountReport,
};

/// JSON-over-HTTP client that identifies itself as one peer.
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    peer: String,
    token: Option<String>,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(cfg: &ApiConfig) -> Result<Self, ApiError> {
        let timeout = Duration::from_millis(cfg.request_timeout_ms);
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            peer: cfg.peer_name.clone(),
            token: cfg.token.clone(),
            timeout,
        })
    }

    async fn post<B, R>(&self, url: &str, body: &B) -> Result<R, LinkError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut req = self
            .http
            .post(url)
            .header(PEER_HEADER, &self.peer)
            .json(body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|e| self.transport_error(e))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(status_error(status, text));
        }
        resp.json::<R>()
            .await
            .map_err(|e| LinkError::Rejected(format!("unexpected response from {url}: {e}")))
    }

    fn transport_error(&self, e: reqwest::Error) -> LinkError {
        if e.is_timeout() {
            LinkError::Timeout(self.timeout)
        } else {
            LinkError::Unreachable(e.to_string())
        }
    }
}

/// Server errors may go away on their own; client errors are refusals.
fn status_error(status: StatusCode, body: String) -> LinkError {
    let msg = format!("{status}: {}", body.trim());
    if status.is_server_error() {
        LinkError::Unreachable(msg)
    } else {
        LinkError::Rejected(msg)
    }
}

fn into_result(ack: Ack) -> Result<(), LinkError> {
    if ack.success {
        Ok(())
    } else {
        Err(LinkError::Rejected(ack.message))
    }
}

fn base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

// ============================================================================
// master -> worker
// ============================================================================

/// [`SpawnerLink`] to a worker serving the routes of [`crate::WorkerApi`].
#[derive(Debug, Clone)]
pub struct HttpSpawnerLink {
    client: HttpClient,
    base: String,
}

impl HttpSpawnerLink {
    pub fn new(client: HttpClient, endpoint: &str) -> Self {
        Self {
            client,
            base: base_url(endpoint),
        }
    }
}

#[async_trait]
impl SpawnerLink for HttpSpawnerLink {
    async fn spawn_process(&self, req: SpawnProcessRequest) -> Result<Ack, LinkError> {
        self.client
            .post(&format!("{}/api/v1/processes", self.base), &req)
            .await
    }

    async fn kill_process(&self, req: KillProcessRequest) -> Result<Ack, LinkError> {
        let url = format!("{}/api/v1/processes/{}/kill", self.base, req.spawn_id);
        self.client.post(&url, &req).await
    }
}

/// Connects registering spawners over HTTP.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    client: HttpClient,
}

impl HttpConnector {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

impl SpawnerConnector for HttpConnector {
    fn connect(&self, endpoint: &str) -> Result<Arc<dyn SpawnerLink>, ApiError> {
        let url = Url::parse(endpoint)
            .map_err(|e| ApiError::InvalidRequest(format!("invalid endpoint {endpoint:?}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ApiError::InvalidRequest(format!(
                "unsupported endpoint scheme {:?}",
                url.scheme()
            )));
        }
        Ok(Arc::new(HttpSpawnerLink::new(self.client.clone(), endpoint)))
    }
}

// ============================================================================
// worker -> master
// ============================================================================

/// [`MasterLink`] to a master serving the routes of [`crate::MasterApi`].
#[derive(Debug, Clone)]
pub struct HttpMasterLink {
    client: HttpClient,
    base: String,
    /// Where the master should reach this worker.
    endpoint: String,
    address: Option<(String, u16)>,
}

impl HttpMasterLink {
    pub fn new(client: HttpClient, master_url: &str, endpoint: &str) -> Result<Self, ApiError> {
        let url = Url::parse(master_url)
            .map_err(|e| ApiError::InvalidRequest(format!("invalid master url {master_url:?}: {e}")))?;
        let address = url
            .host_str()
            .zip(url.port_or_known_default())
            .map(|(host, port)| (host.to_string(), port));
        Ok(Self {
            client,
            base: base_url(master_url),
            endpoint: endpoint.to_string(),
            address,
        })
    }
}

#[async_trait]
impl MasterLink for HttpMasterLink {
    async fn register_spawner(&self, options: SpawnerOptions) -> Result<SpawnerId, LinkError> {
        let req = RegisterSpawner {
            options,
            endpoint: Some(self.endpoint.clone()),
        };
        let resp: RegisterSpawnerResponse = self
            .client
            .post(&format!("{}/api/v1/spawners", self.base), &req)
            .await?;
        Ok(resp.spawner_id)
    }

    async fn process_started(&self, msg: ProcessStarted) -> Result<(), LinkError> {
        let ack: Ack = self
            .client
            .post(&format!("{}/api/v1/process/started", self.base), &msg)
            .await?;
        into_result(ack)
    }

    async fn process_killed(&self, msg: ProcessKilled) -> Result<(), LinkError> {
        let ack: Ack = self
            .client
            .post(&format!("{}/api/v1/process/killed", self.base), &msg)
            .await?;
        into_result(ack)
    }

    async fn update_process_count(&self, msg: UpdateSpawnerProcessesCount) -> Result<(), LinkError> {
        let url = format!("{}/api/v1/spawners/{}/count", self.base, msg.spawner_id);
        let ack: Ack = self
            .client
            .post(&url, &CountReport { count: msg.count })
            .await?;
        into_result(ack)
    }

    fn master_address(&self) -> Option<(String, u16)> {
        self.address.clone()
    }
}

/// Ask `url` for this machine's public address. The service must answer with the
/// bare address as plain text.
pub async fn discover_public_ip(url: &str, timeout: Duration) -> Result<IpAddr, ApiError> {
    let http = reqwest::Client::builder().timeout(timeout).build()?;
    let body = http.get(url).send().await?.error_for_status()?.text().await?;
    let ip = body
        .trim()
        .parse::<IpAddr>()
        .map_err(|_| ApiError::InvalidRequest(format!("{url} did not return an ip address")))?;
    debug!(target: "roost.api", %ip, "public address discovered");
    Ok(ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> HttpClient {
        HttpClient::new(&ApiConfig::default()).unwrap()
    }

    #[test]
    fn master_address_comes_from_the_url() {
        let link = HttpMasterLink::new(client(), "http://10.0.0.5:9000/", "http://w:1").unwrap();
        assert_eq!(link.master_address(), Some(("10.0.0.5".to_string(), 9000)));
        assert_eq!(link.base, "http://10.0.0.5:9000");

        let link = HttpMasterLink::new(client(), "https://master.local", "http://w:1").unwrap();
        assert_eq!(link.master_address(), Some(("master.local".to_string(), 443)));
    }

    #[test]
    fn connector_rejects_bad_endpoints() {
        let connector = HttpConnector::new(client());
        assert!(connector.connect("http://127.0.0.1:8081").is_ok());
        assert!(matches!(
            connector.connect("not a url"),
            Err(ApiError::InvalidRequest(_))
        ));
        assert!(connector.connect("ftp://host").is_err());
    }

    #[test]
    fn http_status_maps_to_link_errors() {
        assert!(matches!(
            status_error(StatusCode::CONFLICT, "busy".into()),
            LinkError::Rejected(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, String::new()),
            LinkError::Unreachable(_)
        ));
    }

    #[tokio::test]
    async fn unreachable_worker_is_a_transport_error() {
        let link = HttpSpawnerLink::new(client(), "http://127.0.0.1:1");
        let err = link
            .kill_process(KillProcessRequest {
                spawner_id: SpawnerId(1),
                spawn_id: 1.into(),
            })
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
