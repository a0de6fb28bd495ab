//! Generic REST Storage Controller Adapter
//!
//! Drives SAN controllers that expose the common management REST API under
//! `https://<controller>/api` with HTTP basic authentication.

use crate::config::Config;
use crate::domain::ports::{Disk, Protocol, RaidLevel, StorageController};
use crate::error::{Error, Result};
use crate::retry::{retry, retry_when, RetryPolicy};
use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the generic REST adapter
#[derive(Debug, Clone)]
pub struct GenericRestConfig {
    /// API root, e.g. `https://10.0.0.5/api`
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Retry applied to each request
    pub retry: RetryPolicy,
    /// Accept self-signed controller certificates
    pub accept_invalid_certs: bool,
    /// Protocol requested when mapping volumes
    pub protocol: Protocol,
}

impl Default for GenericRestConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for GenericRestConfig {
    fn from(config: &Config) -> Self {
        Self {
            base_url: format!("https://{}/api", config.san_ip),
            username: config.san_username.clone(),
            password: config.san_password.clone(),
            timeout: config.api_timeout(),
            retry: RetryPolicy::default(),
            accept_invalid_certs: true,
            protocol: config.protocol,
        }
    }
}

// =============================================================================
// API Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct DisksResponse {
    #[serde(default)]
    disks: Vec<Disk>,
}

#[derive(Debug, Deserialize)]
struct CreatedResponse {
    #[serde(default)]
    id: Option<String>,
}

// =============================================================================
// Generic REST Adapter
// =============================================================================

/// Adapter for controllers speaking the generic management API
pub struct GenericRestController {
    config: GenericRestConfig,
    client: Option<Client>,
}

impl GenericRestController {
    /// Create a new adapter; no connection is made until `connect`
    pub fn new(config: GenericRestConfig) -> Self {
        Self {
            config,
            client: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| Error::connection(self.config.base_url.as_str(), "not connected to SAN"))
    }

    /// Issue one authenticated request, mapping auth failures and non-2xx
    /// statuses to errors
    async fn send(
        &self,
        client: &Client,
        method: Method,
        endpoint: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Response> {
        let mut request = client
            .request(method, self.url(endpoint))
            .basic_auth(&self.config.username, Some(&self.config.password));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::Authentication {
                target: self.config.base_url.clone(),
            }),
            _ => Ok(response.error_for_status()?),
        }
    }

    /// Send with retries; writes are only retried when the request never
    /// reached the controller
    async fn dispatch(
        &self,
        client: &Client,
        method: Method,
        endpoint: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Response> {
        let attempt = || self.send(client, method.clone(), endpoint, body);
        if method == Method::GET {
            retry(self.config.retry, endpoint, attempt).await
        } else {
            retry_when(self.config.retry, endpoint, attempt, is_unsent).await
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let client = self.client()?;
        let response = self
            .dispatch(client, method, endpoint, body.as_ref())
            .await?;

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl StorageController for GenericRestController {
    #[instrument(skip(self), fields(base_url = %self.config.base_url))]
    async fn connect(&mut self) -> Result<bool> {
        let client = Client::builder()
            .timeout(self.config.timeout)
            .danger_accept_invalid_certs(self.config.accept_invalid_certs)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let probe = retry(self.config.retry, "/system/info", || {
            self.send(&client, Method::GET, "/system/info", None)
        })
        .await;

        match probe {
            Ok(response) if response.status() == StatusCode::OK => {
                info!("Connected to storage controller");
                self.client = Some(client);
                Ok(true)
            }
            Ok(response) => {
                warn!("Controller probe returned {}", response.status());
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn disconnect(&mut self) -> Result<bool> {
        if self.client.take().is_some() {
            debug!("Closed session with {}", self.config.base_url);
        }
        Ok(true)
    }

    async fn list_disks(&mut self) -> Result<Vec<Disk>> {
        let response: DisksResponse = self.call(Method::GET, "/storage/disks", None).await?;
        debug!("Controller reported {} disks", response.disks.len());
        Ok(response.disks)
    }

    async fn create_raid(
        &mut self,
        disk_ids: &[String],
        level: RaidLevel,
    ) -> Result<Option<String>> {
        info!("Creating RAID {} array from {:?}", level, disk_ids);
        let body = json!({
            "disks": disk_ids,
            "raid_level": level.as_str(),
        });
        let response: CreatedResponse = self
            .call(Method::POST, "/storage/arrays", Some(body))
            .await?;
        Ok(response.id)
    }

    async fn create_volume(
        &mut self,
        array_id: &str,
        name: &str,
        size_gb: u64,
    ) -> Result<Option<String>> {
        info!("Creating volume {} ({} GB) on array {}", name, size_gb, array_id);
        let body = json!({
            "array_id": array_id,
            "name": name,
            "size_gb": size_gb,
        });
        let response: CreatedResponse = self
            .call(Method::POST, "/storage/volumes", Some(body))
            .await?;
        Ok(response.id)
    }

    async fn map_volume(&mut self, volume_id: &str, host_identifier: &str) -> Result<bool> {
        info!("Mapping volume {} to host {}", volume_id, host_identifier);
        let client = self.client()?;
        let endpoint = format!(
            "/storage/volumes/{}/mappings",
            urlencoding::encode(volume_id)
        );
        let body = json!({
            "host": host_identifier,
            "protocol": self.config.protocol.to_string(),
        });

        let response = self
            .dispatch(client, Method::POST, &endpoint, Some(&body))
            .await?;

        Ok(response.status().is_success())
    }

    fn vendor_name(&self) -> &str {
        "generic"
    }
}

/// Connection refused or never established
fn is_unsent(err: &Error) -> bool {
    matches!(err, Error::Http(e) if e.is_connect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use mockito::Matcher;

    fn config_for(server: &mockito::Server) -> GenericRestConfig {
        GenericRestConfig {
            base_url: format!("{}/api", server.url()),
            username: "admin".into(),
            password: "secret".into(),
            timeout: Duration::from_secs(5),
            retry: RetryPolicy::new(2, Duration::from_millis(10)),
            accept_invalid_certs: false,
            protocol: Protocol::Iscsi,
        }
    }

    async fn connected(server: &mut mockito::Server) -> GenericRestController {
        server
            .mock("GET", "/api/system/info")
            .with_status(200)
            .with_body(r#"{"model":"test"}"#)
            .create_async()
            .await;

        let mut controller = GenericRestController::new(config_for(server));
        assert!(controller.connect().await.unwrap());
        controller
    }

    #[test]
    fn test_config_from_app_config() {
        let config = GenericRestConfig::from(&Config::default());
        assert_eq!(config.base_url, "https://10.196.172.88/api");
        assert_eq!(config.username, "admin");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(config.accept_invalid_certs);
    }

    #[tokio::test]
    async fn test_connect_sends_basic_auth() {
        let mut server = mockito::Server::new_async().await;
        let probe = server
            .mock("GET", "/api/system/info")
            .match_header("authorization", "Basic YWRtaW46c2VjcmV0")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let mut controller = GenericRestController::new(config_for(&server));
        assert!(controller.connect().await.unwrap());
        assert!(controller.is_connected());
        probe.assert_async().await;
    }

    #[tokio::test]
    async fn test_connect_rejected_credentials() {
        let mut server = mockito::Server::new_async().await;
        let probe = server
            .mock("GET", "/api/system/info")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let mut controller = GenericRestController::new(config_for(&server));
        assert_matches!(
            controller.connect().await,
            Err(Error::Authentication { .. })
        );
        assert!(!controller.is_connected());
        probe.assert_async().await;
    }

    #[tokio::test]
    async fn test_connect_retries_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let probe = server
            .mock("GET", "/api/system/info")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let mut controller = GenericRestController::new(config_for(&server));
        assert_matches!(controller.connect().await, Err(Error::Http(_)));
        probe.assert_async().await;
    }

    #[tokio::test]
    async fn test_calls_require_connection() {
        let server = mockito::Server::new_async().await;
        let mut controller = GenericRestController::new(config_for(&server));

        assert_matches!(
            controller.list_disks().await,
            Err(Error::Connection { .. })
        );
    }

    #[tokio::test]
    async fn test_list_disks() {
        let mut server = mockito::Server::new_async().await;
        let mut controller = connected(&mut server).await;

        let _listing = server
            .mock("GET", "/api/storage/disks")
            .with_status(200)
            .with_body(r#"{"disks":[{"id":"d1","size_gb":960},{"id":"d2"}]}"#)
            .create_async()
            .await;

        let disks = controller.list_disks().await.unwrap();
        assert_eq!(disks.len(), 2);
        assert_eq!(disks[0].id, "d1");
        assert_eq!(disks[1].id, "d2");
    }

    #[tokio::test]
    async fn test_list_disks_missing_key_is_empty() {
        let mut server = mockito::Server::new_async().await;
        let mut controller = connected(&mut server).await;

        let _listing = server
            .mock("GET", "/api/storage/disks")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        assert!(controller.list_disks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_raid_and_volume() {
        let mut server = mockito::Server::new_async().await;
        let mut controller = connected(&mut server).await;

        let raid = server
            .mock("POST", "/api/storage/arrays")
            .match_body(Matcher::PartialJson(json!({
                "disks": ["d1", "d2", "d3"],
                "raid_level": "5",
            })))
            .with_status(201)
            .with_body(r#"{"id":"array-7"}"#)
            .create_async()
            .await;

        let volume = server
            .mock("POST", "/api/storage/volumes")
            .match_body(Matcher::PartialJson(json!({
                "array_id": "array-7",
                "name": "test_volume",
                "size_gb": 100,
            })))
            .with_status(201)
            .with_body(r#"{"id":"vol-3"}"#)
            .create_async()
            .await;

        let disk_ids = vec!["d1".to_string(), "d2".to_string(), "d3".to_string()];
        let array_id = controller
            .create_raid(&disk_ids, RaidLevel::Raid5)
            .await
            .unwrap();
        assert_eq!(array_id.as_deref(), Some("array-7"));

        let volume_id = controller
            .create_volume("array-7", "test_volume", 100)
            .await
            .unwrap();
        assert_eq!(volume_id.as_deref(), Some("vol-3"));

        raid.assert_async().await;
        volume.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_raid_without_id() {
        let mut server = mockito::Server::new_async().await;
        let mut controller = connected(&mut server).await;

        let _listing = server
            .mock("POST", "/api/storage/arrays")
            .with_status(202)
            .with_body(r#"{"status":"queued"}"#)
            .create_async()
            .await;

        let array_id = controller
            .create_raid(&["d1".to_string()], RaidLevel::Raid0)
            .await
            .unwrap();
        assert!(array_id.is_none());
    }

    #[tokio::test]
    async fn test_map_volume() {
        let mut server = mockito::Server::new_async().await;
        let mut controller = connected(&mut server).await;

        let mapping = server
            .mock("POST", "/api/storage/volumes/vol-3/mappings")
            .match_body(Matcher::PartialJson(json!({
                "host": "10.196.172.90",
                "protocol": "iscsi",
            })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        assert!(controller
            .map_volume("vol-3", "10.196.172.90")
            .await
            .unwrap());
        mapping.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_raid_not_repeated_on_server_error() {
        let mut server = mockito::Server::new_async().await;
        let mut controller = connected(&mut server).await;

        let raid = server
            .mock("POST", "/api/storage/arrays")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        assert_matches!(
            controller
                .create_raid(&["d1".to_string(), "d2".to_string()], RaidLevel::Raid1)
                .await,
            Err(Error::Http(_))
        );
        raid.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_disks_retries_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let mut controller = connected(&mut server).await;

        let listing = server
            .mock("GET", "/api/storage/disks")
            .with_status(500)
            .expect(2)
            .create_async()
            .await;

        assert_matches!(controller.list_disks().await, Err(Error::Http(_)));
        listing.assert_async().await;
    }

    #[tokio::test]
    async fn test_map_volume_client_error() {
        let mut server = mockito::Server::new_async().await;
        let mut controller = connected(&mut server).await;

        let mapping = server
            .mock("POST", "/api/storage/volumes/vol-3/mappings")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        assert_matches!(
            controller.map_volume("vol-3", "10.196.172.90").await,
            Err(Error::Http(_))
        );
        mapping.assert_async().await;
    }

    #[tokio::test]
    async fn test_disconnect_drops_session() {
        let mut server = mockito::Server::new_async().await;
        let mut controller = connected(&mut server).await;

        assert!(controller.disconnect().await.unwrap());
        assert!(!controller.is_connected());
        assert_matches!(
            controller.list_disks().await,
            Err(Error::Connection { .. })
        );
    }
}
