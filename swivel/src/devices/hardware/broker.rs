use crate::{
    components::camera::waypoint::WaypointId, error::BrokerError,
    messages::control::move_to::MoveToMessage,
};
use bytes::Bytes;
use reqwest::{
    header::{ACCEPT, CONTENT_TYPE},
    Client, StatusCode,
};
use serde::{Deserialize, Serialize};
use std::{future::Future, time::Duration};
use strum_macros::{EnumString, IntoStaticStr};
use uuid::Uuid;

/// Scheme used to reach the broker. Plain http is the default, even on 443.
#[derive(
    EnumString, Deserialize, Serialize, IntoStaticStr, Copy, Clone, Debug, Default, PartialEq, Eq,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BrokerScheme {
    /// Plain http.
    #[default]
    Http,
    /// Http over TLS.
    Https,
}

fn default_port() -> u16 {
    443
}

fn default_timeout_ms() -> u64 {
    10_000
}

/// Network location of the broker and the camera it fronts.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Host name or address of the broker.
    pub host: String,
    /// Port the broker listens on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Identifier of the camera on the broker.
    pub camera: String,
    /// Scheme used to reach the broker.
    #[serde(default)]
    pub scheme: BrokerScheme,
    /// Requests taking longer than this are treated as transport failures.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl BrokerConfig {
    /// Create a broker config using the default port, scheme and timeout.
    ///
    /// * `host`: broker host name or address.
    /// * `camera`: camera identifier on the broker.
    pub fn new(host: impl Into<String>, camera: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            camera: camera.into(),
            scheme: BrokerScheme::default(),
            timeout_ms: default_timeout_ms(),
        }
    }

    /// Override the broker port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Override the scheme.
    pub fn with_scheme(mut self, scheme: BrokerScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Base url of the camera resource, `{scheme}://{host}:{port}/camera/api/{camera}`.
    pub fn camera_url(&self) -> String {
        let scheme: &'static str = self.scheme.into();
        format!(
            "{}://{}:{}/camera/api/{}",
            scheme, self.host, self.port, self.camera
        )
    }
}

/// Operations the swivel needs from the camera broker. The broker is stateful,
/// a capture returns whatever the camera is currently pointed at.
pub trait Broker: Send + Sync + 'static {
    /// Move the camera to `waypoint`, taking roughly `duration` to get there.
    fn move_to(
        &self,
        waypoint: &WaypointId,
        duration: Duration,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Fetch a still image from the camera's current position.
    fn capture_snapshot(&self) -> impl Future<Output = Result<Bytes, BrokerError>> + Send;
}

/// Http client for the broker camera api. Holds no state besides the
/// connection pool, every call stands on its own and is never retried.
#[derive(Clone, Debug)]
pub struct BrokerClient {
    /// Unique identifier, helpful for trouble shooting and logging.
    uuid: Uuid,
    /// Url of the camera resource, target of move commands.
    camera_url: String,
    /// Url of the snapshot resource.
    snapshot_url: String,
    /// Pooled http client.
    client: Client,
}

impl BrokerClient {
    /// Create a new client by consuming a broker config.
    ///
    /// * `config`: location of the broker.
    pub fn new(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        let camera_url = config.camera_url();
        Ok(Self {
            uuid: Uuid::new_v4(),
            snapshot_url: format!("{camera_url}/snapshot"),
            camera_url,
            client,
        })
    }

    /// Return the unique identifier of the client.
    pub fn get_uuid(&self) -> Uuid {
        self.uuid
    }

    /// Url move commands are sent to.
    pub fn camera_url(&self) -> &str {
        &self.camera_url
    }
}

/// Anything outside the 2xx range is a protocol failure.
fn check_status(status: StatusCode) -> Result<(), BrokerError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(BrokerError::Protocol { status })
    }
}

impl Broker for BrokerClient {
    async fn move_to(&self, waypoint: &WaypointId, duration: Duration) -> Result<(), BrokerError> {
        let duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        let message = MoveToMessage::new(waypoint.clone(), duration_ms);
        let response = self
            .client
            .put(&self.camera_url)
            .json(&message)
            .send()
            .await?;
        check_status(response.status())
    }

    async fn capture_snapshot(&self) -> Result<Bytes, BrokerError> {
        let response = self
            .client
            .get(&self.snapshot_url)
            .header(CONTENT_TYPE, "image/png")
            .header(ACCEPT, "image/png")
            .send()
            .await?;
        check_status(response.status())?;
        Ok(response.bytes().await?)
    }
}
