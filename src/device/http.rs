//! HTTP clients for the device and the predictor.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::engine::machine::RemoteCommand;
use crate::engine::prediction::{PredictionRequest, PredictionResponse};
use crate::engine::sync::StatusSnapshot;
use crate::error::DeviceError;

use super::{DeviceControl, Predictor, StatusSource};

/// JSON-over-HTTP client bound to one base URL.
#[derive(Debug, Clone)]
struct JsonClient {
    client: Client,
    base: String,
}

impl JsonClient {
    fn new(base_url: &str, timeout: Duration) -> Result<Self, DeviceError> {
        let base = base_url.trim().trim_end_matches('/');
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(DeviceError::InvalidUrl(base_url.to_string()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeviceError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base: base.to_string(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.base)
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &'static str) -> Result<T, DeviceError> {
        let response = self
            .client
            .get(self.url(endpoint))
            .send()
            .await
            .map_err(|e| transport_error(endpoint, &e))?;
        decode(endpoint, check(endpoint, response)?).await
    }

    async fn post<B: Serialize + Sync>(
        &self,
        endpoint: &'static str,
        body: Option<&B>,
    ) -> Result<reqwest::Response, DeviceError> {
        let mut request = self.client.post(self.url(endpoint));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(endpoint, &e))?;
        check(endpoint, response)
    }
}

fn check(endpoint: &'static str, response: reqwest::Response) -> Result<reqwest::Response, DeviceError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(DeviceError::HttpStatus {
            endpoint,
            status: status.as_u16(),
        })
    }
}

async fn decode<T: DeserializeOwned>(
    endpoint: &'static str,
    response: reqwest::Response,
) -> Result<T, DeviceError> {
    response.json::<T>().await.map_err(|e| DeviceError::Decode {
        endpoint,
        message: e.to_string(),
    })
}

fn transport_error(endpoint: &'static str, error: &reqwest::Error) -> DeviceError {
    if error.is_timeout() {
        DeviceError::Timeout(endpoint)
    } else {
        DeviceError::Network(format!("{endpoint}: {error}"))
    }
}

// ============================================================================
// Device
// ============================================================================

#[derive(Serialize)]
struct StartGameBody {
    level: u8,
}

/// Game device reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpDevice {
    http: JsonClient,
}

impl HttpDevice {
    /// Creates a client for the device at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::InvalidUrl`] for non-HTTP URLs, or
    /// [`DeviceError::Network`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DeviceError> {
        Ok(Self {
            http: JsonClient::new(base_url, timeout)?,
        })
    }
}

#[async_trait]
impl StatusSource for HttpDevice {
    async fn status(&self) -> Result<StatusSnapshot, DeviceError> {
        self.http.get("status").await
    }
}

#[async_trait]
impl DeviceControl for HttpDevice {
    async fn send(&self, command: RemoteCommand) -> Result<(), DeviceError> {
        let endpoint = command.endpoint();
        trace!(endpoint, "sending device command");
        match command {
            RemoteCommand::StartGame { level } => {
                let body = StartGameBody { level: level.get() };
                self.http.post(endpoint, Some(&body)).await?;
            }
            RemoteCommand::StartTurn | RemoteCommand::Pause | RemoteCommand::Reset => {
                self.http.post::<()>(endpoint, None).await?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Predictor
// ============================================================================

/// Difficulty predictor reached over HTTP (`POST predecir`).
#[derive(Debug, Clone)]
pub struct HttpPredictor {
    http: JsonClient,
}

impl HttpPredictor {
    /// Creates a client for the predictor at `base_url`.
    ///
    /// # Errors
    ///
    /// Same as [`HttpDevice::new`].
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DeviceError> {
        Ok(Self {
            http: JsonClient::new(base_url, timeout)?,
        })
    }
}

#[async_trait]
impl Predictor for HttpPredictor {
    async fn predict(&self, request: &PredictionRequest) -> Result<PredictionResponse, DeviceError> {
        let response = self.http.post("predecir", Some(request)).await?;
        decode("predecir", response).await
    }
}
