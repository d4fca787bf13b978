//! Blocking client for the inventory (doni) REST API.

use crate::DeviceRegistry;
use edge_core::{Device, DeviceRegistration, EdgeError, PatchOperation, Result, Settings};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

const HARDWARE_PATH: &str = "/v1/hardware/";
const AUTH_HEADER: &str = "X-Auth-Token";

#[derive(Debug, Deserialize)]
struct HardwareList {
    #[serde(default)]
    hardware: Vec<Device>,
}

pub struct DoniClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl DoniClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| EdgeError::Api(format!("cannot build HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            &settings.inventory_endpoint,
            settings.auth_token.clone(),
            Duration::from_secs(settings.http_timeout_secs),
        )
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let token = self.token.as_deref().ok_or_else(|| {
            EdgeError::Auth("no auth token configured; set OS_TOKEN or auth_token".to_string())
        })?;
        let url = format!("{}{}", self.base_url, path);
        log::debug!("{method} {url}");
        Ok(self
            .client
            .request(method, url)
            .header(AUTH_HEADER, token)
            .header(reqwest::header::ACCEPT, "application/json"))
    }

    fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response> {
        let response = builder
            .send()
            .map_err(|err| EdgeError::Api(format!("request for {what} failed: {err}")))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(classify_failure(status.as_u16(), &body, what))
    }

    fn decode<T: DeserializeOwned>(&self, response: Response, what: &str) -> Result<T> {
        let body = response
            .text()
            .map_err(|err| EdgeError::Api(format!("reading {what} failed: {err}")))?;
        serde_json::from_str(&body).map_err(|source| EdgeError::Decode {
            what: what.to_string(),
            source,
        })
    }

    fn device_path(id: Uuid) -> String {
        format!("{HARDWARE_PATH}{id}/")
    }
}

impl DeviceRegistry for DoniClient {
    fn create_device(&self, registration: &DeviceRegistration) -> Result<Device> {
        let what = format!("device {}", registration.name);
        let builder = self.request(Method::POST, HARDWARE_PATH)?.json(registration);
        let response = self.send(builder, &what)?;
        self.decode(response, &what)
    }

    fn get_device(&self, id: Uuid) -> Result<Device> {
        let what = format!("device {id}");
        let builder = self.request(Method::GET, &Self::device_path(id))?;
        let response = self.send(builder, &what)?;
        self.decode(response, &what)
    }

    fn list_devices(&self) -> Result<Vec<Device>> {
        let builder = self.request(Method::GET, HARDWARE_PATH)?;
        let response = self.send(builder, "device list")?;
        let list: HardwareList = self.decode(response, "device list")?;
        Ok(list.hardware)
    }

    fn update_device(&self, id: Uuid, patch: &[PatchOperation]) -> Result<Device> {
        let what = format!("device {id}");
        let builder = self
            .request(Method::PATCH, &Self::device_path(id))?
            .json(patch);
        let response = self.send(builder, &what)?;
        self.decode(response, &what)
    }

    fn delete_device(&self, id: Uuid) -> Result<()> {
        let builder = self.request(Method::DELETE, &Self::device_path(id))?;
        self.send(builder, &format!("device {id}"))?;
        Ok(())
    }

    fn sync_device(&self, id: Uuid) -> Result<()> {
        let path = format!("{}sync/", Self::device_path(id));
        let builder = self.request(Method::POST, &path)?;
        self.send(builder, &format!("device {id}"))?;
        Ok(())
    }
}

pub fn classify_failure(status: u16, body: &str, what: &str) -> EdgeError {
    match status {
        401 | 403 => EdgeError::Auth(
            server_message(body).unwrap_or_else(|| format!("HTTP {status} for {what}")),
        ),
        404 => EdgeError::not_found(what),
        _ => EdgeError::Api(
            server_message(body)
                .map(|message| format!("{message} (HTTP {status})"))
                .unwrap_or_else(|| format!("HTTP {status} for {what}")),
        ),
    }
}

fn server_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let candidates = [
        value.get("message"),
        value.get("error").and_then(|error| error.get("message")),
        value.get("error"),
        value.get("faultstring"),
    ];
    let message = candidates
        .into_iter()
        .flatten()
        .find_map(|candidate| candidate.as_str())
        .filter(|message| !message.trim().is_empty())
        .map(str::to_string);
    message
}
