use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use relay_core::ApplicationError;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::api::{ApiClient, ApiError, ApiRequest};

const MAC_DIGITS: usize = 12;

/// A MAC address as the platform expects it: twelve hex digits, no separators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MacAddress(String);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("`{0}` is not a MAC address; use twelve hex digits like A1B2C3D4E5F6")]
pub struct InvalidMacAddress(pub String);

impl FromStr for MacAddress {
    type Err = InvalidMacAddress;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.len() == MAC_DIGITS && trimmed.chars().all(|digit| digit.is_ascii_hexdigit()) {
            Ok(Self(trimmed.to_ascii_uppercase()))
        } else {
            Err(InvalidMacAddress(trimmed.to_owned()))
        }
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub person_id: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("MAC address {0} is already registered")]
    Duplicate(MacAddress),
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl From<DeviceError> for ApplicationError {
    fn from(error: DeviceError) -> Self {
        match error {
            DeviceError::Duplicate(mac) => {
                Self::InvalidInput(format!("MAC address {mac} is duplicated"))
            }
            DeviceError::Api(error) => error.into(),
        }
    }
}

/// Device registration. Needs an administrator credential.
#[derive(Clone)]
pub struct DevicesApi {
    client: Arc<ApiClient>,
}

impl DevicesApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    /// Registers a phone by MAC address to `person_id`.
    pub async fn provision(
        &self,
        mac: &MacAddress,
        model: &str,
        person_id: &str,
    ) -> Result<Device, DeviceError> {
        let body = json!({ "mac": mac.to_string(), "model": model, "personId": person_id });
        match self.client.call_json(&ApiRequest::post("/devices", body)).await {
            Ok(device) => Ok(device),
            Err(ApiError::Upstream { status: 409, .. }) => Err(DeviceError::Duplicate(mac.clone())),
            Err(error) => Err(error.into()),
        }
    }
}
