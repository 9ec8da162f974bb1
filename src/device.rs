use reqwest::Url;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// A Grohe Blue appliance as listed on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub location_id: String,
    pub room_id: String,
    pub appliance_id: String,
    /// The appliance entry exactly as the dashboard returned it
    pub raw_attributes: Map<String, Value>,
}

impl Device {
    /// Create a device from an entry of a room's `appliances` array
    pub fn from_appliance(location_id: &str, room_id: &str, appliance: &Value) -> Result<Self> {
        let raw_attributes = appliance
            .as_object()
            .cloned()
            .ok_or(Error::MissingField("appliance_id"))?;

        let appliance_id = raw_attributes
            .get("appliance_id")
            .and_then(id_string)
            .ok_or(Error::MissingField("appliance_id"))?;

        Ok(Device {
            location_id: location_id.to_string(),
            room_id: room_id.to_string(),
            appliance_id,
            raw_attributes,
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.raw_attributes.get("name").and_then(Value::as_str)
    }

    /// Vendor appliance type code (Grohe Blue Home reports 104)
    pub fn appliance_type(&self) -> Option<i64> {
        self.raw_attributes.get("type").and_then(Value::as_i64)
    }

    /// Command endpoint under the API base URL. Each id is escaped as a
    /// single path segment.
    pub fn command_url(&self, base_url: &str) -> Result<Url> {
        let mut url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid base URL {}: {}", base_url, e)))?;

        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("base URL {} cannot hold a path", base_url)))?
            .pop_if_empty()
            .extend([
                "locations",
                self.location_id.as_str(),
                "rooms",
                self.room_id.as_str(),
                "appliances",
                self.appliance_id.as_str(),
                "command",
            ]);

        Ok(url)
    }
}

/// Dashboard ids are numbers for locations and rooms but strings for
/// appliances; both end up in URLs.
pub(crate) fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
