use log::{debug, error, info};
use serde_json::{Map, Value};

use crate::auth::{api_url, bearer_headers};
use crate::device::{id_string, Device};
use crate::error::{Error, Result};

/// Fetch the account dashboard: locations, their rooms and the appliances
/// installed in each.
///
/// Failures of any kind are logged and yield an empty JSON object, so the
/// caller always gets a tree back.
pub async fn get_dashboard(
    client: &reqwest::Client,
    base_url: &str,
    access_token: &str,
) -> Value {
    match fetch_dashboard(client, base_url, access_token).await {
        Ok(tree) => {
            info!("Appliance information retrieved successfully");
            tree
        }
        Err(e) => {
            error!("Failed to fetch dashboard: {}", e);
            Value::Object(Map::new())
        }
    }
}

async fn fetch_dashboard(
    client: &reqwest::Client,
    base_url: &str,
    access_token: &str,
) -> Result<Value> {
    let url = api_url(base_url, "dashboard");
    let headers = bearer_headers(access_token)?;

    debug!("Fetching dashboard");
    let response = client.get(&url).headers(headers).send().await?;

    let response = response.error_for_status()?;
    let response_text = response.text().await?;

    Ok(serde_json::from_str(&response_text)?)
}

/// Devices of the first room of the first location.
///
/// Accounts with several locations or rooms only expose the first of each
/// here; use [`extract_all_devices`] to walk the whole tree. Fails when
/// any of the three levels is missing or empty.
pub fn extract_devices(tree: &Value) -> Result<Vec<Device>> {
    let location = first_entry(tree, "locations")?;
    let location_id = entry_id(location)?;

    let room = first_entry(location, "rooms")?;
    let room_id = entry_id(room)?;

    let appliances = non_empty_array(room, "appliances")?;

    let devices = appliances
        .iter()
        .map(|appliance| Device::from_appliance(&location_id, &room_id, appliance))
        .collect::<Result<Vec<_>>>()?;

    debug!("Found {} devices", devices.len());
    Ok(devices)
}

/// Devices of every room of every location. Levels that are missing or
/// empty, and entries without ids, are skipped.
pub fn extract_all_devices(tree: &Value) -> Vec<Device> {
    let mut devices = Vec::new();

    for location in array(tree, "locations") {
        let Some(location_id) = location.get("id").and_then(id_string) else {
            debug!("Skipping location without id");
            continue;
        };

        for room in array(location, "rooms") {
            let Some(room_id) = room.get("id").and_then(id_string) else {
                debug!("Skipping room without id in location {}", location_id);
                continue;
            };

            for appliance in array(room, "appliances") {
                match Device::from_appliance(&location_id, &room_id, appliance) {
                    Ok(device) => devices.push(device),
                    Err(e) => debug!("Skipping appliance in room {}: {}", room_id, e),
                }
            }
        }
    }

    debug!("Found {} devices across all locations", devices.len());
    devices
}

fn array<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn non_empty_array<'a>(value: &'a Value, key: &'static str) -> Result<&'a [Value]> {
    let entries = array(value, key);
    if entries.is_empty() {
        return Err(Error::EmptyHierarchy(key));
    }
    Ok(entries)
}

fn first_entry<'a>(value: &'a Value, key: &'static str) -> Result<&'a Value> {
    Ok(&non_empty_array(value, key)?[0])
}

fn entry_id(entry: &Value) -> Result<String> {
    entry
        .get("id")
        .and_then(id_string)
        .ok_or(Error::MissingField("id"))
}
