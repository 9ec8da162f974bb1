use log::{debug, error};
use reqwest::StatusCode;

use crate::auth::bearer_headers;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::types::{CommandRequest, TapCommand};

/// Send a single tap command to `device`.
///
/// Returns `Ok(true)` when the appliance accepted the command and
/// `Ok(false)` when the request could not be delivered or was rejected with
/// an unexpected client error. An expired token (`401`) and server errors
/// (`5xx`) are returned as errors so the caller can decide whether to
/// refresh or back off. The command is never retried here.
pub async fn execute_tap_command(
    client: &reqwest::Client,
    base_url: &str,
    device: &Device,
    access_token: &str,
    command: &TapCommand,
) -> Result<bool> {
    let url = device.command_url(base_url)?;
    let headers = bearer_headers(access_token)?;
    let body = CommandRequest::tap(&device.appliance_id, command);

    debug!(
        "Sending tap command to {}: {:?} {} ml",
        device.appliance_id,
        command.tap_type(),
        command.amount_ml()
    );

    let response = match client.post(url).headers(headers).json(&body).send().await {
        Ok(response) => response,
        Err(e) => {
            error!("Tap command request failed: {}", e);
            return Ok(false);
        }
    };

    classify_response(response).await
}

async fn classify_response(response: reqwest::Response) -> Result<bool> {
    let status = response.status();
    if status.is_success() {
        debug!("Tap command accepted with status {}", status);
        return Ok(true);
    }

    let error_text = response.text().await.unwrap_or_default();
    error!("Failed to execute tap command ({}): {}", status, error_text);

    if status == StatusCode::UNAUTHORIZED {
        return Err(Error::Auth("token expired".to_string()));
    }
    if status.is_server_error() {
        return Err(Error::Server {
            status: status.as_u16(),
        });
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn device() -> Device {
        Device::from_appliance("1", "2", &json!({"appliance_id": "tap-1"})).unwrap()
    }

    async fn send_with_status(status: u16) -> (Result<bool>, MockServer) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/locations/1/rooms/2/appliances/tap-1/command"))
            .respond_with(ResponseTemplate::new(status))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let command = TapCommand::new(2, 250).unwrap();
        let result =
            execute_tap_command(&client, &mock_server.uri(), &device(), "token", &command).await;
        (result, mock_server)
    }

    #[tokio::test]
    async fn test_success_statuses() {
        for status in [200, 201, 204] {
            let (result, _server) = send_with_status(status).await;
            assert!(result.unwrap(), "status {} should succeed", status);
        }
    }

    #[tokio::test]
    async fn test_unauthorized_is_auth_error() {
        let (result, _server) = send_with_status(401).await;
        assert!(matches!(result, Err(Error::Auth(_))));
    }

    #[tokio::test]
    async fn test_server_error() {
        let (result, _server) = send_with_status(503).await;
        assert!(matches!(result, Err(Error::Server { status: 503 })));
    }

    #[tokio::test]
    async fn test_other_client_errors_return_false() {
        for status in [400, 403, 404, 429] {
            let (result, _server) = send_with_status(status).await;
            assert!(!result.unwrap(), "status {} should not succeed", status);
        }
    }

    #[tokio::test]
    async fn test_transport_failure_returns_false() {
        let client = reqwest::Client::new();
        let command = TapCommand::new(1, 100).unwrap();

        // Nothing listens on port 9 (discard) locally.
        let result =
            execute_tap_command(&client, "http://127.0.0.1:9", &device(), "token", &command).await;
        assert!(!result.unwrap());
    }

    #[tokio::test]
    async fn test_appliance_id_stays_in_its_path_segment() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/locations/1/rooms/2/appliances/tap%2F1%3Fx/command"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let device = Device::from_appliance("1", "2", &json!({"appliance_id": "tap/1?x"})).unwrap();
        let client = reqwest::Client::new();
        let command = TapCommand::new(1, 100).unwrap();
        let result =
            execute_tap_command(&client, &mock_server.uri(), &device, "token", &command).await;
        assert!(result.unwrap());
    }

    #[tokio::test]
    async fn test_request_shape() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/locations/1/rooms/2/appliances/tap-1/command"))
            .and(header("authorization", "Bearer token"))
            .and(header("content-type", "application/json"))
            .and(body_partial_json(json!({
                "type": null,
                "appliance_id": "tap-1",
                "command": {"tap_type": 3, "tap_amount": 500},
                "commandb64": null,
                "timestamp": null
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let command = TapCommand::new(3, 500).unwrap();
        let result =
            execute_tap_command(&client, &mock_server.uri(), &device(), "token", &command).await;
        assert!(result.unwrap());
    }
}
