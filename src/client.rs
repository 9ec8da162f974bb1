use log::{debug, error, info};
use serde_json::Value;

use crate::auth::{AuthProvider, OndusAuthProvider, TokenSet};
use crate::command::execute_tap_command;
use crate::config::{ClientConfig, Credentials};
use crate::dashboard::{extract_all_devices, extract_devices, get_dashboard};
use crate::device::Device;
use crate::error::{Error, Result};
use crate::session::{Session, TokenManager};
use crate::types::TapCommand;

/// A logged-in session against the Grohe cloud.
///
/// The HTTP client is created once with the configured request timeout and
/// shared by every call made through this value.
pub struct GroheClient {
    client: reqwest::Client,
    base_url: String,
    tokens: TokenManager,
}

impl GroheClient {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        Self::with_config(Credentials::new(email, password), &ClientConfig::default())
    }

    pub fn with_config(credentials: Credentials, config: &ClientConfig) -> Result<Self> {
        let provider = OndusAuthProvider::new(config)?;
        Self::with_auth_provider(credentials, config, Box::new(provider))
    }

    /// Use a custom token source instead of the vendor login flow.
    pub fn with_auth_provider(
        credentials: Credentials,
        config: &ClientConfig,
        provider: Box<dyn AuthProvider>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let session = Session::new(credentials.email, credentials.password);

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            tokens: TokenManager::new(session, provider),
        })
    }

    /// Start from tokens obtained by an earlier login instead of logging in again.
    pub fn with_tokens(mut self, tokens: &TokenSet) -> Self {
        self.tokens = self.tokens.with_tokens(tokens);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Session {
        self.tokens.session()
    }

    pub async fn login(&mut self) -> Result<()> {
        info!("Authenticating with Grohe...");
        self.tokens.login().await?;
        debug!("Authentication successful");
        Ok(())
    }

    /// A currently valid access token, refreshed first if it has expired
    pub async fn access_token(&mut self) -> Result<String> {
        self.tokens.get_valid_access_token().await
    }

    /// The raw dashboard tree, or an empty object if it could not be fetched
    pub async fn get_dashboard(&mut self) -> Result<Value> {
        let access_token = self.access_token().await?;
        Ok(get_dashboard(&self.client, &self.base_url, &access_token).await)
    }

    /// Appliances in the first room of the first location
    pub async fn list_devices(&mut self) -> Result<Vec<Device>> {
        let dashboard = self.get_dashboard().await?;
        extract_devices(&dashboard)
    }

    /// Appliances in every room of every location
    pub async fn list_all_devices(&mut self) -> Result<Vec<Device>> {
        let dashboard = self.get_dashboard().await?;
        Ok(extract_all_devices(&dashboard))
    }

    /// Dispense `amount_ml` of water of the given tap type
    /// (1 = still, 2 = medium, 3 = sparkling).
    ///
    /// Arguments are validated before anything is sent. The command is sent
    /// once; an appliance that does not accept it is reported as
    /// [`Error::DispenseFailed`].
    pub async fn dispense(
        &mut self,
        device: &Device,
        tap_type: u8,
        amount_ml: i32,
    ) -> Result<bool> {
        let command = TapCommand::new(tap_type, amount_ml)?;
        let access_token = self.access_token().await?;

        info!(
            "Dispensing {} ml ({:?}) from {}",
            command.amount_ml(),
            command.tap_type(),
            device.appliance_id
        );

        let success =
            execute_tap_command(&self.client, &self.base_url, device, &access_token, &command)
                .await?;

        if !success {
            error!("Failed to dispense water");
            return Err(Error::DispenseFailed);
        }

        Ok(success)
    }
}
