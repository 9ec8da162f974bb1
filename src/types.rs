use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest single dispense the appliance accepts, in millilitres.
pub const MAX_TAP_AMOUNT_ML: u32 = 2000;

/// Dispense volumes must be a multiple of this step.
pub const TAP_AMOUNT_STEP_ML: u32 = 50;

#[derive(Debug, Deserialize, Clone)]
pub struct TokenResponse {
    pub access_token: String,
    pub access_token_expires_in: i64,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
pub struct LoginForm<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u8")]
pub enum TapType {
    Still = 1,
    Medium = 2,
    Sparkling = 3,
}

impl TryFrom<u8> for TapType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(TapType::Still),
            2 => Ok(TapType::Medium),
            3 => Ok(TapType::Sparkling),
            other => Err(Error::Validation(format!(
                "tap type must be 1 (still), 2 (medium) or 3 (sparkling), got {}",
                other
            ))),
        }
    }
}

impl From<TapType> for u8 {
    fn from(tap_type: TapType) -> Self {
        tap_type as u8
    }
}

/// A validated dispense request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapCommand {
    tap_type: TapType,
    amount_ml: u32,
}

impl TapCommand {
    pub fn new(tap_type: u8, amount_ml: i32) -> Result<Self> {
        let tap_type = TapType::try_from(tap_type)?;

        let amount_ml = u32::try_from(amount_ml).map_err(|_| {
            Error::Validation(format!("amount must not be negative, got {}", amount_ml))
        })?;
        if amount_ml % TAP_AMOUNT_STEP_ML != 0 {
            return Err(Error::Validation(format!(
                "amount must be a multiple of {} ml, got {}",
                TAP_AMOUNT_STEP_ML, amount_ml
            )));
        }
        if amount_ml > MAX_TAP_AMOUNT_ML {
            return Err(Error::Validation(format!(
                "amount must be at most {} ml, got {}",
                MAX_TAP_AMOUNT_ML, amount_ml
            )));
        }

        Ok(Self {
            tap_type,
            amount_ml,
        })
    }

    pub fn tap_type(&self) -> TapType {
        self.tap_type
    }

    pub fn amount_ml(&self) -> u32 {
        self.amount_ml
    }
}

/// The `command` object the appliance expects. Every flag other than the
/// tap selection is sent explicitly as the vendor app does.
#[derive(Debug, Serialize)]
pub struct TapCommandBody {
    pub co2_status_reset: bool,
    pub tap_type: TapType,
    pub cleaning_mode: bool,
    pub filter_status_reset: bool,
    pub get_current_measurement: bool,
    pub tap_amount: u32,
    pub factory_reset: bool,
    pub revoke_flush_confirmation: bool,
    pub exec_auto_flush: bool,
}

impl From<&TapCommand> for TapCommandBody {
    fn from(command: &TapCommand) -> Self {
        Self {
            co2_status_reset: false,
            tap_type: command.tap_type,
            cleaning_mode: false,
            filter_status_reset: false,
            get_current_measurement: true,
            tap_amount: command.amount_ml,
            factory_reset: false,
            revoke_flush_confirmation: false,
            exec_auto_flush: false,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CommandRequest<'a> {
    #[serde(rename = "type")]
    pub kind: Option<u32>,
    pub appliance_id: &'a str,
    pub command: TapCommandBody,
    pub commandb64: Option<String>,
    pub timestamp: Option<String>,
}

impl<'a> CommandRequest<'a> {
    pub fn tap(appliance_id: &'a str, command: &TapCommand) -> Self {
        Self {
            kind: None,
            appliance_id,
            command: TapCommandBody::from(command),
            commandb64: None,
            timestamp: None,
        }
    }
}
