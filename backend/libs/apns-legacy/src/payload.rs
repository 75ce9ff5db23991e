//! Outbound notification payload and the legacy "simple" wire frame
//!
//! Frame layout (all integers big-endian):
//! ```text
//! u8      command         = 0
//! u16     token length    = 32
//! [u8;32] device token
//! u16     payload length  (high byte always 0, payload <= 255 bytes)
//! [u8]    UTF-8 JSON payload
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use serde_json::{Map, Value};

use crate::alert::Alert;
use crate::error::{ApnsError, ApnsResult};

/// Command byte of the simple notification frame
pub const SIMPLE_FRAME_COMMAND: u8 = 0;

/// Raw device token length in bytes
pub const DEVICE_TOKEN_LEN: usize = 32;

/// Largest JSON payload the single length byte can describe
pub const MAX_PAYLOAD_LEN: usize = 255;

/// `aps.alert` content: plain text or a structured alert
#[derive(Debug, Clone, PartialEq)]
pub enum AlertBody {
    Text(String),
    Alert(Alert),
}

impl From<&str> for AlertBody {
    fn from(value: &str) -> Self {
        AlertBody::Text(value.to_string())
    }
}

impl From<String> for AlertBody {
    fn from(value: String) -> Self {
        AlertBody::Text(value)
    }
}

impl From<Alert> for AlertBody {
    fn from(value: Alert) -> Self {
        AlertBody::Alert(value)
    }
}

/// One outbound push notification
///
/// Built per notification, rendered once, then dropped. It never owns a
/// connection, so a failed render leaves no transport state behind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationPayload {
    device_token: Option<String>,
    alert: Option<AlertBody>,
    badge: Option<u32>,
    sound: Option<String>,
    expiration: Option<i64>,
    custom_data: Map<String, Value>,
}

impl NotificationPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hex device token; spaces are ignored when the frame is rendered
    pub fn set_device_token(&mut self, token: Option<impl Into<String>>) -> &mut Self {
        self.device_token = token.map(Into::into);
        self
    }

    pub fn device_token(&self) -> Option<&str> {
        self.device_token.as_deref()
    }

    pub fn set_alert(&mut self, alert: Option<impl Into<AlertBody>>) -> &mut Self {
        self.alert = alert.map(Into::into);
        self
    }

    pub fn alert(&self) -> Option<&AlertBody> {
        self.alert.as_ref()
    }

    pub fn set_badge(&mut self, badge: Option<u32>) -> &mut Self {
        self.badge = badge;
        self
    }

    pub fn badge(&self) -> Option<u32> {
        self.badge
    }

    pub fn set_sound(&mut self, sound: Option<impl Into<String>>) -> &mut Self {
        self.sound = sound.map(Into::into);
        self
    }

    pub fn sound(&self) -> Option<&str> {
        self.sound.as_deref()
    }

    /// Expiration in epoch seconds
    ///
    /// Required before rendering, but the simple frame has no field for it,
    /// so it is never sent to the gateway.
    pub fn set_expiration(&mut self, expiration: Option<i64>) -> &mut Self {
        self.expiration = expiration;
        self
    }

    pub fn expiration(&self) -> Option<i64> {
        self.expiration
    }

    /// Application-defined keys merged next to `aps`; must be a JSON object
    pub fn set_custom_data(&mut self, data: Value) -> ApnsResult<&mut Self> {
        match data {
            Value::Object(map) => {
                self.custom_data = map;
                Ok(self)
            }
            Value::Null => {
                self.custom_data.clear();
                Ok(self)
            }
            _ => Err(ApnsError::InvalidArgument(
                "custom data must be a JSON object".to_string(),
            )),
        }
    }

    pub fn insert_custom(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.custom_data.insert(key.into(), value);
        self
    }

    pub fn custom_data(&self) -> &Map<String, Value> {
        &self.custom_data
    }

    /// Build the JSON payload
    ///
    /// Custom data keys are merged at the top level after `aps` and win any
    /// collision, including one on `aps` itself.
    pub fn render(&self) -> ApnsResult<Value> {
        if self.device_token.is_none() {
            return Err(ApnsError::MissingField("device_token"));
        }
        if self.expiration.is_none() {
            return Err(ApnsError::MissingField("expiration"));
        }

        let alert = match &self.alert {
            None => return Err(ApnsError::MissingField("alert")),
            Some(AlertBody::Alert(alert)) => alert.render(),
            Some(AlertBody::Text(text)) => {
                if text.trim().is_empty() {
                    return Err(ApnsError::InvalidArgument(
                        "alert body can not be empty".to_string(),
                    ));
                }
                Value::String(text.clone())
            }
        };

        let mut aps = Map::new();
        aps.insert("alert".to_string(), alert);
        if let Some(badge) = self.badge {
            aps.insert("badge".to_string(), Value::from(badge));
        }
        if let Some(sound) = &self.sound {
            aps.insert("sound".to_string(), Value::String(sound.clone()));
        }

        let mut payload = Map::new();
        payload.insert("aps".to_string(), Value::Object(aps));
        for (key, value) in &self.custom_data {
            payload.insert(key.clone(), value.clone());
        }

        Ok(Value::Object(payload))
    }

    /// Serialize into the simple notification frame
    pub fn render_frame(&self) -> ApnsResult<Bytes> {
        let payload = serde_json::to_vec(&self.render()?)?;
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(ApnsError::InvalidArgument(format!(
                "payload is {} bytes, the frame allows at most {MAX_PAYLOAD_LEN}",
                payload.len()
            )));
        }

        let token = decode_device_token(self.device_token.as_deref().unwrap_or_default())?;

        let mut frame = BytesMut::with_capacity(1 + 2 + DEVICE_TOKEN_LEN + 2 + payload.len());
        frame.put_u8(SIMPLE_FRAME_COMMAND);
        frame.put_u16(DEVICE_TOKEN_LEN as u16);
        frame.put_slice(&token);
        frame.put_u16(payload.len() as u16);
        frame.put_slice(&payload);

        Ok(frame.freeze())
    }
}

/// Decode a hex device token, ignoring spaces
pub fn decode_device_token(token: &str) -> ApnsResult<Vec<u8>> {
    let compact: String = token.chars().filter(|c| *c != ' ').collect();
    let raw = hex::decode(&compact)
        .map_err(|e| ApnsError::InvalidArgument(format!("device token is not valid hex: {e}")))?;

    if raw.len() != DEVICE_TOKEN_LEN {
        return Err(ApnsError::InvalidArgument(format!(
            "device token must be {DEVICE_TOKEN_LEN} bytes, got {}",
            raw.len()
        )));
    }

    Ok(raw)
}
