use std::fmt;

use bytes::Buf;
use serde::Serialize;

use crate::error::{ApnsError, ApnsResult};

/// Size of the message gateway's acknowledgment frame
pub const RESPONSE_FRAME_LEN: usize = 6;

/// Status byte reported by the message gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    NoErrors,
    ProcessingError,
    MissingDeviceToken,
    MissingTopic,
    MissingPayload,
    InvalidTokenSize,
    InvalidTopicSize,
    InvalidPayloadSize,
    InvalidToken,
    Shutdown,
    Unknown,
    Other(u8),
}

impl From<u8> for ResponseStatus {
    fn from(code: u8) -> Self {
        match code {
            0 => ResponseStatus::NoErrors,
            1 => ResponseStatus::ProcessingError,
            2 => ResponseStatus::MissingDeviceToken,
            3 => ResponseStatus::MissingTopic,
            4 => ResponseStatus::MissingPayload,
            5 => ResponseStatus::InvalidTokenSize,
            6 => ResponseStatus::InvalidTopicSize,
            7 => ResponseStatus::InvalidPayloadSize,
            8 => ResponseStatus::InvalidToken,
            10 => ResponseStatus::Shutdown,
            255 => ResponseStatus::Unknown,
            other => ResponseStatus::Other(other),
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseStatus::NoErrors => f.write_str("no errors encountered"),
            ResponseStatus::ProcessingError => f.write_str("processing error"),
            ResponseStatus::MissingDeviceToken => f.write_str("missing device token"),
            ResponseStatus::MissingTopic => f.write_str("missing topic"),
            ResponseStatus::MissingPayload => f.write_str("missing payload"),
            ResponseStatus::InvalidTokenSize => f.write_str("invalid token size"),
            ResponseStatus::InvalidTopicSize => f.write_str("invalid topic size"),
            ResponseStatus::InvalidPayloadSize => f.write_str("invalid payload size"),
            ResponseStatus::InvalidToken => f.write_str("invalid token"),
            ResponseStatus::Shutdown => f.write_str("gateway shutdown"),
            ResponseStatus::Unknown => f.write_str("unknown error"),
            ResponseStatus::Other(code) => write!(f, "unrecognized status {code}"),
        }
    }
}

/// Decoded acknowledgment frame: `u8 command, u8 status, u32 identifier`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GatewayResponse {
    pub command: u8,
    pub status_code: u8,
    pub identifier: u32,
}

impl GatewayResponse {
    pub fn decode(mut frame: &[u8]) -> ApnsResult<Self> {
        if frame.len() < RESPONSE_FRAME_LEN {
            return Err(ApnsError::Decode(format!(
                "acknowledgment frame is {} bytes, expected {RESPONSE_FRAME_LEN}",
                frame.len()
            )));
        }

        Ok(Self {
            command: frame.get_u8(),
            status_code: frame.get_u8(),
            identifier: frame.get_u32(),
        })
    }

    pub fn status(&self) -> ResponseStatus {
        ResponseStatus::from(self.status_code)
    }

    pub fn is_error(&self) -> bool {
        self.status() != ResponseStatus::NoErrors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_response() {
        let response = GatewayResponse::decode(&[8, 8, 0, 0, 1, 2]).unwrap();

        assert_eq!(response.command, 8);
        assert_eq!(response.identifier, 258);
        assert_eq!(response.status(), ResponseStatus::InvalidToken);
        assert!(response.is_error());
    }

    #[test]
    fn test_decode_success_status() {
        let response = GatewayResponse::decode(&[8, 0, 0xff, 0xff, 0xff, 0xff]).unwrap();

        assert_eq!(response.identifier, u32::MAX);
        assert!(!response.is_error());
    }

    #[test]
    fn test_truncated_frame() {
        let err = GatewayResponse::decode(&[8, 8, 0]).unwrap_err();
        assert!(matches!(err, ApnsError::Decode(_)));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ResponseStatus::from(10), ResponseStatus::Shutdown);
        assert_eq!(ResponseStatus::from(255), ResponseStatus::Unknown);
        assert_eq!(ResponseStatus::from(42), ResponseStatus::Other(42));
        assert_eq!(ResponseStatus::from(42).to_string(), "unrecognized status 42");
    }
}
