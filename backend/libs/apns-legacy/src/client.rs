use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::{debug, info, warn};

use crate::config::ConnectionMode;
use crate::connection::{Feedback, GatewayConnection, Message};
use crate::error::{ApnsError, ApnsResult};
use crate::feedback::{FeedbackCodec, FeedbackRecord};
use crate::payload::NotificationPayload;
use crate::response::{GatewayResponse, RESPONSE_FRAME_LEN};

/// Connection to the notification delivery gateway
pub type MessageClient = GatewayConnection<Message>;

/// Connection to the feedback gateway
pub type FeedbackClient = GatewayConnection<Feedback>;

impl GatewayConnection<Message> {
    /// Send one notification and collect any acknowledgment already waiting
    ///
    /// Connects with the default environment when needed. Under
    /// `ConnectionMode::Ephemeral` a connection opened here is closed before
    /// returning, on success and on failure alike; a connection the caller
    /// opened is left as it was.
    ///
    /// # Returns
    /// `Ok(Some(response))` when the gateway answered with a full frame,
    /// `Ok(None)` when it closed the stream or sent nothing within the read
    /// window. The gateway never acknowledges an accepted notification, so
    /// `Ok(None)` is the usual outcome.
    pub async fn send_notification(
        &mut self,
        notification: &NotificationPayload,
    ) -> ApnsResult<Option<GatewayResponse>> {
        let frame = notification.render_frame()?;
        let device_token_prefix = notification
            .device_token()
            .unwrap_or_default()
            .chars()
            .take(8)
            .collect::<String>();

        let opened = self.ensure_connected().await?;
        let result = self.deliver(&frame, &device_token_prefix).await;

        if opened && self.config().connection_mode == ConnectionMode::Ephemeral {
            self.close().await;
        }

        result
    }

    async fn deliver(
        &mut self,
        frame: &[u8],
        device_token_prefix: &str,
    ) -> ApnsResult<Option<GatewayResponse>> {
        self.write(frame).await.map_err(|e| match e {
            ApnsError::Write(source) => ApnsError::ServiceUnavailable(source.to_string()),
            other => other,
        })?;

        let mut response = BytesMut::with_capacity(RESPONSE_FRAME_LEN);
        while response.len() < RESPONSE_FRAME_LEN {
            match self.read(RESPONSE_FRAME_LEN - response.len()).await? {
                Some(chunk) if !chunk.is_empty() => response.extend_from_slice(&chunk),
                _ => break,
            }
        }

        if response.is_empty() {
            debug!(
                "No acknowledgment from push gateway for token {}",
                device_token_prefix
            );
            return Ok(None);
        }

        let response = GatewayResponse::decode(&response)?;
        if response.is_error() {
            warn!(
                status = %response.status(),
                identifier = response.identifier,
                "Push gateway rejected notification for token {}",
                device_token_prefix
            );
        } else {
            info!(
                "Push gateway acknowledged notification for token {}",
                device_token_prefix
            );
        }

        Ok(Some(response))
    }
}

impl GatewayConnection<Feedback> {
    /// Read every feedback record the gateway has queued
    ///
    /// Reads until the gateway closes the stream or a read comes back empty.
    /// Same connection handling as `send_notification`.
    pub async fn poll_feedback(&mut self) -> ApnsResult<Vec<FeedbackRecord>> {
        let opened = self.ensure_connected().await?;
        let result = self.drain_feedback().await;

        if opened && self.config().connection_mode == ConnectionMode::Ephemeral {
            self.close().await;
        }

        result
    }

    async fn drain_feedback(&mut self) -> ApnsResult<Vec<FeedbackRecord>> {
        let chunk_size = self.config().read_chunk_size;
        let mut codec = FeedbackCodec;
        let mut buf = BytesMut::new();
        let mut records = Vec::new();

        while let Some(chunk) = self.read(chunk_size).await? {
            if chunk.is_empty() {
                break;
            }
            buf.extend_from_slice(&chunk);
            while let Some(record) = codec.decode(&mut buf)? {
                records.push(record);
            }
        }

        while let Some(record) = codec.decode_eof(&mut buf)? {
            records.push(record);
        }

        info!(records = records.len(), "Drained push feedback");
        Ok(records)
    }
}
