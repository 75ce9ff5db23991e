//! Feedback gateway records
//!
//! The feedback gateway streams fixed 38-byte records until it closes the
//! connection:
//! ```text
//! u32     timestamp     (epoch seconds)
//! u16     token length  (= 32)
//! [u8;32] device token
//! ```
//! A trailing fragment shorter than a record ends the stream; it is never
//! surfaced as a record or an error.

use bytes::{Buf, BytesMut};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio_util::codec::{Decoder, FramedRead};
use tracing::debug;

use crate::error::{ApnsError, ApnsResult};
use crate::payload::DEVICE_TOKEN_LEN;

/// Size of one feedback record on the wire
pub const FEEDBACK_RECORD_LEN: usize = 4 + 2 + DEVICE_TOKEN_LEN;

/// A device token the gateway reported as no longer valid
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedbackRecord {
    pub timestamp: u32,
    pub token_length: u16,
    /// Lowercase hex
    pub device_token: String,
}

impl FeedbackRecord {
    /// Decode exactly one record
    pub fn decode(mut record: &[u8]) -> ApnsResult<Self> {
        if record.len() < FEEDBACK_RECORD_LEN {
            return Err(ApnsError::Decode(format!(
                "feedback record is {} bytes, expected {FEEDBACK_RECORD_LEN}",
                record.len()
            )));
        }

        let timestamp = record.get_u32();
        let token_length = record.get_u16();
        if token_length as usize != DEVICE_TOKEN_LEN {
            return Err(ApnsError::Decode(format!(
                "feedback token length is {token_length}, expected {DEVICE_TOKEN_LEN}"
            )));
        }

        Ok(Self {
            timestamp,
            token_length,
            device_token: hex::encode(&record[..DEVICE_TOKEN_LEN]),
        })
    }

    /// When the gateway determined the token stopped being valid
    pub fn expired_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::from(self.timestamp), 0)
    }
}

/// Lazily decode every complete record in `bytes`, in arrival order
pub fn decode(bytes: &[u8]) -> FeedbackRecords<'_> {
    FeedbackRecords {
        chunks: bytes.chunks_exact(FEEDBACK_RECORD_LEN),
    }
}

/// Lazily decode records from an async byte stream
pub fn decode_stream<R: AsyncRead>(reader: R) -> FramedRead<R, FeedbackCodec> {
    FramedRead::new(reader, FeedbackCodec)
}

/// Iterator returned by [`decode`]
pub struct FeedbackRecords<'a> {
    chunks: std::slice::ChunksExact<'a, u8>,
}

impl Iterator for FeedbackRecords<'_> {
    type Item = ApnsResult<FeedbackRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.chunks.next().map(FeedbackRecord::decode)
    }
}

/// Framing for the feedback stream
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedbackCodec;

impl Decoder for FeedbackCodec {
    type Item = FeedbackRecord;
    type Error = ApnsError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < FEEDBACK_RECORD_LEN {
            src.reserve(FEEDBACK_RECORD_LEN - src.len());
            return Ok(None);
        }

        let record = src.split_to(FEEDBACK_RECORD_LEN);
        FeedbackRecord::decode(&record).map(Some)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(record) => Ok(Some(record)),
            None => {
                if !src.is_empty() {
                    debug!(trailing_bytes = src.len(), "Discarding partial feedback record");
                    src.clear();
                }
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn record_bytes(timestamp: u32, fill: u8) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(FEEDBACK_RECORD_LEN);
        bytes.extend_from_slice(&timestamp.to_be_bytes());
        bytes.extend_from_slice(&32u16.to_be_bytes());
        bytes.extend_from_slice(&[fill; DEVICE_TOKEN_LEN]);
        bytes
    }

    #[test]
    fn test_decode_single_record() {
        let record = FeedbackRecord::decode(&record_bytes(1_700_000_000, 0xab)).unwrap();

        assert_eq!(record.timestamp, 1_700_000_000);
        assert_eq!(record.token_length, 32);
        assert_eq!(record.device_token, "ab".repeat(32));
        assert_eq!(
            record.expired_at().unwrap().to_rfc3339(),
            "2023-11-14T22:13:20+00:00"
        );
    }

    #[test]
    fn test_two_records_in_order() {
        let mut stream = record_bytes(1, 0x01);
        stream.extend(record_bytes(2, 0x02));
        assert_eq!(stream.len(), 76);

        let records: Vec<_> = decode(&stream).collect::<ApnsResult<_>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].timestamp, 1);
        assert_eq!(records[1].timestamp, 2);
        assert_eq!(records[1].device_token, "02".repeat(32));
    }

    #[test]
    fn test_truncated_trailing_record_is_dropped() {
        let mut stream = record_bytes(7, 0x07);
        stream.extend_from_slice(&record_bytes(8, 0x08)[..37]);

        let records: Vec<_> = decode(&stream).collect::<ApnsResult<_>>().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].timestamp, 7);

        assert_eq!(decode(&stream[38..]).count(), 0);
    }

    #[test]
    fn test_bad_token_length() {
        let mut bytes = record_bytes(1, 0x01);
        bytes[5] = 16;

        let err = FeedbackRecord::decode(&bytes).unwrap_err();
        assert!(matches!(err, ApnsError::Decode(_)));
    }

    #[tokio::test]
    async fn test_stream_decoding() {
        let mut stream = record_bytes(10, 0xaa);
        stream.extend(record_bytes(11, 0xbb));
        stream.extend_from_slice(&[0u8; 20]);

        let records: Vec<_> = decode_stream(stream.as_slice())
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<ApnsResult<_>>()
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].device_token, "aa".repeat(32));
        assert_eq!(records[1].timestamp, 11);
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let empty: &[u8] = &[];
        let mut records = decode_stream(empty);
        assert!(records.next().await.is_none());
    }
}
