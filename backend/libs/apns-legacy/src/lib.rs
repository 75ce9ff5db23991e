//! Legacy APNs binary-protocol client
//!
//! This library talks to the Apple Push Notification Service's legacy binary
//! gateways over a certificate-authenticated TLS socket.
//!
//! It handles:
//! - Alert and notification payload building
//! - The simple notification frame and its 6-byte acknowledgment
//! - Decoding of the feedback gateway's 38-byte stale-token records
//! - Connection lifecycle for both gateway roles (sandbox and production)

pub mod alert;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod feedback;
pub mod payload;
pub mod response;
pub mod tls;

pub use alert::Alert;
pub use client::{FeedbackClient, MessageClient};
pub use config::{ConnectionMode, Environment, GatewayConfig};
pub use connection::{ConnectionState, Feedback, GatewayConnection, GatewayRole, Message};
pub use error::{ApnsError, ApnsResult};
pub use feedback::{FeedbackCodec, FeedbackRecord};
pub use payload::{AlertBody, NotificationPayload};
pub use response::{GatewayResponse, ResponseStatus};
pub use tls::{Connector, GatewayAddress, GatewayStream, TlsGatewayConnector};
