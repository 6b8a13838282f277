/*!
 * Token relay between the page context and the privileged extension context.
 *
 * The two sides share no memory. The page side posts JSON messages onto a
 * broadcast-style channel that other message kinds also travel on; the
 * privileged side parses each frame at a single dispatch point and keeps the
 * latest token per video id.
 *
 * Wire format of a token message:
 *
 * ```json
 * { "type": "FISHERAI_POT_INTERCEPTED", "source": "page-interceptor",
 *   "data": { "type": "pot_parameter", "videoId": "...", "pot": "...", "url": "..." } }
 * ```
 *
 * Delivery is best-effort and unordered; duplicates are harmless.
 */

use std::collections::HashMap;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::interceptor::{InterceptedToken, TokenLookup};

/// Message type of a relayed token
pub const POT_MESSAGE_TYPE: &str = "FISHERAI_POT_INTERCEPTED";

/// Sender tag of the page interceptor
pub const PAGE_INTERCEPTOR_SOURCE: &str = "page-interceptor";

/// Payload type of a relayed token
pub const POT_PAYLOAD_TYPE: &str = "pot_parameter";

/// Token payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PotPayload {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "videoId")]
    pub video_id: String,
    pub pot: String,
    pub url: String,
}

/// Messages travelling over the page channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeMessage {
    /// A caption token observed in the page
    #[serde(rename = "FISHERAI_POT_INTERCEPTED")]
    PotIntercepted { source: String, data: PotPayload },

    /// Any other message kind sharing the channel
    #[serde(other)]
    Other,
}

impl BridgeMessage {
    pub fn pot_intercepted(token: &InterceptedToken) -> Self {
        Self::PotIntercepted {
            source: PAGE_INTERCEPTOR_SOURCE.to_string(),
            data: PotPayload {
                kind: POT_PAYLOAD_TYPE.to_string(),
                video_id: token.identifier.clone(),
                pot: token.token.clone(),
                url: token.source_url.clone(),
            },
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

/// Outcome reported back to a sender that asked for acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryAck {
    /// The token was recorded
    Stored,
    /// The frame was not a token message or was malformed
    Ignored,
}

/// Page-side end of the relay. Posting never fails and never blocks.
pub trait RelaySender: Send + Sync {
    fn post(&self, message: BridgeMessage);
}

struct Envelope {
    payload: String,
    ack: Option<oneshot::Sender<DeliveryAck>>,
}

/// Create a connected sender/receiver pair
pub fn relay_channel() -> (ChannelRelay, RelayReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ChannelRelay { tx },
        RelayReceiver {
            rx,
            registry: TokenRegistry::new(),
        },
    )
}

/// Sender over an in-process channel
#[derive(Debug, Clone)]
pub struct ChannelRelay {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ChannelRelay {
    /// Post a raw frame, as any script on the page could
    pub fn post_raw(&self, payload: impl Into<String>) {
        self.send(Envelope {
            payload: payload.into(),
            ack: None,
        });
    }

    /// Post and get a receiver for the delivery outcome.
    ///
    /// The receiver errors if the other side is gone.
    pub fn post_with_ack(&self, message: BridgeMessage) -> oneshot::Receiver<DeliveryAck> {
        let (ack_tx, ack_rx) = oneshot::channel();
        match message.to_json() {
            Ok(payload) => self.send(Envelope {
                payload,
                ack: Some(ack_tx),
            }),
            Err(e) => warn!("Failed to encode relay message: {}", e),
        }
        ack_rx
    }

    fn send(&self, envelope: Envelope) {
        if self.tx.send(envelope).is_err() {
            debug!("Relay receiver gone, dropping message");
        }
    }
}

impl RelaySender for ChannelRelay {
    fn post(&self, message: BridgeMessage) {
        match message.to_json() {
            Ok(payload) => self.send(Envelope { payload, ack: None }),
            Err(e) => warn!("Failed to encode relay message: {}", e),
        }
    }
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("payload", &self.payload)
            .field("ack", &self.ack.is_some())
            .finish()
    }
}

/// A token as known to the privileged side
#[derive(Debug, Clone, PartialEq)]
pub struct RelayedToken {
    pub video_id: String,
    pub pot: String,
    pub url: String,
    pub received_at: DateTime<Utc>,
}

/// Latest relayed token per video id
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    tokens: Arc<RwLock<HashMap<String, RelayedToken>>>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a token; a later message for the same id replaces the earlier one
    pub fn record(&self, payload: &PotPayload) {
        let token = RelayedToken {
            video_id: payload.video_id.clone(),
            pot: payload.pot.clone(),
            url: payload.url.clone(),
            received_at: Utc::now(),
        };
        self.tokens.write().insert(token.video_id.clone(), token);
    }

    pub fn get(&self, video_id: &str) -> Option<RelayedToken> {
        self.tokens.read().get(video_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.read().is_empty()
    }
}

impl TokenLookup for TokenRegistry {
    fn get_token(&self, identifier: &str) -> Option<String> {
        self.tokens.read().get(identifier).map(|token| token.pot.clone())
    }
}

/// Privileged-side end of the relay
#[derive(Debug)]
pub struct RelayReceiver {
    rx: mpsc::UnboundedReceiver<Envelope>,
    registry: TokenRegistry,
}

impl RelayReceiver {
    /// Shared handle to the tokens received so far
    pub fn registry(&self) -> TokenRegistry {
        self.registry.clone()
    }

    /// Dispatch one frame
    pub fn handle(&self, payload: &str) -> DeliveryAck {
        let message = match BridgeMessage::from_json(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring malformed relay frame: {}", e);
                return DeliveryAck::Ignored;
            }
        };

        match message {
            BridgeMessage::PotIntercepted { source, data }
                if source == PAGE_INTERCEPTOR_SOURCE
                    && data.kind == POT_PAYLOAD_TYPE
                    && !data.video_id.is_empty()
                    && !data.pot.is_empty() =>
            {
                debug!("Relayed token for video {}", data.video_id);
                self.registry.record(&data);
                DeliveryAck::Stored
            }
            BridgeMessage::PotIntercepted { source, .. } => {
                debug!("Ignoring token message from '{}'", source);
                DeliveryAck::Ignored
            }
            BridgeMessage::Other => DeliveryAck::Ignored,
        }
    }

    /// Wait for the next frame and dispatch it; `None` once every sender is gone
    pub async fn recv(&mut self) -> Option<DeliveryAck> {
        let envelope = self.rx.recv().await?;
        let ack = self.handle(&envelope.payload);
        if let Some(reply) = envelope.ack {
            let _ = reply.send(ack);
        }
        Some(ack)
    }

    /// Process frames until every sender is dropped; returns the number stored
    pub async fn run(mut self) -> usize {
        let mut stored = 0;
        while let Some(ack) = self.recv().await {
            if ack == DeliveryAck::Stored {
                stored += 1;
            }
        }
        stored
    }

    /// Run on the tokio runtime
    pub fn spawn(self) -> JoinHandle<usize> {
        tokio::spawn(self.run())
    }
}
