//! The duplex transport connection to the relay (§4.5.1, §6).
//!
//! Wraps one `tokio-tungstenite` WebSocket split into a read half and a
//! write half so the supervisor's PTY read loop, transport read loop, and
//! timed input pacing (§5) can all run concurrently without blocking each
//! other: writes go through a channel, reads are drained by whoever owns
//! this handle's `next_frame`.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use doomcode_crypto::{Keypair, PrecomputedBox, PublicKey};
use doomcode_proto::envelope::Envelope;
use doomcode_proto::model::Role;
use doomcode_proto::payload::Payload;
use doomcode_proto::{ControlFrame, WireFrame};

use crate::error::{ControllerError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct RelayConnection {
    session_id: String,
    keypair: Keypair,
    peer_box: Option<PrecomputedBox>,
    outbound: mpsc::UnboundedSender<Message>,
    inbound: mpsc::UnboundedReceiver<WireFrame>,
    writer_task: tokio::task::JoinHandle<()>,
    reader_task: tokio::task::JoinHandle<()>,
}

impl RelayConnection {
    /// Open the WebSocket and send `join {role: controller}` (or operator,
    /// for symmetry/testing), returning once the socket is up. The caller
    /// awaits `SessionJoined`/`PeerConnected` off `next_frame`.
    pub async fn connect(ws_url: &str, session_id: &str, role: Role, keypair: Keypair) -> Result<Self> {
        let (stream, _) = tokio_tungstenite::connect_async(ws_url).await?;
        let (mut sink, mut source) = stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let writer_task = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
        });

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<WireFrame>();
        let reader_task = tokio::spawn(async move {
            while let Some(Ok(message)) = source.next().await {
                match message {
                    Message::Text(text) => {
                        if let Ok(frame) = WireFrame::decode(text.as_bytes()) {
                            let _ = inbound_tx.send(frame);
                        }
                    }
                    Message::Binary(bytes) => {
                        if let Ok(frame) = WireFrame::decode(&bytes) {
                            let _ = inbound_tx.send(frame);
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        });

        let mut connection = Self {
            session_id: session_id.to_string(),
            keypair,
            peer_box: None,
            outbound: outbound_tx,
            inbound: inbound_rx,
            writer_task,
            reader_task,
        };

        connection.send_control(ControlFrame::Join {
            session_id: connection.session_id.clone(),
            role,
            public_key: connection.keypair.public_key().to_base64(),
        })?;

        Ok(connection)
    }

    pub fn send_control(&self, frame: ControlFrame) -> Result<()> {
        let json = serde_json::to_string(&frame)
            .map_err(|e| ControllerError::Proto(doomcode_proto::ProtoError::MalformedJson(e.to_string())))?;
        self.outbound
            .send(Message::Text(json))
            .map_err(|_| ControllerError::SessionCache("transport closed".into()))
    }

    /// Precompute the shared secret with the peer's public key, called once
    /// `peer_connected` arrives (§4.5.1).
    pub fn bind_peer(&mut self, peer_public_key: &str) -> Result<()> {
        let public = PublicKey::from_base64(peer_public_key)?;
        self.peer_box = Some(PrecomputedBox::new(&self.keypair, &public));
        Ok(())
    }

    pub fn has_peer(&self) -> bool {
        self.peer_box.is_some()
    }

    /// Seal `payload` and send it as an envelope with the given `sender`
    /// role. Fails if no peer key has been bound yet.
    pub fn send_payload(&self, sender: Role, payload: &Payload) -> Result<()> {
        let sealed_box = self
            .peer_box
            .as_ref()
            .ok_or_else(|| ControllerError::SessionCache("no peer bound yet".into()))?;
        let plaintext = serde_json::to_vec(payload)
            .map_err(|e| ControllerError::Proto(doomcode_proto::ProtoError::MalformedJson(e.to_string())))?;
        let sealed = sealed_box.seal(&plaintext);
        let envelope = Envelope::new(
            self.session_id.clone(),
            sender,
            base64_encode(&sealed.nonce),
            base64_encode(&sealed.ciphertext),
            chrono::Utc::now().timestamp_millis(),
        );
        let json = envelope
            .encode()
            .map_err(ControllerError::Proto)?;
        self.outbound
            .send(Message::Text(String::from_utf8(json).unwrap_or_default()))
            .map_err(|_| ControllerError::SessionCache("transport closed".into()))
    }

    /// Open and decrypt an incoming envelope, dropping it with a log line
    /// on any failure (§7: "envelope validation errors ... drop silently").
    pub fn open_envelope(&self, envelope: &Envelope) -> Option<Payload> {
        let sealed_box = self.peer_box.as_ref()?;
        let nonce = base64_decode(&envelope.nonce).ok()?;
        let ciphertext = base64_decode(&envelope.ciphertext).ok()?;
        let nonce: [u8; 24] = nonce.try_into().ok()?;
        let sealed = doomcode_crypto::SealedMessage { nonce, ciphertext };
        let plaintext = match sealed_box.open(&sealed) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("envelope decryption failed, dropping: {e}");
                return None;
            }
        };
        match serde_json::from_slice(&plaintext) {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::warn!("envelope payload malformed, dropping: {e}");
                None
            }
        }
    }

    pub async fn next_frame(&mut self) -> Option<WireFrame> {
        self.inbound.recv().await
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        self.writer_task.abort();
        self.reader_task.abort();
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn base64_decode(s: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(s)
}
