//! Harness for driving an in-process relay with fake controller/operator
//! clients standing in for the real `doomcode-controller` binary and the
//! (out-of-scope) operator UI — exactly the wire-level surface §8 tests.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use doomcode_crypto::{Keypair, PrecomputedBox, PublicKey, SealedMessage};
use doomcode_proto::envelope::Envelope;
use doomcode_proto::model::Role;
use doomcode_proto::payload::Payload;
use doomcode_proto::{ControlFrame, WireFrame};

/// An in-process relay bound to an ephemeral loopback port. Dropping it
/// aborts the serve task.
pub struct TestRelay {
    pub http_url: String,
    pub ws_url: String,
    serve_task: tokio::task::JoinHandle<()>,
}

impl TestRelay {
    pub async fn start() -> Self {
        let state = doomcode_relay::AppState::new();
        let router = doomcode_relay::http::router(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        let serve_task = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        Self {
            http_url: format!("http://{addr}"),
            ws_url: format!("ws://{addr}/ws"),
            serve_task,
        }
    }

    /// POST `/session`, mirroring `PairingClient::create_session`.
    pub async fn create_session(&self) -> String {
        let response = reqwest::Client::new()
            .post(format!("{}/session", self.http_url))
            .send()
            .await
            .expect("create session request");
        let body: serde_json::Value = response.json().await.expect("session response body");
        body["sessionId"].as_str().expect("sessionId field").to_string()
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.serve_task.abort();
    }
}

/// A fake endpoint (controller or operator) speaking the relay wire
/// protocol directly, standing in for the real binary on one side of the
/// pairing.
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    keypair: Keypair,
    peer_box: Option<PrecomputedBox>,
}

impl TestClient {
    pub async fn connect(ws_url: &str) -> Self {
        let (ws, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .expect("connect to relay");
        Self {
            ws,
            keypair: Keypair::generate(),
            peer_box: None,
        }
    }

    pub fn public_key(&self) -> String {
        self.keypair.public_key().to_base64()
    }

    pub async fn join(&mut self, session_id: &str, role: Role) {
        self.send_control(ControlFrame::Join {
            session_id: session_id.to_string(),
            role,
            public_key: self.public_key(),
        })
        .await;
    }

    pub async fn send_control(&mut self, frame: ControlFrame) {
        let json = serde_json::to_string(&frame).expect("encode control frame");
        self.ws.send(Message::Text(json)).await.expect("send control frame");
    }

    /// Bind the peer's public key once it is known (from `session_joined`
    /// or `peer_connected`), enabling `send_payload`/`open_envelope`.
    pub fn bind_peer(&mut self, peer_public_key: &str) {
        let public = PublicKey::from_base64(peer_public_key).expect("valid peer public key");
        self.peer_box = Some(PrecomputedBox::new(&self.keypair, &public));
    }

    pub async fn send_payload(&mut self, session_id: &str, sender: Role, payload: &Payload) {
        let sealed_box = self.peer_box.as_ref().expect("peer bound before sending");
        let plaintext = serde_json::to_vec(payload).expect("encode payload");
        let sealed = sealed_box.seal(&plaintext);
        let envelope = Envelope::new(
            session_id.to_string(),
            sender,
            base64_encode(&sealed.nonce),
            base64_encode(&sealed.ciphertext),
            0,
        );
        let json = String::from_utf8(envelope.encode().expect("encode envelope")).expect("utf8 json");
        self.ws.send(Message::Text(json)).await.expect("send envelope");
    }

    pub fn open_envelope(&self, envelope: &Envelope) -> Option<Payload> {
        let sealed_box = self.peer_box.as_ref()?;
        let nonce = base64_decode(&envelope.nonce).ok()?;
        let ciphertext = base64_decode(&envelope.ciphertext).ok()?;
        let nonce: [u8; 24] = nonce.try_into().ok()?;
        let sealed = SealedMessage { nonce, ciphertext };
        let plaintext = sealed_box.open(&sealed).ok()?;
        serde_json::from_slice(&plaintext).ok()
    }

    /// Read the next frame, whichever shape it is.
    pub async fn next_frame(&mut self) -> WireFrame {
        loop {
            let message = self
                .ws
                .next()
                .await
                .expect("relay closed unexpectedly")
                .expect("transport read error");
            match message {
                Message::Text(text) => {
                    return WireFrame::decode(text.as_bytes()).expect("decode wire frame")
                }
                Message::Binary(bytes) => return WireFrame::decode(&bytes).expect("decode wire frame"),
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(_) => panic!("relay closed the connection"),
                Message::Frame(_) => continue,
            }
        }
    }

    /// Read frames until one matches, discarding everything else (used to
    /// skip past unsolicited control frames not under test).
    pub async fn next_control(&mut self) -> ControlFrame {
        loop {
            if let WireFrame::Control(control) = self.next_frame().await {
                return control;
            }
        }
    }

    pub async fn next_envelope(&mut self) -> Envelope {
        loop {
            if let WireFrame::Envelope(envelope) = self.next_frame().await {
                return envelope;
            }
        }
    }

    /// Answer a `Ping` with a `Pong`, used by the incumbent-eviction test to
    /// simulate a dead connection by simply never calling this.
    pub async fn respond_to_ping(&mut self) {
        if let Some(Ok(Message::Ping(payload))) = self.ws.next().await {
            self.ws.send(Message::Pong(payload)).await.expect("send pong");
        }
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn base64_decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(s)
}
