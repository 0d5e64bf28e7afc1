//! Session bootstrap and pairing-payload rendering (§4.5.1, §6).

use chrono::Utc;
use doomcode_crypto::Keypair;
use doomcode_proto::model::PairingPayload;
use serde::Deserialize;

use crate::error::{ControllerError, Result};

const PAIRING_TTL_MS: i64 = 5 * 60 * 1000;

#[derive(Deserialize)]
struct CreateSessionResponse {
    #[serde(rename = "sessionId")]
    session_id: String,
}

/// Mints a session via the relay's HTTP bootstrap endpoint (§6).
pub struct PairingClient {
    http: reqwest::Client,
    http_url: String,
}

impl PairingClient {
    pub fn new(http_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            http_url: http_url.into(),
        }
    }

    pub async fn create_session(&self) -> Result<String> {
        let url = format!("{}/session", self.http_url.trim_end_matches('/'));
        let response = self.http.post(&url).send().await?;
        if !response.status().is_success() {
            return Err(ControllerError::SessionCache(format!(
                "relay rejected session create: HTTP {}",
                response.status()
            )));
        }
        let body: CreateSessionResponse = response.json().await?;
        Ok(body.session_id)
    }
}

/// Build the pairing payload a local operator client consumes to connect.
pub fn build_pairing_payload(
    session_id: impl Into<String>,
    ws_url: impl Into<String>,
    keypair: &Keypair,
) -> PairingPayload {
    PairingPayload {
        session_id: session_id.into(),
        public_key: keypair.public_key().to_base64(),
        relay_url: ws_url.into(),
        expires_at: Utc::now().timestamp_millis() + PAIRING_TTL_MS,
    }
}

/// Render the pairing payload to stdout as a scannable QR code plus a
/// textual fallback (JSON and a `doomcode://pair?...` URL form), since this
/// workspace has no operator UI to hand the payload to directly (§4.5.1).
pub fn print_pairing_payload(payload: &PairingPayload) {
    let json = serde_json::to_string(payload).unwrap_or_default();
    let url = pairing_url(payload);

    println!("Scan this code with the DoomCode operator app:\n");
    match qrcode::QrCode::new(url.as_bytes()) {
        Ok(code) => {
            let rendered = code.render::<qrcode::render::unicode::Dense1x2>().build();
            println!("{rendered}");
        }
        Err(e) => {
            tracing::warn!("failed to render QR code: {e}");
        }
    }

    println!("\nOr paste this link:\n{url}\n");
    println!("Raw pairing payload:\n{json}\n");
}

fn pairing_url(payload: &PairingPayload) -> String {
    format!(
        "doomcode://pair?sessionId={}&publicKey={}&relayUrl={}&expiresAt={}",
        urlencode(&payload.session_id),
        urlencode(&payload.public_key),
        urlencode(&payload.relay_url),
        payload.expires_at,
    )
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairing_payload_has_future_expiry() {
        let keypair = Keypair::generate();
        let payload = build_pairing_payload("s1", "ws://relay", &keypair);
        assert!(payload.expires_at > Utc::now().timestamp_millis());
        assert_eq!(payload.session_id, "s1");
    }

    #[test]
    fn pairing_url_encodes_reserved_characters() {
        let keypair = Keypair::generate();
        let payload = build_pairing_payload("s1", "wss://relay.example/ws", &keypair);
        let url = pairing_url(&payload);
        assert!(url.contains("relayUrl=wss%3A%2F%2F"));
    }
}
