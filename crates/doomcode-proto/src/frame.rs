//! The single frame type actually read off one relay connection (§4.2).
//!
//! Both frame shapes share one transport. Disambiguation is structural, not
//! by a shared tag: a control frame carries `action`, an envelope frame
//! carries `encryptedPayload`/`ciphertext`. A frame with neither (or,
//! degenerately, both) is rejected as ambiguous.

use serde::Deserialize;
use serde_json::Value;

use crate::{ControlFrame, Envelope, ProtoError, Result};

/// A decoded frame from the shared relay transport.
#[derive(Clone, Debug)]
pub enum WireFrame {
    Control(ControlFrame),
    Envelope(Envelope),
}

impl WireFrame {
    /// Parse one JSON text frame, dispatching on field presence (§4.2).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| ProtoError::MalformedJson(e.to_string()))?;

        let has_action = value.get("action").is_some();
        let has_payload =
            value.get("encryptedPayload").is_some() || value.get("ciphertext").is_some();

        match (has_action, has_payload) {
            (true, false) => {
                let frame = ControlFrame::deserialize(value)
                    .map_err(|e| ProtoError::MalformedJson(e.to_string()))?;
                Ok(WireFrame::Control(frame))
            }
            (false, true) => {
                let envelope: Envelope = serde_json::from_value(value)
                    .map_err(|e| ProtoError::MalformedJson(e.to_string()))?;
                envelope.validate()?;
                Ok(WireFrame::Envelope(envelope))
            }
            (false, false) => Err(ProtoError::AmbiguousFrame),
            (true, true) => Err(ProtoError::AmbiguousFrame),
        }
    }

    pub fn as_control(&self) -> Option<&ControlFrame> {
        match self {
            WireFrame::Control(c) => Some(c),
            WireFrame::Envelope(_) => None,
        }
    }

    pub fn as_envelope(&self) -> Option<&Envelope> {
        match self {
            WireFrame::Envelope(e) => Some(e),
            WireFrame::Control(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    #[test]
    fn decodes_control_frame() {
        let json = serde_json::json!({"action": "leave"});
        let frame = WireFrame::decode(json.to_string().as_bytes()).unwrap();
        assert!(matches!(frame, WireFrame::Control(ControlFrame::Leave)));
    }

    #[test]
    fn decodes_envelope_frame() {
        let env = Envelope::new(
            "s1",
            Role::Controller,
            base64_nonce(),
            base64_nonce(),
            0,
        );
        let bytes = env.encode().unwrap();
        let frame = WireFrame::decode(&bytes).unwrap();
        assert!(frame.as_envelope().is_some());
    }

    #[test]
    fn rejects_frame_with_neither_marker() {
        let json = serde_json::json!({"foo": "bar"});
        let err = WireFrame::decode(json.to_string().as_bytes()).unwrap_err();
        assert_eq!(err, ProtoError::AmbiguousFrame);
    }

    #[test]
    fn rejects_frame_with_both_markers() {
        let json = serde_json::json!({"action": "leave", "encryptedPayload": "x"});
        let err = WireFrame::decode(json.to_string().as_bytes()).unwrap_err();
        assert_eq!(err, ProtoError::AmbiguousFrame);
    }

    fn base64_nonce() -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(b"012345678901234567890123")
    }
}
