//! `{workingDirectory}/.doomcode/session.json` persistence (§4.5.1, §6).
//!
//! Rewritten atomically on every key state change: write to a sibling temp
//! file, `fsync`, then rename over the target. A reader never observes a
//! half-written cache file.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use doomcode_crypto::Keypair;
use serde::{Deserialize, Serialize};

use crate::error::{ControllerError, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct KeyPairOnDisk {
    #[serde(rename = "publicKey")]
    public_key: String,
    #[serde(rename = "secretKey")]
    secret_key: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionCache {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "wsUrl")]
    pub ws_url: String,
    #[serde(rename = "httpUrl")]
    pub http_url: String,
    #[serde(rename = "keyPair")]
    key_pair: KeyPairOnDisk,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl SessionCache {
    pub fn new(
        session_id: impl Into<String>,
        ws_url: impl Into<String>,
        http_url: impl Into<String>,
        keypair: &Keypair,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            ws_url: ws_url.into(),
            http_url: http_url.into(),
            key_pair: KeyPairOnDisk {
                public_key: keypair.public_key().to_base64(),
                secret_key: base64_encode(&keypair.secret_bytes()),
            },
            updated_at: now,
        }
    }

    pub fn keypair(&self) -> Result<Keypair> {
        let raw = base64_decode(&self.key_pair.secret_key)
            .map_err(|e| ControllerError::SessionCache(format!("invalid secret key: {e}")))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| ControllerError::SessionCache("secret key is not 32 bytes".into()))?;
        Ok(Keypair::from_secret_bytes(bytes))
    }

    pub fn path_for(working_directory: &Path) -> PathBuf {
        working_directory.join(".doomcode").join("session.json")
    }

    /// Load a previously persisted cache, if any.
    pub fn load(working_directory: &Path) -> Result<Option<Self>> {
        let path = Self::path_for(working_directory);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        let cache: Self = serde_json::from_str(&raw)
            .map_err(|e| ControllerError::SessionCache(format!("malformed session.json: {e}")))?;
        Ok(Some(cache))
    }

    /// Persist atomically: write to a temp file in the same directory, then
    /// rename over the target so a concurrent reader never sees a partial
    /// write. Mode is restricted to the owning user where supported.
    pub fn save(&self, working_directory: &Path) -> Result<()> {
        let dir = working_directory.join(".doomcode");
        std::fs::create_dir_all(&dir)?;
        let target = Self::path_for(working_directory);
        let tmp = dir.join(format!("session.json.{}.tmp", std::process::id()));

        let body = serde_json::to_vec_pretty(self)
            .map_err(|e| ControllerError::SessionCache(format!("serialize failed: {e}")))?;
        std::fs::write(&tmp, &body)?;
        restrict_permissions(&tmp)?;
        std::fs::rename(&tmp, &target)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(0o600);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn base64_decode(s: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_roundtrips() {
        let dir = std::env::temp_dir().join(format!("doomcode-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        let keypair = Keypair::generate();
        let cache = SessionCache::new("s1", "ws://x", "http://x", &keypair, Utc::now());
        cache.save(&dir).expect("save");

        let loaded = SessionCache::load(&dir).expect("load").expect("present");
        assert_eq!(loaded.session_id, "s1");
        let restored_keypair = loaded.keypair().expect("keypair");
        assert_eq!(
            restored_keypair.public_key().to_bytes(),
            keypair.public_key().to_bytes()
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_on_missing_cache_returns_none() {
        let dir = std::env::temp_dir().join(format!("doomcode-test-missing-{}", uuid::Uuid::new_v4()));
        assert!(SessionCache::load(&dir).expect("load").is_none());
    }
}
