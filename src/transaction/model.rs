use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A single value movement between two addresses.
/// `from == None` marks a minted credit (mining reward, trading profit,
/// service earning): value appears with no sender and needs no signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Stable identifier, used to drain included transactions from the
    /// pending pool after a block is appended.
    pub id: String,
    pub from: Option<String>,
    pub to: String,
    pub amount: u64,
    /// Unix timestamp in milliseconds (UTC).
    pub timestamp: i64,
    /// Hex of the sender's compressed public key (debits only).
    pub sender_pubkey: Option<String>,
    /// Hex-encoded DER ECDSA signature over `sighash()` (debits only).
    pub signature: Option<String>,
}

impl Transaction {
    /// Build a minted credit (`from = None`) to the given address.
    pub fn minted(to: impl Into<String>, amount: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from: None,
            to: to.into(),
            amount,
            timestamp: Utc::now().timestamp_millis(),
            sender_pubkey: None,
            signature: None,
        }
    }

    /// Build an unsigned debit. The caller signs `sighash()` and attaches the
    /// signature before submitting.
    pub fn debit(
        from: impl Into<String>,
        to: impl Into<String>,
        amount: u64,
        sender_pubkey: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from: Some(from.into()),
            to: to.into(),
            amount,
            timestamp: Utc::now().timestamp_millis(),
            sender_pubkey: Some(sender_pubkey.into()),
            signature: None,
        }
    }

    pub fn is_minted(&self) -> bool {
        self.from.is_none()
    }

    /// Canonical signing payload (JSON) that excludes the signature and the
    /// public key. This is what the sender's key signs.
    pub fn signing_payload(&self) -> Vec<u8> {
        let payload = serde_json::json!({
            "id": self.id,
            "from": self.from,
            "to": self.to,
            "amount": self.amount,
            "timestamp": self.timestamp,
        });
        serde_json::to_vec(&payload).expect("serialize signing payload")
    }

    /// SHA-256 of the signing payload.
    pub fn sighash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.signing_payload());
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest[..]);
        out
    }
}
