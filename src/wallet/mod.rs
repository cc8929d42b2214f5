pub mod registry;

use rand::rngs::OsRng;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey, ecdsa::Signature};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use registry::WalletRegistry;

/// Length of an address in hex characters (20 bytes of the pubkey digest).
pub const ADDRESS_LEN: usize = 40;

/// A keypair-derived identity. The address, a truncated digest of the public
/// key, is the canonical identity everywhere in the ledger; the keys only
/// matter when a debit has to be signed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub address: String,
    pub public_key: String,
    pub private_key: String,
}

/// Generate a new secp256k1 keypair and derive the wallet address as the
/// first `ADDRESS_LEN` hex chars of SHA-256 over the compressed public key.
/// Addresses are effectively collision-free and carry no sequential structure.
pub fn generate_wallet() -> Wallet {
    let secp = Secp256k1::new(); // context with All capabilities
    let (sk, pk) = secp.generate_keypair(&mut OsRng);
    let compressed = pk.serialize(); // 33 bytes
    Wallet {
        address: digest_address(&compressed),
        public_key: hex::encode(compressed),
        private_key: hex::encode(sk.secret_bytes()),
    }
}

/// Derive the address for a given hex pubkey (compressed). Returns the same
/// address `generate_wallet` produced for that key.
pub fn address_for_pubkey(pubkey_hex: &str) -> Result<String, &'static str> {
    let bytes = hex::decode(pubkey_hex).map_err(|_| "invalid pubkey hex")?;
    let pk = PublicKey::from_slice(&bytes).map_err(|_| "invalid pubkey bytes")?;
    Ok(digest_address(&pk.serialize()))
}

/// Sign a 32-byte message hash with the given hex private key. Returns the
/// DER signature as hex.
pub fn sign_hash(privkey_hex: &str, msg32: [u8; 32]) -> Result<String, &'static str> {
    let secp = Secp256k1::signing_only();

    let sk_bytes = hex::decode(privkey_hex).map_err(|_| "invalid privkey hex")?;
    let sk = SecretKey::from_slice(&sk_bytes).map_err(|_| "invalid privkey bytes")?;

    let msg = Message::from_digest_slice(&msg32).map_err(|_| "invalid message length")?;
    let sig = secp.sign_ecdsa(&msg, &sk);
    Ok(hex::encode(sig.serialize_der()))
}

/// Verify a signature (hex DER) against the given pubkey (hex, compressed)
/// and message hash (32 bytes).
pub fn verify_signature_hex(
    pubkey_hex: &str,
    sig_hex: &str,
    msg32: [u8; 32],
) -> Result<bool, &'static str> {
    let secp = Secp256k1::verification_only();

    let sig_bytes = hex::decode(sig_hex).map_err(|_| "invalid signature hex")?;
    let sig = Signature::from_der(&sig_bytes).map_err(|_| "invalid DER signature")?;

    let pk_bytes = hex::decode(pubkey_hex).map_err(|_| "invalid pubkey hex")?;
    let pk = PublicKey::from_slice(&pk_bytes).map_err(|_| "invalid pubkey bytes")?;

    let msg = Message::from_digest_slice(&msg32).map_err(|_| "invalid message length")?;
    Ok(secp.verify_ecdsa(&msg, &sig, &pk).is_ok())
}

fn digest_address(pubkey_bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pubkey_bytes);
    let digest = hex::encode(hasher.finalize());
    digest[..ADDRESS_LEN].to_string()
}
