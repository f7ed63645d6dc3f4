//! Ethereum personal-message signature verification.

use alloy_primitives::{eip191_hash_message, keccak256, Address};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

/// Length of an `r || s || v` signature.
pub const SIGNATURE_LEN: usize = 65;

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("Invalid signature encoding: {0}")]
    InvalidEncoding(String),

    #[error("Invalid signature length: expected 65 bytes, got {0}")]
    InvalidLength(usize),

    #[error("Invalid recovery id: {0}")]
    InvalidRecoveryId(u8),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Public key recovery failed: {0}")]
    Recovery(String),
}

/// Checks that a signature over a message was produced by a claimed address.
///
/// Implementations must verify over exactly the bytes of `message` and never
/// panic on malformed input.
pub trait SignatureVerifier: Send + Sync {
    fn verify(
        &self,
        message: &str,
        signature: &[u8],
        claimed_address: &str,
    ) -> Result<bool, SignatureError>;
}

/// secp256k1 recovery over the EIP-191 personal-message digest
/// (`keccak256("\x19Ethereum Signed Message:\n" || len || message)`).
#[derive(Debug, Default, Clone, Copy)]
pub struct PersonalMessageVerifier;

impl SignatureVerifier for PersonalMessageVerifier {
    fn verify(
        &self,
        message: &str,
        signature: &[u8],
        claimed_address: &str,
    ) -> Result<bool, SignatureError> {
        let claimed = parse_address(claimed_address)?;
        let recovered = recover_address(message, signature)?;
        Ok(recovered == claimed)
    }
}

/// Recover the address that signed `message`.
pub fn recover_address(message: &str, signature: &[u8]) -> Result<Address, SignatureError> {
    if signature.len() != SIGNATURE_LEN {
        return Err(SignatureError::InvalidLength(signature.len()));
    }

    let recovery_id = match signature[64] {
        0 | 27 => 0,
        1 | 28 => 1,
        v => return Err(SignatureError::InvalidRecoveryId(v)),
    };
    let recovery_id = RecoveryId::from_byte(recovery_id)
        .ok_or(SignatureError::InvalidRecoveryId(signature[64]))?;

    let signature = Signature::from_slice(&signature[..64])
        .map_err(|e| SignatureError::InvalidSignature(e.to_string()))?;

    let digest = eip191_hash_message(message.as_bytes());
    let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &signature, recovery_id)
        .map_err(|e| SignatureError::Recovery(e.to_string()))?;

    Ok(address_of(&key))
}

/// Ethereum address of a public key: the last 20 bytes of keccak256 over the
/// uncompressed point without its 0x04 prefix.
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Parse an address in any letter case.
pub fn parse_address(value: &str) -> Result<Address, SignatureError> {
    let hex_part = value
        .strip_prefix("0x")
        .ok_or_else(|| SignatureError::InvalidAddress("missing 0x prefix".to_string()))?;
    if hex_part.len() != 40 {
        return Err(SignatureError::InvalidAddress(format!(
            "expected 40 hex characters, got {}",
            hex_part.len()
        )));
    }
    value
        .parse::<Address>()
        .map_err(|e| SignatureError::InvalidAddress(e.to_string()))
}

/// Decode a `0x`-prefixed hex signature.
pub fn decode_signature(value: &str) -> Result<Vec<u8>, SignatureError> {
    let hex_part = value.strip_prefix("0x").unwrap_or(value);
    let bytes = hex::decode(hex_part).map_err(|e| SignatureError::InvalidEncoding(e.to_string()))?;
    if bytes.len() != SIGNATURE_LEN {
        return Err(SignatureError::InvalidLength(bytes.len()));
    }
    Ok(bytes)
}

/// Sign `message` the way a wallet's `personal_sign` does: 65 bytes with `v` in {27, 28}.
pub fn sign_personal_message(key: &SigningKey, message: &str) -> Result<Vec<u8>, SignatureError> {
    let digest = eip191_hash_message(message.as_bytes());
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(digest.as_slice())
        .map_err(|e| SignatureError::InvalidSignature(e.to_string()))?;

    let mut bytes = Vec::with_capacity(SIGNATURE_LEN);
    bytes.extend_from_slice(&signature.to_bytes());
    bytes.push(recovery_id.to_byte() + 27);
    Ok(bytes)
}
