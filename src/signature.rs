//! Recoverable secp256k1 signatures over registration messages
//!
//! Registration requests are authenticated by recovering the signer's
//! public key from the signature and comparing its compressed
//! serialization against the wallet-service pubkey in the request path.

use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Recover the compressed public key (lowercase hex) that signed the
/// UTF-8 bytes of `message`.
///
/// The signature is hex of 65 bytes: a recovery header followed by the
/// 64-byte compact signature over the SHA-256 digest of the message.
/// The header is either a raw recovery id (`0..=3`) or one of the
/// conventional compressed-key message headers (`27..=34`).
pub fn recover_signer(message: &str, signature_hex: &str) -> Result<String> {
    let raw = hex::decode(signature_hex)
        .map_err(|_| Error::unauthenticated("signature is not valid hex"))?;
    if raw.len() != 65 {
        return Err(Error::unauthenticated(format!(
            "signature must be 65 bytes, got {}",
            raw.len()
        )));
    }

    let recovery_id = parse_recovery_header(raw[0])?;
    let signature = RecoverableSignature::from_compact(&raw[1..], recovery_id)
        .map_err(|e| Error::unauthenticated(format!("malformed signature: {e}")))?;

    let digest: [u8; 32] = Sha256::digest(message.as_bytes()).into();
    let digest = Message::from_digest(digest);

    let pubkey = Secp256k1::verification_only()
        .recover_ecdsa(&digest, &signature)
        .map_err(|e| Error::unauthenticated(format!("signature recovery failed: {e}")))?;

    Ok(hex::encode(pubkey.serialize()))
}

/// Verify that the signature over `message` recovers to `expected_pubkey`
/// (hex-encoded 33-byte compressed secp256k1 key).
pub fn verify(message: &str, signature_hex: &str, expected_pubkey: &str) -> Result<()> {
    let recovered = recover_signer(message, signature_hex)?;
    if !recovered.eq_ignore_ascii_case(expected_pubkey) {
        return Err(Error::unauthenticated(
            "signature does not match wallet pubkey",
        ));
    }
    Ok(())
}

/// Produce a signature accepted by [`verify`]. This is the reference
/// producer for wallet-service clients and for tests.
pub fn sign(secret_key: &SecretKey, message: &str) -> String {
    let digest: [u8; 32] = Sha256::digest(message.as_bytes()).into();
    let digest = Message::from_digest(digest);

    let (recovery_id, compact) = Secp256k1::new()
        .sign_ecdsa_recoverable(&digest, secret_key)
        .serialize_compact();

    let mut raw = Vec::with_capacity(65);
    raw.push(recovery_id.to_i32() as u8);
    raw.extend_from_slice(&compact);
    hex::encode(raw)
}

fn parse_recovery_header(header: u8) -> Result<RecoveryId> {
    let id = match header {
        0..=3 => i32::from(header),
        27..=34 => i32::from((header - 27) & 3),
        other => {
            return Err(Error::unauthenticated(format!(
                "invalid recovery header byte {other}"
            )))
        }
    };
    RecoveryId::from_i32(id).map_err(|e| Error::unauthenticated(format!("invalid recovery id: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::PublicKey;

    fn keypair(seed: u8) -> (SecretKey, String) {
        let secret_key = SecretKey::from_slice(&[seed; 32]).unwrap();
        let pubkey = PublicKey::from_secret_key(&Secp256k1::new(), &secret_key);
        (secret_key, hex::encode(pubkey.serialize()))
    }

    #[test]
    fn sign_then_recover_roundtrip() {
        let (secret_key, pubkey) = keypair(1);
        let message = "https://push.example/hook-02aa-beef-[\"wss://r1\"]";
        let signature = sign(&secret_key, message);

        assert_eq!(recover_signer(message, &signature).unwrap(), pubkey);
        verify(message, &signature, &pubkey).unwrap();
    }

    #[test]
    fn accepts_conventional_message_headers() {
        let (secret_key, pubkey) = keypair(2);
        let message = "1700000000-02aa-beef";
        let signature = sign(&secret_key, &message);

        // Same signature with the Bitcoin-style compressed header byte.
        let mut raw = hex::decode(&signature).unwrap();
        raw[0] += 31;
        verify(message, &hex::encode(raw), &pubkey).unwrap();
    }

    #[test]
    fn rejects_signature_from_another_key() {
        let (secret_key, _) = keypair(3);
        let (_, other_pubkey) = keypair(4);
        let message = "anything";
        let signature = sign(&secret_key, message);

        let err = verify(message, &signature, &other_pubkey).unwrap_err();
        assert!(matches!(err, Error::Unauthenticated { .. }));
    }

    #[test]
    fn rejects_signature_over_different_message() {
        let (secret_key, pubkey) = keypair(5);
        let signature = sign(&secret_key, "message one");

        // Recovery succeeds but yields a different key.
        assert!(verify("message two", &signature, &pubkey).is_err());
    }

    #[test]
    fn rejects_garbage_signatures() {
        assert!(recover_signer("msg", "not hex").is_err());
        assert!(recover_signer("msg", "abcd").is_err());
        assert!(recover_signer("msg", &"ff".repeat(65)).is_err());
    }
}
