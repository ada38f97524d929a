//! Signer recovery from 65-byte ECDSA signatures.
//!
//! Recovery is behind [`SignatureRecoverer`] so the engine can be tested with a
//! deterministic fake; [`EcdsaRecoverer`] is the secp256k1 implementation.

use alloy_primitives::{uint, Address, Signature, B256, U256};
use thiserror::Error;

/// Length of an `r ++ s ++ v` signature.
pub const SIGNATURE_LENGTH: usize = 65;

/// secp256k1 group order divided by two. Signatures with a larger `s` are the
/// malleable twin of a low-`s` signature.
const SECP256K1N_HALF: U256 =
    uint!(0x7FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF5D576E7357A4501DDFE92F46681B20A0_U256);

/// Why a signature could not yield a signer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature must be 65 bytes, got {0}")]
    InvalidLength(usize),

    #[error("recovery id must be 27 or 28, got {0}")]
    InvalidRecoveryId(u8),

    #[error("signature s value is in the upper half of the curve order")]
    HighS,

    #[error("public key recovery failed: {0}")]
    Recovery(String),

    #[error("signature recovers to the zero address")]
    ZeroAddress,
}

/// Recovers the address that produced a signature over a digest.
pub trait SignatureRecoverer: Send + Sync {
    fn recover(&self, digest: B256, signature: &[u8]) -> Result<Address, SignatureError>;
}

/// secp256k1 public key recovery with Ethereum's `v` in {27, 28}.
#[derive(Debug, Clone, Copy, Default)]
pub struct EcdsaRecoverer;

impl EcdsaRecoverer {
    /// Validate and split a raw signature.
    pub fn parse(signature: &[u8]) -> Result<Signature, SignatureError> {
        if signature.len() != SIGNATURE_LENGTH {
            return Err(SignatureError::InvalidLength(signature.len()));
        }

        let r = U256::from_be_slice(&signature[..32]);
        let s = U256::from_be_slice(&signature[32..64]);
        let v = signature[64];

        let y_parity = match v {
            27 => false,
            28 => true,
            other => return Err(SignatureError::InvalidRecoveryId(other)),
        };

        if s > SECP256K1N_HALF {
            return Err(SignatureError::HighS);
        }

        Ok(Signature::new(r, s, y_parity))
    }
}

impl SignatureRecoverer for EcdsaRecoverer {
    fn recover(&self, digest: B256, signature: &[u8]) -> Result<Address, SignatureError> {
        let parsed = Self::parse(signature)?;

        let signer = parsed
            .recover_address_from_prehash(&digest)
            .map_err(|e| SignatureError::Recovery(e.to_string()))?;

        if signer == Address::ZERO {
            return Err(SignatureError::ZeroAddress);
        }

        Ok(signer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::keccak256;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;
    use std::str::FromStr;

    const TEST_PRIVATE_KEY: &str =
        "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn signed_digest() -> (PrivateKeySigner, B256, Vec<u8>) {
        let signer = PrivateKeySigner::from_str(TEST_PRIVATE_KEY).unwrap();
        let digest = keccak256(b"conditional order");
        let signature = signer.sign_hash_sync(&digest).unwrap();
        (signer, digest, signature.as_bytes().to_vec())
    }

    #[test]
    fn test_recover_round_trip() {
        let (signer, digest, signature) = signed_digest();
        let recovered = EcdsaRecoverer.recover(digest, &signature).unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[test]
    fn test_recover_other_digest_gives_other_address() {
        let (signer, _, signature) = signed_digest();
        let recovered = EcdsaRecoverer
            .recover(keccak256(b"something else"), &signature)
            .unwrap_or(Address::ZERO);
        assert_ne!(recovered, signer.address());
    }

    #[test]
    fn test_wrong_length() {
        let (_, digest, signature) = signed_digest();
        assert_eq!(
            EcdsaRecoverer.recover(digest, &signature[..64]),
            Err(SignatureError::InvalidLength(64))
        );

        let mut long = signature.clone();
        long.push(0);
        assert_eq!(
            EcdsaRecoverer.recover(digest, &long),
            Err(SignatureError::InvalidLength(66))
        );
    }

    #[test]
    fn test_invalid_recovery_id() {
        let (_, digest, mut signature) = signed_digest();
        for v in [0u8, 1, 26, 29, 35] {
            signature[64] = v;
            assert_eq!(
                EcdsaRecoverer.recover(digest, &signature),
                Err(SignatureError::InvalidRecoveryId(v))
            );
        }
    }

    #[test]
    fn test_high_s_rejected() {
        let (_, digest, mut signature) = signed_digest();
        signature[32..64].copy_from_slice(&[0xff; 32]);
        assert_eq!(
            EcdsaRecoverer.recover(digest, &signature),
            Err(SignatureError::HighS)
        );
    }

    #[test]
    fn test_zero_r_fails_recovery() {
        let (_, digest, mut signature) = signed_digest();
        signature[..32].copy_from_slice(&[0u8; 32]);
        assert!(matches!(
            EcdsaRecoverer.recover(digest, &signature),
            Err(SignatureError::Recovery(_))
        ));
    }
}
