// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use crate::model::ModelError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

/// Ed25519 key material attached to every entity. Keys are stored base64 encoded. An identity
/// created on behalf of another entity carries that entity's signature over its public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub public: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Identity {
    pub fn generate() -> Self {
        let signing = SigningKey::from_bytes(&rand::random::<[u8; 32]>());
        Self {
            public: STANDARD.encode(signing.verifying_key().to_bytes()),
            private: Some(STANDARD.encode(signing.to_bytes())),
            signature: None,
        }
    }

    /// Generate a fresh identity whose public key is signed by `creator`.
    pub fn generate_signed_by(creator: &Identity) -> Result<Self, ModelError> {
        let mut identity = Self::generate();
        identity.signature = Some(creator.sign(identity.public.as_bytes())?);
        Ok(identity)
    }

    /// Public identity with no private material, used as a stable marker (freeze, destroy).
    pub fn public_only(&self) -> Self {
        Self {
            public: self.public.clone(),
            private: None,
            signature: None,
        }
    }

    pub fn sign(&self, message: &[u8]) -> Result<String, ModelError> {
        let private = self
            .private
            .as_ref()
            .ok_or_else(|| ModelError::Identity("no private key to sign with".to_string()))?;
        let bytes: [u8; 32] = decode_fixed(private)?;
        let signing = SigningKey::from_bytes(&bytes);
        Ok(STANDARD.encode(signing.sign(message).to_bytes()))
    }

    pub fn verify(&self, message: &[u8], signature: &str) -> Result<bool, ModelError> {
        let public: [u8; 32] = decode_fixed(&self.public)?;
        let verifying = VerifyingKey::from_bytes(&public)
            .map_err(|e| ModelError::Identity(e.to_string()))?;
        let signature: [u8; 64] = decode_fixed(signature)?;
        Ok(verifying
            .verify(message, &Signature::from_bytes(&signature))
            .is_ok())
    }

    /// True if this identity's public key was signed by `creator`.
    pub fn signed_by(&self, creator: &Identity) -> bool {
        match &self.signature {
            Some(signature) => creator
                .verify(self.public.as_bytes(), signature)
                .unwrap_or(false),
            None => false,
        }
    }
}

fn decode_fixed<const N: usize>(encoded: &str) -> Result<[u8; N], ModelError> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| ModelError::Identity(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| ModelError::Identity(format!("expected {N} bytes of key material")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_identity_signed_by_creator() {
        let creator = Identity::generate();
        let child = Identity::generate_signed_by(&creator).unwrap();
        assert!(child.signed_by(&creator));
        assert!(!child.signed_by(&Identity::generate()));
    }

    #[test]
    fn test_public_only_cannot_sign() {
        let identity = Identity::generate().public_only();
        assert!(identity.sign(b"hello").is_err());
    }
}
