//! Process-lifetime asymmetric identity used for key transport.
//!
//! Requesters encrypt their session key to the published X25519 public key:
//!
//! ```text
//! sealed = eph_pub (32) || nonce (24) || XChaCha20-Poly1305(k, aad = node_pub, key) || tag (16)
//! k      = HKDF-SHA256(ikm = X25519(eph, node), salt = eph_pub || node_pub, info = KEY_TRANSPORT_INFO)
//! ```
//!
//! The secret never leaves this struct and is regenerated on every start, so a
//! restart invalidates every outstanding session.

use base16ct::lower::encode_string;
use base64::Engine;
use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::Zeroizing;

use super::cipher::{self, KEY_LEN, NONCE_LEN, TAG_LEN};
use crate::constants::KEY_TRANSPORT_INFO;
use crate::error::{DecryptionError, EncryptionError};

const PUBLIC_LEN: usize = 32;

pub struct NodeIdentity {
    secret: StaticSecret,
    public: PublicKey,
    public_b64: String,
    fingerprint: String,
}

impl NodeIdentity {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        let public_b64 = base64::engine::general_purpose::STANDARD.encode(public.as_bytes());
        let fingerprint = fingerprint_of(public.as_bytes());
        Self {
            secret,
            public,
            public_b64,
            fingerprint,
        }
    }

    /// Base64 of the raw 32-byte public key, as published to requesters.
    pub fn public_key(&self) -> &str {
        &self.public_b64
    }

    pub fn public_key_bytes(&self) -> &[u8; PUBLIC_LEN] {
        self.public.as_bytes()
    }

    /// Lowercase hex of the first 16 bytes of SHA-256(public key).
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Open a blob produced by [`seal_for`] against this identity.
    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        if sealed.len() < PUBLIC_LEN + NONCE_LEN + TAG_LEN {
            return Err(DecryptionError::Truncated);
        }
        let (eph_bytes, rest) = sealed.split_at(PUBLIC_LEN);
        let mut eph = [0u8; PUBLIC_LEN];
        eph.copy_from_slice(eph_bytes);
        let eph_pub = PublicKey::from(eph);

        let shared = self.secret.diffie_hellman(&eph_pub);
        if !shared.was_contributory() {
            return Err(DecryptionError::Authentication);
        }
        let key = transport_key(shared.as_bytes(), &eph, self.public.as_bytes())?;
        cipher::open(&key, self.public.as_bytes(), rest)
    }
}

impl std::fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

/// Requester side of key transport: encrypt `plaintext` to a published key.
pub fn seal_for(public_key_b64: &str, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let node_pub = decode_public_key(public_key_b64).map_err(|_| EncryptionError)?;
    let eph = EphemeralSecret::random_from_rng(OsRng);
    let eph_pub = PublicKey::from(&eph);
    let shared = eph.diffie_hellman(&node_pub);
    if !shared.was_contributory() {
        return Err(EncryptionError);
    }
    let key = transport_key(shared.as_bytes(), eph_pub.as_bytes(), node_pub.as_bytes())
        .map_err(|_| EncryptionError)?;
    let body = cipher::seal(&key, node_pub.as_bytes(), plaintext)?;
    let mut out = Vec::with_capacity(PUBLIC_LEN + body.len());
    out.extend_from_slice(eph_pub.as_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

pub fn decode_public_key(public_key_b64: &str) -> Result<PublicKey, DecryptionError> {
    let raw = base64::engine::general_purpose::STANDARD
        .decode(public_key_b64.trim())
        .map_err(|_| DecryptionError::MalformedKey)?;
    let arr: [u8; PUBLIC_LEN] = raw
        .as_slice()
        .try_into()
        .map_err(|_| DecryptionError::MalformedKey)?;
    Ok(PublicKey::from(arr))
}

pub fn fingerprint_of(public_key: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(public_key);
    let digest = h.finalize();
    encode_string(&digest[..16])
}

fn transport_key(
    shared: &[u8; 32],
    eph_pub: &[u8; PUBLIC_LEN],
    node_pub: &[u8; PUBLIC_LEN],
) -> Result<Zeroizing<[u8; KEY_LEN]>, DecryptionError> {
    let mut salt = [0u8; PUBLIC_LEN * 2];
    salt[..PUBLIC_LEN].copy_from_slice(eph_pub);
    salt[PUBLIC_LEN..].copy_from_slice(node_pub);
    let mut okm = Zeroizing::new([0u8; KEY_LEN]);
    hkdf_expand(shared, &salt, &mut okm[..])?;
    Ok(okm)
}

fn hkdf_expand(ikm: &[u8], salt: &[u8], okm: &mut [u8]) -> Result<(), DecryptionError> {
    Hkdf::<Sha256>::new(Some(salt), ikm)
        .expand(KEY_TRANSPORT_INFO, okm)
        .map_err(|_| DecryptionError::KeyDerivation)
}
