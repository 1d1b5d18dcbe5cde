//! Decryption of nested (encrypted, then signed) tokens.
//!
//! Compact form: `protected-header . iv . ciphertext . tag`, using direct
//! content encryption (`alg: "dir"`) with `A128GCM` or `A256GCM`. The
//! additional authenticated data is the encoded protected header.

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, AeadCore, Nonce, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, KeyInit};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::jwk::{AlgorithmParameters, JwkSet};
use serde::Deserialize;

use mechanisms_sdk::MechanismError;

use super::keys;

const GCM_IV_LEN: usize = 12;

#[derive(Debug, Deserialize)]
struct ProtectedHeader {
    alg: String,
    enc: String,
    #[serde(default)]
    kid: Option<String>,
}

/// Decrypts `token` with a symmetric key from `jwks` and returns the inner
/// signed token.
///
/// # Errors
/// [`MechanismError::InvalidFormat`] for malformed segments or unsupported
/// algorithms, [`MechanismError::KeyResolution`] when no single usable key
/// matches, [`MechanismError::Verification`] when decryption fails.
pub fn decrypt(token: &str, jwks: &JwkSet) -> Result<String, MechanismError> {
    let segments: Vec<&str> = token.split('.').collect();
    let [header_b64, iv_b64, ciphertext_b64, tag_b64] = segments.as_slice() else {
        return Err(MechanismError::InvalidFormat("invalid jwt format".to_owned()));
    };

    let header: ProtectedHeader = serde_json::from_slice(&decode_segment("header", header_b64)?)
        .map_err(|e| MechanismError::InvalidFormat(format!("malformed encryption header: {e}")))?;
    if header.alg != "dir" {
        return Err(MechanismError::InvalidFormat(format!(
            "unsupported key management algorithm '{}'",
            header.alg
        )));
    }

    let key = keys::resolve(jwks, &[header.kid.as_deref()])?;
    let AlgorithmParameters::OctetKey(params) = &key.algorithm else {
        return Err(MechanismError::KeyResolution(
            "decryption key must be a symmetric key".to_owned(),
        ));
    };
    let key_bytes = URL_SAFE_NO_PAD
        .decode(params.value.as_bytes())
        .map_err(|e| MechanismError::KeyResolution(format!("malformed decryption key: {e}")))?;

    let iv: [u8; GCM_IV_LEN] = decode_segment("iv", iv_b64)?.try_into().map_err(|_| {
        MechanismError::InvalidFormat(format!("initialization vector must be {GCM_IV_LEN} bytes"))
    })?;
    let mut sealed = decode_segment("ciphertext", ciphertext_b64)?;
    sealed.extend_from_slice(&decode_segment("tag", tag_b64)?);

    let aad = header_b64.as_bytes();
    let plaintext = match header.enc.as_str() {
        "A128GCM" => open::<Aes128Gcm>(&key_bytes, iv, &sealed, aad)?,
        "A256GCM" => open::<Aes256Gcm>(&key_bytes, iv, &sealed, aad)?,
        other => {
            return Err(MechanismError::InvalidFormat(format!(
                "unsupported content encryption '{other}'"
            )));
        }
    };

    let inner = String::from_utf8(plaintext)
        .map_err(|_| MechanismError::InvalidFormat("nested token is not valid UTF-8".to_owned()))?;
    if inner.matches('.').count() != 2 {
        return Err(MechanismError::InvalidFormat(
            "nested token does not contain a signed token".to_owned(),
        ));
    }
    Ok(inner)
}

fn decode_segment(name: &str, segment: &str) -> Result<Vec<u8>, MechanismError> {
    URL_SAFE_NO_PAD
        .decode(segment.as_bytes())
        .map_err(|e| MechanismError::InvalidFormat(format!("malformed {name} segment: {e}")))
}

fn open<C>(
    key: &[u8],
    iv: [u8; GCM_IV_LEN],
    sealed: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, MechanismError>
where
    C: Aead + AeadCore<NonceSize = U12> + KeyInit,
{
    let cipher = C::new_from_slice(key).map_err(|_| {
        MechanismError::KeyResolution("decryption key length does not match the content encryption".to_owned())
    })?;
    cipher
        .decrypt(&Nonce::<C>::from(iv), Payload { msg: sealed, aad })
        .map_err(|_| MechanismError::Verification("failed to decrypt token".to_owned()))
}
