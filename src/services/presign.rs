//! src/services/presign.rs
//!
//! Minting and verification of presigned blob URLs. A URL carries the
//! expiry and an HMAC-SHA256 signature over method, key, content type,
//! and expiry; holding it grants exactly that one operation until it
//! expires. No session state lives server-side.

use crate::models::transfer::{PresignedTransfer, TransferDirection};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Bytes escaped inside one path segment of a blob URL. Separators are
/// added so a segment can never smuggle extra path structure.
const SEGMENT_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'\\')
    .add(b'^')
    .add(b'|')
    .add(b'&')
    .add(b'+');

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PresignError {
    #[error("signature expired at {0}")]
    Expired(DateTime<Utc>),
    #[error("signature mismatch")]
    BadSignature,
    #[error("malformed expiry timestamp")]
    BadExpiry,
}

/// Issues and checks presigned URLs for the blob endpoints.
#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
    public_base: String,
    ttl: Duration,
}

impl UrlSigner {
    pub fn new(secret: impl Into<Vec<u8>>, public_base: impl Into<String>, ttl_secs: i64) -> Self {
        let public_base = public_base.into().trim_end_matches('/').to_string();
        Self {
            secret: secret.into(),
            public_base,
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Mint a transfer URL for `key`. Uploads bind the content type into
    /// the signature; downloads sign with an empty one.
    pub fn presign(
        &self,
        direction: TransferDirection,
        key: &str,
        content_type: Option<&str>,
    ) -> PresignedTransfer {
        let expires_at = Utc::now() + self.ttl;
        let expires = expires_at.timestamp();
        let signature = self.signature(&canonical_string(
            method_of(direction),
            key,
            content_type.unwrap_or(""),
            expires,
        ));
        let url = format!(
            "{}/blob/{}?expires={}&signature={}",
            self.public_base,
            encode_key_path(key),
            expires,
            signature
        );
        PresignedTransfer {
            url,
            key: key.to_string(),
            direction,
            expires_at: Some(expires_at),
            content_type: content_type.map(str::to_string),
        }
    }

    /// Check a presented signature against the decoded key and the
    /// request's content type. Expiry is checked first; the comparison
    /// itself is constant-time.
    pub fn verify(
        &self,
        direction: TransferDirection,
        key: &str,
        content_type: Option<&str>,
        expires: i64,
        signature: &str,
    ) -> Result<(), PresignError> {
        let expires_at =
            DateTime::<Utc>::from_timestamp(expires, 0).ok_or(PresignError::BadExpiry)?;
        if expires_at < Utc::now() {
            return Err(PresignError::Expired(expires_at));
        }

        let canonical = canonical_string(
            method_of(direction),
            key,
            content_type.unwrap_or(""),
            expires,
        );
        let presented = general_purpose::URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| PresignError::BadSignature)?;
        let mut mac = new_mac(&self.secret);
        mac.update(canonical.as_bytes());
        mac.verify_slice(&presented)
            .map_err(|_| PresignError::BadSignature)
    }

    fn signature(&self, canonical: &str) -> String {
        let mut mac = new_mac(&self.secret);
        mac.update(canonical.as_bytes());
        general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }
}

fn new_mac(secret: &[u8]) -> HmacSha256 {
    // HMAC accepts keys of any length.
    HmacSha256::new_from_slice(secret).expect("HMAC key of any length")
}

fn method_of(direction: TransferDirection) -> &'static str {
    match direction {
        TransferDirection::Upload => "PUT",
        TransferDirection::Download => "GET",
    }
}

fn canonical_string(method: &str, key: &str, content_type: &str, expires: i64) -> String {
    format!("{method}\n{key}\n{content_type}\n{expires}")
}

/// Percent-encode each segment of `key`, keeping the separators literal
/// so the server's wildcard route sees the same path shape.
pub fn encode_key_path(key: &str) -> String {
    key.split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT_ENCODE_SET).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> UrlSigner {
        UrlSigner::new(b"test-secret".to_vec(), "http://127.0.0.1:3000", 300)
    }

    fn query_param<'a>(url: &'a str, name: &str) -> &'a str {
        let query = url.split_once('?').map(|(_, q)| q).unwrap_or("");
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix(&format!("{name}=")))
            .unwrap_or("")
    }

    #[test]
    fn minted_upload_url_verifies() {
        let signer = signer();
        let key = "uploadedfiles/IT/Linux Notes/setup.pdf";
        let transfer = signer.presign(TransferDirection::Upload, key, Some("application/pdf"));

        assert!(transfer.url.contains("/blob/uploadedfiles/IT/Linux%20Notes/setup.pdf"));
        let expires: i64 = query_param(&transfer.url, "expires").parse().unwrap();
        let signature = query_param(&transfer.url, "signature").to_string();

        signer
            .verify(
                TransferDirection::Upload,
                key,
                Some("application/pdf"),
                expires,
                &signature,
            )
            .unwrap();
    }

    #[test]
    fn tampered_key_or_signature_is_rejected() {
        let signer = signer();
        let key = "uploadedfiles/IT/Linux Notes/setup.pdf";
        let transfer = signer.presign(TransferDirection::Download, key, None);
        let expires: i64 = query_param(&transfer.url, "expires").parse().unwrap();
        let signature = query_param(&transfer.url, "signature").to_string();

        // Different key, same signature.
        assert_eq!(
            signer.verify(
                TransferDirection::Download,
                "uploadedfiles/IT/Linux Notes/other.pdf",
                None,
                expires,
                &signature,
            ),
            Err(PresignError::BadSignature)
        );

        // Mangled signature bytes.
        let mangled = format!("{}AA", &signature[..signature.len() - 2]);
        assert_eq!(
            signer.verify(TransferDirection::Download, key, None, expires, &mangled),
            Err(PresignError::BadSignature)
        );

        // Signature is not even base64.
        assert_eq!(
            signer.verify(TransferDirection::Download, key, None, expires, "!!!"),
            Err(PresignError::BadSignature)
        );
    }

    #[test]
    fn direction_and_content_type_are_bound_into_the_signature() {
        let signer = signer();
        let key = "uploadedfiles/IT/Linux Notes/setup.pdf";
        let transfer = signer.presign(TransferDirection::Upload, key, Some("application/pdf"));
        let expires: i64 = query_param(&transfer.url, "expires").parse().unwrap();
        let signature = query_param(&transfer.url, "signature").to_string();

        // An upload URL cannot be replayed as a download...
        assert!(
            signer
                .verify(TransferDirection::Download, key, None, expires, &signature)
                .is_err()
        );
        // ...nor with a different content type.
        assert!(
            signer
                .verify(
                    TransferDirection::Upload,
                    key,
                    Some("text/plain"),
                    expires,
                    &signature,
                )
                .is_err()
        );
    }

    #[test]
    fn expired_signature_is_rejected_without_checking_bytes() {
        let past = UrlSigner::new(b"test-secret".to_vec(), "http://127.0.0.1:3000", -10);
        let key = "uploadedfiles/IT/Linux Notes/setup.pdf";
        let transfer = past.presign(TransferDirection::Download, key, None);
        let expires: i64 = query_param(&transfer.url, "expires").parse().unwrap();
        let signature = query_param(&transfer.url, "signature").to_string();

        assert!(matches!(
            past.verify(TransferDirection::Download, key, None, expires, &signature),
            Err(PresignError::Expired(_))
        ));
    }

    #[test]
    fn key_segments_are_escaped_but_separators_kept() {
        assert_eq!(
            encode_key_path("uploadedfiles/IT/Linux Notes/setup v2.pdf"),
            "uploadedfiles/IT/Linux%20Notes/setup%20v2.pdf"
        );
        assert_eq!(
            encode_key_path("uploadedfiles/R&D/C++ Notes/a.pdf"),
            "uploadedfiles/R%26D/C%2B%2B%20Notes/a.pdf"
        );
    }
}
