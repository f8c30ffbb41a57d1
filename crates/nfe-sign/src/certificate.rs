//! # Certificate Metadata
//!
//! The slice of X.509 the engine needs: subject, serial, validity window,
//! and the RSA public key. Certificate *files* (PFX containers, token
//! slots, chains) are managed outside this engine; what crosses the
//! boundary is DER bytes plus the narrow signing capability.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::RsaPublicKey;
use x509_cert::der::{Decode, DecodePem, Encode};
use x509_cert::Certificate;

use crate::error::SignError;

/// Metadata and public material of the certificate behind a signing
/// capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    subject: String,
    serial: String,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    /// Full certificate DER, or bare SubjectPublicKeyInfo DER for keys
    /// whose certificate is not materialized (hardware tokens expose the
    /// certificate through a separate slot object).
    material: Vec<u8>,
}

impl CertificateInfo {
    /// Parse certificate metadata from DER bytes.
    pub fn from_der(der: &[u8]) -> Result<Self, SignError> {
        let cert = Certificate::from_der(der).map_err(|e| SignError::VerificationFailed {
            reason: format!("unparseable certificate: {e}"),
        })?;
        let tbs = &cert.tbs_certificate;
        let subject = tbs.subject.to_string();
        let serial = hex(tbs.serial_number.as_bytes());
        let not_before: DateTime<Utc> = tbs.validity.not_before.to_system_time().into();
        let not_after: DateTime<Utc> = tbs.validity.not_after.to_system_time().into();
        Ok(Self {
            subject,
            serial,
            not_before,
            not_after,
            material: der.to_vec(),
        })
    }

    /// Parse certificate metadata from PEM text.
    pub fn from_pem(pem: &str) -> Result<Self, SignError> {
        let cert = Certificate::from_pem(pem).map_err(|e| SignError::VerificationFailed {
            reason: format!("unparseable certificate: {e}"),
        })?;
        let der = cert.to_der().map_err(|e| SignError::VerificationFailed {
            reason: format!("certificate re-encode failed: {e}"),
        })?;
        Self::from_der(&der)
    }

    /// Build metadata for a key without a materialized certificate.
    ///
    /// The key material stored is the bare SubjectPublicKeyInfo; serial
    /// is reported as `00`.
    pub fn for_public_key(
        subject: impl Into<String>,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
        key: &RsaPublicKey,
    ) -> Result<Self, SignError> {
        let spki = key
            .to_public_key_der()
            .map_err(|e| SignError::SigningKeyUnavailable {
                reason: format!("public key encode failed: {e}"),
            })?;
        Ok(Self {
            subject: subject.into(),
            serial: "00".into(),
            not_before,
            not_after,
            material: spki.as_bytes().to_vec(),
        })
    }

    /// The certificate subject in RFC 4514 form.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The serial number, lowercase hex.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Start of the validity window.
    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    /// End of the validity window.
    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Whether the certificate is inside its validity window at `at`.
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        at >= self.not_before && at <= self.not_after
    }

    /// The DER key material carried into the signature's `KeyInfo`.
    pub fn material(&self) -> &[u8] {
        &self.material
    }

    /// The key material, base64-encoded for the `X509Certificate` element.
    pub fn material_base64(&self) -> String {
        BASE64.encode(&self.material)
    }

    /// Extract the RSA public key from the stored material.
    pub fn public_key(&self) -> Result<RsaPublicKey, SignError> {
        public_key_from_material(&self.material)
    }
}

/// Extract an RSA public key from `KeyInfo` material: a full certificate
/// or a bare SubjectPublicKeyInfo.
pub fn public_key_from_material(der: &[u8]) -> Result<RsaPublicKey, SignError> {
    if let Ok(cert) = Certificate::from_der(der) {
        let spki = cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| SignError::VerificationFailed {
                reason: format!("certificate public key encode failed: {e}"),
            })?;
        return RsaPublicKey::from_public_key_der(&spki).map_err(|e| {
            SignError::VerificationFailed {
                reason: format!("certificate carries a non-RSA key: {e}"),
            }
        });
    }
    RsaPublicKey::from_public_key_der(der).map_err(|e| SignError::VerificationFailed {
        reason: format!("key material is neither certificate nor public key: {e}"),
    })
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_key() -> &'static rsa::RsaPrivateKey {
        use std::sync::OnceLock;
        static KEY: OnceLock<rsa::RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| {
            let mut rng = rand::thread_rng();
            rsa::RsaPrivateKey::new(&mut rng, 2048).expect("generate test key")
        })
    }

    #[test]
    fn metadata_for_public_key_round_trips() {
        let key = test_key();
        let now = Utc::now();
        let info = CertificateInfo::for_public_key(
            "CN=Test Issuer",
            now - Duration::days(1),
            now + Duration::days(1),
            &key.to_public_key(),
        )
        .expect("metadata");
        assert_eq!(info.subject(), "CN=Test Issuer");
        assert!(info.is_valid_at(now));
        assert_eq!(info.public_key().expect("public key"), key.to_public_key());
    }

    #[test]
    fn validity_window_is_inclusive() {
        let key = test_key();
        let start = Utc::now();
        let end = start + Duration::hours(1);
        let info =
            CertificateInfo::for_public_key("CN=T", start, end, &key.to_public_key())
                .expect("metadata");
        assert!(info.is_valid_at(start));
        assert!(info.is_valid_at(end));
        assert!(!info.is_valid_at(end + Duration::seconds(1)));
        assert!(!info.is_valid_at(start - Duration::seconds(1)));
    }

    #[test]
    fn garbage_der_is_rejected() {
        assert!(CertificateInfo::from_der(&[0x30, 0x00, 0xff]).is_err());
        assert!(public_key_from_material(b"not der").is_err());
    }

    #[test]
    fn material_base64_decodes_back() {
        let key = test_key();
        let now = Utc::now();
        let info = CertificateInfo::for_public_key(
            "CN=B64",
            now,
            now + Duration::days(1),
            &key.to_public_key(),
        )
        .expect("metadata");
        let decoded = BASE64.decode(info.material_base64()).expect("decode");
        assert_eq!(decoded, info.material());
    }
}
