//! # Signing Capability Providers
//!
//! Abstracts the private key behind a narrow trait, enabling multiple
//! backends:
//!
//! - [`FileKeyProvider`]: RSA private key held in process memory (loaded
//!   from a PKCS#8 file by the caller). Signs concurrently.
//! - [`TokenKeyProvider`]: wraps a hardware-token signing callback (e.g. a
//!   PKCS#11 session). Tokens process one operation at a time, so all
//!   signing through one provider is serialized behind a mutex.
//!
//! ## Security Invariants
//!
//! - Private keys never leave the provider; the trait exposes only
//!   `sign_digest` and certificate metadata.
//! - `FileKeyProvider` key material is zeroized on drop (the `rsa` crate
//!   zeroizes its key integers).
//! - Providers are `Send + Sync` and object-safe, shared via `Arc` across
//!   emission tasks.

use parking_lot::Mutex;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::certificate::CertificateInfo;
use crate::error::SignError;

/// A signature produced by a capability: raw PKCS#1 v1.5 bytes.
pub type RawSignature = Vec<u8>;

/// The narrow signing interface the engine depends on.
///
/// Implementations receive the 32-byte SHA-256 digest of the
/// canonicalized `SignedInfo` and return the RSA-SHA256 signature.
pub trait SigningCapability: Send + Sync {
    /// Sign a SHA-256 digest with the managed key.
    fn sign_digest(&self, digest: &[u8; 32]) -> Result<RawSignature, SignError>;

    /// Metadata and public material of the certificate behind the key.
    fn certificate(&self) -> &CertificateInfo;

    /// Human-readable provider name for diagnostics.
    fn provider_name(&self) -> &str;
}

// ─── FileKeyProvider ─────────────────────────────────────────────────────

/// In-process RSA key provider for file-based certificates.
///
/// File keys have no hardware serialization constraint: concurrent
/// `sign_digest` calls are safe and run in parallel.
pub struct FileKeyProvider {
    key: RsaPrivateKey,
    certificate: CertificateInfo,
}

impl FileKeyProvider {
    /// Create from an already-loaded private key and its certificate.
    pub fn new(key: RsaPrivateKey, certificate: CertificateInfo) -> Self {
        Self { key, certificate }
    }

    /// Load the private key from PKCS#8 PEM text.
    ///
    /// Takes the PEM in a [`Zeroizing`] wrapper so the textual key
    /// material is wiped once the key integers are parsed out of it.
    pub fn from_pkcs8_pem(
        pem: Zeroizing<String>,
        certificate: CertificateInfo,
    ) -> Result<Self, SignError> {
        let key = RsaPrivateKey::from_pkcs8_pem(&pem).map_err(|e| {
            SignError::SigningKeyUnavailable {
                reason: format!("PKCS#8 parse failed: {e}"),
            }
        })?;
        Ok(Self::new(key, certificate))
    }
}

impl SigningCapability for FileKeyProvider {
    fn sign_digest(&self, digest: &[u8; 32]) -> Result<RawSignature, SignError> {
        self.key
            .sign(Pkcs1v15Sign::new::<Sha256>(), digest)
            .map_err(|e| SignError::SigningKeyUnavailable {
                reason: format!("RSA signing failed: {e}"),
            })
    }

    fn certificate(&self) -> &CertificateInfo {
        &self.certificate
    }

    fn provider_name(&self) -> &str {
        "FileKeyProvider"
    }
}

impl std::fmt::Debug for FileKeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FileKeyProvider(<private>, {})", self.certificate.subject())
    }
}

// ─── TokenKeyProvider ────────────────────────────────────────────────────

/// The raw signing callback a hardware token exposes: 32-byte digest in,
/// RSA-SHA256 signature out.
pub type TokenSigner = dyn Fn(&[u8; 32]) -> Result<RawSignature, SignError> + Send + Sync;

/// Hardware-token-backed signing capability.
///
/// The physical key supports one operation at a time, so every
/// `sign_digest` call takes the provider's mutex for the duration of the
/// token round trip.
pub struct TokenKeyProvider {
    signer: Box<TokenSigner>,
    certificate: CertificateInfo,
    lock: Mutex<()>,
}

impl TokenKeyProvider {
    /// Wrap a token session callback and the token's certificate.
    pub fn new(
        certificate: CertificateInfo,
        signer: Box<TokenSigner>,
    ) -> Self {
        Self {
            signer,
            certificate,
            lock: Mutex::new(()),
        }
    }
}

impl SigningCapability for TokenKeyProvider {
    fn sign_digest(&self, digest: &[u8; 32]) -> Result<RawSignature, SignError> {
        let _serialized = self.lock.lock();
        (self.signer)(digest)
    }

    fn certificate(&self) -> &CertificateInfo {
        &self.certificate
    }

    fn provider_name(&self) -> &str {
        "TokenKeyProvider"
    }
}

impl std::fmt::Debug for TokenKeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TokenKeyProvider({})", self.certificate.subject())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rsa::RsaPublicKey;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;

    pub(crate) fn test_key() -> &'static RsaPrivateKey {
        use std::sync::OnceLock;
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| {
            let mut rng = rand::thread_rng();
            RsaPrivateKey::new(&mut rng, 2048).expect("generate test key")
        })
    }

    fn test_certificate(key: &RsaPrivateKey) -> CertificateInfo {
        let now = Utc::now();
        CertificateInfo::for_public_key(
            "CN=Capability Test",
            now - Duration::days(1),
            now + Duration::days(1),
            &key.to_public_key(),
        )
        .expect("metadata")
    }

    fn verify_raw(key: &RsaPublicKey, digest: &[u8; 32], sig: &[u8]) -> bool {
        key.verify(Pkcs1v15Sign::new::<Sha256>(), digest, sig).is_ok()
    }

    // -- FileKeyProvider --------------------------------------------------------

    #[test]
    fn file_provider_signs_verifiably() {
        let key = test_key();
        let provider = FileKeyProvider::new(key.clone(), test_certificate(key));
        let digest = [7u8; 32];
        let sig = provider.sign_digest(&digest).expect("sign");
        assert!(verify_raw(&key.to_public_key(), &digest, &sig));
    }

    #[test]
    fn file_provider_signs_concurrently() {
        let key = test_key();
        let provider = Arc::new(FileKeyProvider::new(key.clone(), test_certificate(key)));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let p = provider.clone();
                std::thread::spawn(move || {
                    let digest = [i as u8; 32];
                    p.sign_digest(&digest).expect("sign")
                })
            })
            .collect();
        for handle in handles {
            assert!(!handle.join().expect("join").is_empty());
        }
    }

    #[test]
    fn file_provider_debug_hides_key() {
        let key = test_key();
        let provider = FileKeyProvider::new(key.clone(), test_certificate(key));
        let debug = format!("{provider:?}");
        assert!(debug.contains("<private>"));
    }

    #[test]
    fn from_pkcs8_pem_rejects_garbage() {
        let key = test_key();
        let result = FileKeyProvider::from_pkcs8_pem(
            Zeroizing::new("not a pem".to_string()),
            test_certificate(key),
        );
        assert!(matches!(
            result,
            Err(SignError::SigningKeyUnavailable { .. })
        ));
    }

    // -- TokenKeyProvider -------------------------------------------------------

    #[test]
    fn token_provider_delegates_to_callback() {
        let key = test_key();
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        let signing = key.clone();
        let provider = TokenKeyProvider::new(
            test_certificate(key),
            Box::new(move |digest| {
                counted.fetch_add(1, Ordering::SeqCst);
                signing
                    .sign(Pkcs1v15Sign::new::<Sha256>(), digest)
                    .map_err(|e| SignError::SigningKeyUnavailable {
                        reason: e.to_string(),
                    })
            }),
        );
        let digest = [1u8; 32];
        let sig = provider.sign_digest(&digest).expect("sign");
        assert!(verify_raw(&key.to_public_key(), &digest, &sig));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn token_provider_serializes_signing() {
        let key = test_key();
        let in_flight = Arc::new(AtomicBool::new(false));
        let overlapped = Arc::new(AtomicBool::new(false));
        let (flag, seen) = (in_flight.clone(), overlapped.clone());
        let provider = Arc::new(TokenKeyProvider::new(
            test_certificate(key),
            Box::new(move |_digest| {
                if flag.swap(true, Ordering::SeqCst) {
                    seen.store(true, Ordering::SeqCst);
                }
                std::thread::sleep(std::time::Duration::from_millis(20));
                flag.store(false, Ordering::SeqCst);
                Ok(vec![0u8; 8])
            }),
        ));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let p = provider.clone();
                std::thread::spawn(move || p.sign_digest(&[0u8; 32]).expect("sign"))
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }
        assert!(
            !overlapped.load(Ordering::SeqCst),
            "token operations must never overlap"
        );
    }

    #[test]
    fn token_provider_absent_token_error() {
        let key = test_key();
        let provider = TokenKeyProvider::new(
            test_certificate(key),
            Box::new(|_| {
                Err(SignError::SigningKeyUnavailable {
                    reason: "token not present".into(),
                })
            }),
        );
        assert!(matches!(
            provider.sign_digest(&[0u8; 32]),
            Err(SignError::SigningKeyUnavailable { .. })
        ));
    }

    #[test]
    fn capability_is_object_safe() {
        let key = test_key();
        let provider: Box<dyn SigningCapability> =
            Box::new(FileKeyProvider::new(key.clone(), test_certificate(key)));
        assert_eq!(provider.provider_name(), "FileKeyProvider");
    }
}
