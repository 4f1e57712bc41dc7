//! DKIM key material: loading, fallback, and ephemeral synthesis.

use std::path::Path;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use rand::rngs::OsRng;
use rsa::{
    RsaPrivateKey, RsaPublicKey,
    pkcs1::DecodeRsaPrivateKey,
    pkcs8::{DecodePrivateKey, EncodePublicKey},
};
use thiserror::Error;
use tracing::warn;

/// Key size for synthesized ephemeral keys.
const KEY_BITS: usize = 2048;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("could not prepare DKIM key material: {0}")]
    Crypto(#[from] rsa::Error),

    #[error("could not encode DKIM public key: {0}")]
    Encoding(#[from] rsa::pkcs8::spki::Error),
}

/// Where the active key pair came from. Anything other than `Domain` is a
/// degraded-trust condition: receivers cannot verify the signature against
/// the domain's published DNS record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Loaded from the per-domain key file.
    Domain,
    /// Loaded from the shared `default.pem` fallback.
    Default,
    /// Synthesized at startup because no key file was found.
    Ephemeral,
}

/// An RSA key pair bound to a sending domain and selector label.
///
/// Read-only after load; shared freely across concurrent signing calls.
pub struct DkimKey {
    private: RsaPrivateKey,
    public_spki_b64: String,
    selector: String,
    source: KeySource,
}

impl DkimKey {
    /// Loads key material for `domain`, in order of preference:
    /// `<key_dir>/<domain>.pem`, `<key_dir>/default.pem`, then a freshly
    /// generated ephemeral key. The fallbacks are logged as degraded trust.
    ///
    /// # Errors
    ///
    /// Fails only when ephemeral generation itself fails.
    pub fn load(key_dir: &Path, domain: &str, selector: &str) -> Result<Self, KeyError> {
        let domain_path = key_dir.join(format!("{domain}.pem"));
        if let Some(private) = read_key_file(&domain_path) {
            return Self::from_private(private, selector, KeySource::Domain);
        }

        let default_path = key_dir.join("default.pem");
        if let Some(private) = read_key_file(&default_path) {
            warn!(
                domain,
                key = %default_path.display(),
                "no domain DKIM key, signing with the shared default key (degraded trust)"
            );
            return Self::from_private(private, selector, KeySource::Default);
        }

        warn!(
            domain,
            "no DKIM key material found, synthesizing an ephemeral key \
             (degraded trust, receivers cannot verify against published DNS)"
        );
        let private = RsaPrivateKey::new(&mut OsRng, KEY_BITS)?;
        Self::from_private(private, selector, KeySource::Ephemeral)
    }

    fn from_private(
        private: RsaPrivateKey,
        selector: &str,
        source: KeySource,
    ) -> Result<Self, KeyError> {
        let spki = RsaPublicKey::from(&private).to_public_key_der()?;

        Ok(Self {
            private,
            public_spki_b64: BASE64.encode(spki.as_bytes()),
            selector: selector.to_string(),
            source,
        })
    }

    #[must_use]
    pub fn selector(&self) -> &str {
        &self.selector
    }

    #[must_use]
    pub const fn source(&self) -> KeySource {
        self.source
    }

    /// `true` when signatures will not verify against the domain's own key.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.source != KeySource::Domain
    }

    /// The base64 `SubjectPublicKeyInfo` published in the DKIM TXT record.
    #[must_use]
    pub fn public_key_b64(&self) -> &str {
        &self.public_spki_b64
    }

    pub(crate) const fn private(&self) -> &RsaPrivateKey {
        &self.private
    }
}

/// Reads a PEM private key, accepting both PKCS#8 and PKCS#1 encodings.
fn read_key_file(path: &Path) -> Option<RsaPrivateKey> {
    let pem = std::fs::read_to_string(path).ok()?;

    RsaPrivateKey::from_pkcs8_pem(&pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(&pem))
        .map_err(|err| {
            warn!(path = %path.display(), error = %err, "unreadable DKIM key file, skipping");
        })
        .ok()
}
