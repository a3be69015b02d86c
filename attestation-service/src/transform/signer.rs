use std::{fmt, fs, path::Path};

use ekm_client::{MeterSnapshot, SignedAttestation};
use rsa::{
    pkcs1::DecodeRsaPrivateKey,
    pkcs1v15::SigningKey,
    pkcs8::{ObjectIdentifier, PrivateKeyInfo, SecretDocument},
    signature::{SignatureEncoding, Signer as _},
    traits::PublicKeyParts,
    RsaPrivateKey,
};
use sha2::Sha256;

use super::canonical::CanonicalDigest;
use crate::pipeline::{PipelineError, Signer};

/// `rsaEncryption` (RFC 8017, appendix A.1).
const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

/// An RSA private key loaded once at startup.
///
/// Only RSA keys can be held, so every signer built from a session produces
/// PKCS#1 v1.5 signatures. Key material is never printed.
pub struct PrivateKeySession {
    key: SigningKey<Sha256>,
    signature_len: usize,
}

impl PrivateKeySession {
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let pem = fs::read_to_string(path)
            .map_err(|e| PipelineError::KeyLoad(format!("{}: {e}", path.display())))?;
        Self::from_pem(&pem)
    }

    /// Parse an unencrypted PKCS#8 (`PRIVATE KEY`) or PKCS#1
    /// (`RSA PRIVATE KEY`) PEM document.
    pub fn from_pem(pem: &str) -> Result<Self, PipelineError> {
        let (label, doc) = SecretDocument::from_pem(pem)
            .map_err(|e| PipelineError::KeyLoad(format!("malformed PEM: {e}")))?;

        let key = match label {
            "RSA PRIVATE KEY" => RsaPrivateKey::from_pkcs1_der(doc.as_bytes())
                .map_err(|e| PipelineError::KeyLoad(format!("invalid PKCS#1 key: {e}")))?,
            "PRIVATE KEY" => {
                let info = PrivateKeyInfo::try_from(doc.as_bytes())
                    .map_err(|e| PipelineError::KeyLoad(format!("invalid PKCS#8 key: {e}")))?;
                if info.algorithm.oid != RSA_ENCRYPTION {
                    return Err(PipelineError::UnsupportedKey(format!(
                        "key algorithm {} is not RSA",
                        info.algorithm.oid
                    )));
                }
                RsaPrivateKey::try_from(info)
                    .map_err(|e| PipelineError::KeyLoad(format!("invalid RSA key: {e}")))?
            }
            "EC PRIVATE KEY" => {
                return Err(PipelineError::UnsupportedKey(
                    "elliptic-curve key cannot produce PKCS#1 v1.5 signatures".to_string(),
                ))
            }
            "ENCRYPTED PRIVATE KEY" => {
                return Err(PipelineError::KeyLoad(
                    "encrypted private keys are not supported".to_string(),
                ))
            }
            other => {
                return Err(PipelineError::KeyLoad(format!(
                    "unexpected PEM label `{other}`"
                )))
            }
        };

        let signature_len = key.size();
        Ok(Self {
            key: SigningKey::<Sha256>::new(key),
            signature_len,
        })
    }

    /// Signature length in bytes (the modulus length).
    pub fn signature_len(&self) -> usize {
        self.signature_len
    }

    /// RSASSA-PKCS1-v1_5 with SHA-256 over `message`.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, PipelineError> {
        let signature = self
            .key
            .try_sign(message)
            .map_err(|e| PipelineError::Signing(e.to_string()))?;
        Ok(signature.to_vec())
    }
}

impl fmt::Debug for PrivateKeySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKeySession")
            .field("signature_len", &self.signature_len)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Signs the SHA-256 digest of a snapshot's canonical encoding.
///
/// The 32-byte digest is the message handed to PKCS#1 v1.5, so the
/// DigestInfo carries SHA-256 of that digest. Output is lowercase hex of
/// exactly twice the modulus length.
#[derive(Debug)]
pub struct CanonicalSigner {
    session: PrivateKeySession,
}

impl CanonicalSigner {
    pub fn new(session: PrivateKeySession) -> Self {
        Self { session }
    }

    pub fn from_key_file(path: &Path) -> Result<Self, PipelineError> {
        Ok(Self::new(PrivateKeySession::load(path)?))
    }
}

impl Signer for CanonicalSigner {
    fn sign(&self, snapshot: &MeterSnapshot) -> Result<SignedAttestation, PipelineError> {
        let canonical = CanonicalDigest::of(snapshot)?;
        let signature = self.session.sign(canonical.digest())?;

        if signature.len() != self.session.signature_len() {
            return Err(PipelineError::Signing(format!(
                "signature is {} bytes, expected {}",
                signature.len(),
                self.session.signature_len()
            )));
        }
        Ok(SignedAttestation::new(hex::encode(signature)))
    }
}
