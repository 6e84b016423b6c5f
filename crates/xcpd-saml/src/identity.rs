use crate::SamlError;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use std::path::Path;

/// The certificate/key pair used both to sign messages and to populate
/// the SAML assertion's `Issuer`/`NameID`/`KeyInfo` fields.
pub struct SigningIdentity {
    pub(crate) key: RsaPrivateKey,
    /// Subject distinguished name of the signing certificate, rendered
    /// the way `CERT_SUBJECT` is used verbatim in the original source
    /// (RFC 4514-ish, most-specific attribute first).
    pub subject_name: String,
}

impl SigningIdentity {
    pub fn load(cert_path: &Path, key_path: &Path) -> Result<Self, SamlError> {
        let key_pem = std::fs::read_to_string(key_path)
            .map_err(|e| SamlError::Identity(format!("reading {}: {e}", key_path.display())))?;
        let key = RsaPrivateKey::from_pkcs8_pem(&key_pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(&key_pem))
            .map_err(|e| SamlError::Identity(format!("parsing private key: {e}")))?;

        let cert_pem = std::fs::read_to_string(cert_path)
            .map_err(|e| SamlError::Identity(format!("reading {}: {e}", cert_path.display())))?;
        let subject_name = subject_from_pem(&cert_pem)?;

        Ok(SigningIdentity { key, subject_name })
    }

    pub fn modulus_base64(&self) -> String {
        use base64::{engine::general_purpose::STANDARD, Engine};
        STANDARD.encode(self.key.n().to_bytes_be())
    }
}

fn subject_from_pem(cert_pem: &str) -> Result<String, SamlError> {
    use x509_cert::der::DecodePem;
    use x509_cert::Certificate;

    let cert = Certificate::from_pem(cert_pem.as_bytes())
        .map_err(|e| SamlError::Identity(format!("parsing certificate: {e}")))?;
    Ok(cert.tbs_certificate.subject.to_string())
}
