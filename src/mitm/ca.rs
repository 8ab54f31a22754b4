use std::path::PathBuf;

use openssl::pkey::PKey;
use openssl::x509::X509;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

use crate::error::{ProxyError, ProxyResult};

/// Generates or loads the locally trusted root certificate used to sign
/// per-host leaf certificates for TLS interception. Generalizes the
/// teacher's `proxy/ssl.rs::DynamicCert`, which loads a *statically
/// configured* PEM pair per SNI, into a root that mints leaves on
/// demand (see `mitm::cert_cache`).
pub struct CertificateAuthority {
    cert_pem: String,
    key_pair: KeyPair,
    pub root_cert_der: Vec<u8>,
}

impl CertificateAuthority {
    /// Loads a root CA from `dir` if `ca-cert.pem`/`ca-key.pem` both
    /// exist, otherwise generates a fresh 10-year root and persists it
    /// there, mirroring dev-proxy's "generate once, reuse across runs"
    /// root cert behavior.
    pub fn load_or_generate(dir: &std::path::Path) -> ProxyResult<Self> {
        std::fs::create_dir_all(dir)?;
        let cert_path = dir.join("ca-cert.pem");
        let key_path = dir.join("ca-key.pem");

        if cert_path.exists() && key_path.exists() {
            let cert_pem = std::fs::read_to_string(&cert_path)?;
            let key_pem = std::fs::read_to_string(&key_path)?;
            return Self::from_pem(cert_pem, key_pem);
        }

        let (cert_pem, key_pem) = Self::generate_pem()?;
        std::fs::write(&cert_path, &cert_pem)?;
        std::fs::write(&key_path, &key_pem)?;
        Self::from_pem(cert_pem, key_pem)
    }

    fn generate_pem() -> ProxyResult<(String, String)> {
        let key_pair = KeyPair::generate().map_err(|e| ProxyError::Tls(e.to_string()))?;
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "devproxy Local CA");
        dn.push(DnType::OrganizationName, "devproxy");
        params.distinguished_name = dn;
        params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        params.key_usages = vec![rcgen::KeyUsagePurpose::KeyCertSign, rcgen::KeyUsagePurpose::CrlSign];
        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| ProxyError::Tls(e.to_string()))?;
        Ok((cert.pem(), key_pair.serialize_pem()))
    }

    fn from_pem(cert_pem: String, key_pem: String) -> ProxyResult<Self> {
        let key_pair = KeyPair::from_pem(&key_pem).map_err(|e| ProxyError::Tls(e.to_string()))?;
        let root_cert_der = pem_to_der(&cert_pem)?;
        Ok(Self {
            cert_pem,
            key_pair,
            root_cert_der,
        })
    }

    /// Mints a leaf certificate for `host`, signed by this root, valid
    /// for one year. Returns PEM-encoded cert and key, converted to
    /// `openssl` types the way `proxy/ssl.rs` consumes PEM material for
    /// `ext::ssl_use_certificate`/`ext::ssl_use_private_key`.
    pub fn mint_leaf(&self, host: &str) -> ProxyResult<(X509, PKey<openssl::pkey::Private>)> {
        let leaf_key = KeyPair::generate().map_err(|e| ProxyError::Tls(e.to_string()))?;
        let mut params = CertificateParams::new(vec![host.to_string()])
            .map_err(|e| ProxyError::Tls(e.to_string()))?;
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, host);
        params.distinguished_name = dn;

        let issuer_params = rcgen::CertificateParams::from_ca_cert_pem(&self.cert_pem)
            .map_err(|e| ProxyError::Tls(e.to_string()))?;
        let issuer_cert = issuer_params
            .self_signed(&self.key_pair)
            .map_err(|e| ProxyError::Tls(e.to_string()))?;
        let leaf = params
            .signed_by(&leaf_key, &issuer_cert, &self.key_pair)
            .map_err(|e| ProxyError::Tls(e.to_string()))?;

        let cert = X509::from_pem(leaf.pem().as_bytes()).map_err(|e| ProxyError::Tls(e.to_string()))?;
        let key = PKey::private_key_from_pem(leaf_key.serialize_pem().as_bytes())
            .map_err(|e| ProxyError::Tls(e.to_string()))?;
        Ok((cert, key))
    }

    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }
}

fn pem_to_der(pem: &str) -> ProxyResult<Vec<u8>> {
    let x509 = X509::from_pem(pem.as_bytes()).map_err(|e| ProxyError::Tls(e.to_string()))?;
    x509.to_der().map_err(|e| ProxyError::Tls(e.to_string()))
}

/// Default location for the persisted root CA, under the binary's
/// directory (`spec.md` §6's on-disk state section).
pub fn default_ca_dir() -> ProxyResult<PathBuf> {
    let exe = std::env::current_exe()?;
    let dir = exe
        .parent()
        .ok_or_else(|| ProxyError::Internal("executable has no parent directory".into()))?
        .join("devproxy-ca");
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_and_mints_leaf_certificate() {
        let dir = std::env::temp_dir().join(format!("devproxy-ca-test-{}", std::process::id()));
        let ca = CertificateAuthority::load_or_generate(&dir).unwrap();
        let (_cert, _key) = ca.mint_leaf("example.com").unwrap();
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn reloads_existing_ca_from_disk() {
        let dir = std::env::temp_dir().join(format!("devproxy-ca-reload-{}", std::process::id()));
        let first = CertificateAuthority::load_or_generate(&dir).unwrap();
        let second = CertificateAuthority::load_or_generate(&dir).unwrap();
        assert_eq!(first.cert_pem(), second.cert_pem());
        std::fs::remove_dir_all(&dir).ok();
    }
}
