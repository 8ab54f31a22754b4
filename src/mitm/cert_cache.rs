use std::sync::Arc;

use dashmap::DashMap;
use openssl::pkey::PKey;
use openssl::x509::X509;

use super::ca::CertificateAuthority;
use crate::error::ProxyResult;

pub struct MintedCert {
    pub x509: X509,
    pub key: PKey<openssl::pkey::Private>,
}

/// SNI-keyed cache of minted leaf certificates, reused for the process
/// lifetime so repeat CONNECTs to the same host don't re-mint a
/// certificate per connection. Grounded on `proxy/ssl.rs`'s
/// `SSL_MAP: Lazy<DashMap<..>>` SNI lookup, generalized from "look up a
/// statically configured cert" to "mint on first use, then cache".
#[derive(Default)]
pub struct CertCache {
    certs: DashMap<String, Arc<MintedCert>>,
}

impl CertCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_mint(&self, ca: &CertificateAuthority, host: &str) -> ProxyResult<Arc<MintedCert>> {
        if let Some(existing) = self.certs.get(host) {
            return Ok(existing.clone());
        }
        let (x509, key) = ca.mint_leaf(host)?;
        let minted = Arc::new(MintedCert { x509, key });
        self.certs.insert(host.to_string(), minted.clone());
        Ok(minted)
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_cached_cert_for_same_host() {
        let dir = std::env::temp_dir().join(format!("devproxy-cert-cache-{}", std::process::id()));
        let ca = CertificateAuthority::load_or_generate(&dir).unwrap();
        let cache = CertCache::new();
        let a = cache.get_or_mint(&ca, "example.com").unwrap();
        let b = cache.get_or_mint(&ca, "example.com").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }
}
