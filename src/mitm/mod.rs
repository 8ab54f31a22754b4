pub mod ca;
pub mod cert_cache;

pub use ca::CertificateAuthority;
pub use cert_cache::{CertCache, MintedCert};
