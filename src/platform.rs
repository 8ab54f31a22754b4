/// Thin seam for OS-specific integration the core treats as an external
/// collaborator per `spec.md` §1/§9: resolving the PID of the process
/// behind a connection, toggling the OS system-proxy setting, and
/// installing the root CA into the OS trust store. None of these are
/// implemented in this build; the default adapter is a safe no-op so the
/// engine can run unmodified on any platform, with the concrete
/// implementation left as a later, platform-specific crate.
pub trait PlatformAdapter: Send + Sync {
    fn resolve_pid_for_port(&self, _local_port: u16) -> Option<u32> {
        None
    }

    fn set_system_proxy(&self, _ip_address: &str, _port: u16) -> bool {
        false
    }

    fn install_root_cert_in_trust_store(&self, _cert_pem: &str) -> bool {
        false
    }
}

#[derive(Default)]
pub struct NoopPlatformAdapter;

impl PlatformAdapter for NoopPlatformAdapter {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_adapter_reports_unsupported() {
        let adapter = NoopPlatformAdapter;
        assert_eq!(adapter.resolve_pid_for_port(8000), None);
        assert!(!adapter.set_system_proxy("127.0.0.1", 8000));
        assert!(!adapter.install_root_cert_in_trust_store("pem"));
    }
}
