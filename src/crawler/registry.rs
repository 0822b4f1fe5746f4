use std::sync::Arc;

use dashmap::DashMap;

use crate::models::{Program, Subdomain};

/// One `Subdomain` per hostname, so the crawler and every attack worker share a single
/// rate-limit permit and cookie jar per host.
#[derive(Debug)]
pub struct SubdomainRegistry {
    program: Arc<Program>,
    subdomains: DashMap<String, Arc<Subdomain>>,
}

impl SubdomainRegistry {
    pub fn new(program: Arc<Program>) -> Self {
        Self {
            program,
            subdomains: DashMap::new(),
        }
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    /// The subdomain for `hostname`, created on first use. Hostnames compare case-insensitively.
    pub fn get_or_insert(&self, hostname: &str) -> Arc<Subdomain> {
        let key = hostname.to_ascii_lowercase();
        self.subdomains
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Subdomain::new(key, Arc::clone(&self.program))))
            .value()
            .clone()
    }

    pub fn len(&self) -> usize {
        self.subdomains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subdomains.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interned_per_host() {
        let registry = SubdomainRegistry::new(Arc::new(Program::default()));
        let a = registry.get_or_insert("www.acme.com");
        let b = registry.get_or_insert("WWW.acme.com");
        let c = registry.get_or_insert("api.acme.com");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);
        assert_eq!(b.hostname, "www.acme.com");
    }
}
