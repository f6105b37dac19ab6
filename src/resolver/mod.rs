//! Hostname resolution for address definitions.
//!
//! `set address` directives may name a host instead of an address/mask
//! pair. The parser asks a [`Resolver`] for its address; failures are
//! reported and the object is skipped.

use std::collections::HashMap;
use std::net::{IpAddr, ToSocketAddrs};

use crate::error::{ConvertError, Result};

/// Hostname resolver interface.
pub trait Resolver: Send + Sync {
    /// Resolve `host` to a single address, IPv4 preferred.
    fn resolve(&self, host: &str) -> Result<IpAddr>;
}

/// Resolver backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl SystemResolver {
    pub fn new() -> Self {
        Self
    }
}

impl Resolver for SystemResolver {
    fn resolve(&self, host: &str) -> Result<IpAddr> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }

        let addrs = (host, 0u16)
            .to_socket_addrs()
            .map_err(|e| ConvertError::ResolveError(format!("Failed to resolve {}: {}", host, e)))?;

        pick_address(addrs.map(|a| a.ip()))
            .ok_or_else(|| ConvertError::ResolveError(format!("No address for {}", host)))
    }
}

/// Resolver that never finds anything except literal addresses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NilResolver;

impl NilResolver {
    pub fn new() -> Self {
        Self
    }
}

impl Resolver for NilResolver {
    fn resolve(&self, host: &str) -> Result<IpAddr> {
        host.parse::<IpAddr>()
            .map_err(|_| ConvertError::ResolveError(format!("Resolution disabled: {}", host)))
    }
}

/// Resolver with fixed hostname mappings.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    mappings: HashMap<String, IpAddr>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mapping for a hostname.
    pub fn add(&mut self, host: impl Into<String>, ip: IpAddr) {
        self.mappings.insert(host.into(), ip);
    }

    /// Add a mapping and return self for chaining.
    pub fn with_mapping(mut self, host: impl Into<String>, ip: IpAddr) -> Self {
        self.add(host, ip);
        self
    }
}

impl Resolver for StaticResolver {
    fn resolve(&self, host: &str) -> Result<IpAddr> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }

        self.mappings
            .get(host)
            .copied()
            .ok_or_else(|| ConvertError::ResolveError(format!("Host not found: {}", host)))
    }
}

/// First IPv4 address, or the first address of any family.
fn pick_address(ips: impl IntoIterator<Item = IpAddr>) -> Option<IpAddr> {
    let mut fallback = None;
    for ip in ips {
        if ip.is_ipv4() {
            return Some(ip);
        }
        fallback.get_or_insert(ip);
    }
    fallback
}
