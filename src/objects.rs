//! Zone-scoped address objects and group resolution.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};

use ipnet::{IpNet, Ipv4Net};

use crate::error::{ConvertError, Result};

/// Name that matches any host, in any zone.
pub const WILDCARD: &str = "any";

const MAPPED_IP_PREFIX: &str = "MIP(";
const VIRTUAL_IP_PREFIX: &str = "VIP(";

/// Whether `name` is the wildcard address name (case-insensitive).
pub fn is_wildcard(name: &str) -> bool {
    name.eq_ignore_ascii_case(WILDCARD)
}

/// Network that stands for "no address constraint".
pub fn any_network() -> IpNet {
    IpNet::V4(Ipv4Net::default())
}

/// Whether `net` places no constraint on the address.
pub fn is_any_network(net: &IpNet) -> bool {
    net.prefix_len() == 0
}

/// Host-only network for a single address.
pub fn host_network(ip: IpAddr) -> IpNet {
    IpNet::from(ip)
}

/// A named address: a concrete network or a group of other names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressObject {
    Address(IpNet),
    Group(Vec<String>),
}

/// Result of resolving a name: parallel display names and networks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    names: Vec<String>,
    addresses: Vec<IpNet>,
}

impl Resolution {
    fn single(name: &str, address: IpNet) -> Self {
        Self {
            names: vec![name.to_string()],
            addresses: vec![address],
        }
    }

    fn push(&mut self, name: String, address: IpNet) {
        self.names.push(name);
        self.addresses.push(address);
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn addresses(&self) -> &[IpNet] {
        &self.addresses
    }

    /// (display name, network) pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &IpNet)> {
        self.names.iter().map(String::as_str).zip(self.addresses.iter())
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// No entries: the name was not found.
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Drop entries whose network already appeared, keeping the first name.
    fn dedup(self) -> Self {
        let mut out = Resolution::default();
        for (name, address) in self.names.into_iter().zip(self.addresses) {
            if !out.addresses.contains(&address) {
                out.push(name, address);
            }
        }
        out
    }
}

/// Address objects keyed by zone, then by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectStore {
    zones: HashMap<String, HashMap<String, AddressObject>>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace `zone/name` as a plain address.
    pub fn add(&mut self, zone: &str, name: &str, address: IpNet) {
        self.zones
            .entry(zone.to_string())
            .or_default()
            .insert(name.to_string(), AddressObject::Address(address));
    }

    /// Append `member` to group `zone/name`, creating the group if needed.
    ///
    /// A plain address under the same name becomes a group.
    pub fn add_to_group(&mut self, zone: &str, name: &str, member: &str) {
        let object = self
            .zones
            .entry(zone.to_string())
            .or_default()
            .entry(name.to_string())
            .or_insert_with(|| AddressObject::Group(Vec::new()));

        match object {
            AddressObject::Group(members) => members.push(member.to_string()),
            AddressObject::Address(_) => *object = AddressObject::Group(vec![member.to_string()]),
        }
    }

    pub fn get(&self, zone: &str, name: &str) -> Option<&AddressObject> {
        self.zones.get(zone)?.get(name)
    }

    /// Number of objects across all zones.
    pub fn len(&self) -> usize {
        self.zones.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve `name` in `zone` to concrete networks.
    ///
    /// Groups expand recursively in member order; duplicate networks keep
    /// the first name they were reached through. An unknown zone or name
    /// yields an empty resolution. A group that reaches itself again is an
    /// error.
    pub fn resolve(&self, zone: &str, name: &str) -> Result<Resolution> {
        let mut visiting = HashSet::new();
        self.resolve_inner(zone, name, &mut visiting)
    }

    fn resolve_inner<'a>(
        &'a self,
        zone: &str,
        name: &'a str,
        visiting: &mut HashSet<&'a str>,
    ) -> Result<Resolution> {
        if is_wildcard(name) {
            return Ok(Resolution::single(name, any_network()));
        }
        if let Some(ip) = inline_address(name) {
            return Ok(Resolution::single(name, host_network(ip)));
        }
        if name.starts_with(MAPPED_IP_PREFIX) || name.starts_with(VIRTUAL_IP_PREFIX) {
            return Ok(Resolution::default());
        }

        let Some(object) = self.get(zone, name) else {
            return Ok(Resolution::default());
        };

        match object {
            AddressObject::Address(address) => Ok(Resolution::single(name, *address)),
            AddressObject::Group(members) => {
                if !visiting.insert(name) {
                    return Err(ConvertError::CyclicGroup {
                        zone: zone.to_string(),
                        name: name.to_string(),
                    });
                }
                let mut all = Resolution::default();
                for member in members {
                    let resolved = self.resolve_inner(zone, member, visiting)?;
                    all.names.extend(resolved.names);
                    all.addresses.extend(resolved.addresses);
                }
                visiting.remove(name);
                Ok(all.dedup())
            }
        }
    }
}

/// Address embedded in a `MIP(x)` / `VIP(x)` name.
fn inline_address(name: &str) -> Option<IpAddr> {
    let inner = name
        .strip_prefix(MAPPED_IP_PREFIX)
        .or_else(|| name.strip_prefix(VIRTUAL_IP_PREFIX))?;
    let inner = inner.strip_suffix(')').unwrap_or(inner);
    inner.trim().parse().ok()
}

/// Build a network from an address and a dotted-quad netmask.
pub fn network_from_mask(ip: Ipv4Addr, mask: Ipv4Addr) -> Result<IpNet> {
    let bits = u32::from(mask);
    let prefix = bits.leading_ones();
    if bits.count_ones() != prefix {
        return Err(ConvertError::InvalidAddress(format!(
            "non-contiguous netmask {}",
            mask
        )));
    }
    // at most 32
    Ipv4Net::new(ip, prefix as u8)
        .map(IpNet::V4)
        .map_err(|e| ConvertError::InvalidAddress(format!("{}/{}: {}", ip, mask, e)))
}
