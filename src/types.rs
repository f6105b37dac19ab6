use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{ConvertError, Result};
use crate::objects::is_wildcard;

/// What a policy does with matching traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Permit,
    Reject,
    Deny,
}

impl Action {
    /// RouterOS filter action keyword.
    pub fn routeros(&self) -> &'static str {
        match self {
            Action::Permit => "accept",
            Action::Reject => "reject",
            Action::Deny => "drop",
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self, Action::Reject | Action::Deny)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Permit => "permit",
            Action::Reject => "reject",
            Action::Deny => "deny",
        })
    }
}

impl FromStr for Action {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "permit" => Ok(Action::Permit),
            "reject" => Ok(Action::Reject),
            "deny" => Ok(Action::Deny),
            _ => Err(ConvertError::ParseError(format!("Unknown action: {}", s))),
        }
    }
}

/// Address translation mode attached to a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NatMode {
    #[default]
    None,
    Source,
    Destination,
}

impl fmt::Display for NatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NatMode::None => "",
            NatMode::Source => "nat src",
            NatMode::Destination => "nat dst",
        })
    }
}

impl FromStr for NatMode {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" => Ok(NatMode::None),
            "nat src" => Ok(NatMode::Source),
            "nat dst" => Ok(NatMode::Destination),
            _ => Err(ConvertError::ParseError(format!("Unknown NAT mode: {}", s))),
        }
    }
}

/// One security policy from the source configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Policy {
    pub id: u32,
    pub name: Option<String>,
    pub disabled: bool,

    pub from: String,
    pub to: String,

    pub sources: Vec<String>,
    pub destinations: Vec<String>,

    pub services: Vec<String>,
    pub application: Option<String>,

    pub nat: NatMode,
    pub nat_address: Option<String>,
    pub nat_port: Option<u16>,

    pub action: Action,
    pub log: bool,
    pub log_init: bool,
}

impl Policy {
    /// Policy with one source, destination and service and no flags set.
    pub fn new(
        id: u32,
        from: impl Into<String>,
        to: impl Into<String>,
        source: impl Into<String>,
        destination: impl Into<String>,
        service: impl Into<String>,
        action: Action,
    ) -> Self {
        Self {
            id,
            name: None,
            disabled: false,
            from: from.into(),
            to: to.into(),
            sources: vec![source.into()],
            destinations: vec![destination.into()],
            services: vec![service.into()],
            application: None,
            nat: NatMode::None,
            nat_address: None,
            nat_port: None,
            action,
            log: false,
            log_init: false,
        }
    }

    /// Check the structural invariants, returning the first violation.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.id == 0 {
            return Err("id must be positive".into());
        }
        if self.from.is_empty() || self.to.is_empty() {
            return Err("zones must not be empty".into());
        }
        if self.sources.is_empty() {
            return Err("no source address".into());
        }
        if self.destinations.is_empty() {
            return Err("no destination address".into());
        }
        if self.services.is_empty() {
            return Err("no service".into());
        }
        Ok(())
    }

    /// An any-to-any block policy: the zone's implicit default, not an explicit rule.
    pub fn is_zone_policy(&self) -> bool {
        let only_any = |refs: &[String]| refs.len() == 1 && is_wildcard(&refs[0]);
        only_any(&self.sources) && only_any(&self.destinations) && self.action.is_block()
    }

    /// Whether the compiler should turn this policy into rules.
    pub fn is_materialized(&self) -> bool {
        !self.disabled && !self.is_zone_policy()
    }

    /// Whether the policy touches `zone` on either side.
    pub fn involves_zone(&self, zone: &str) -> bool {
        self.from == zone || self.to == zone
    }

    pub fn add_source(&mut self, name: &str) {
        push_unique(&mut self.sources, name);
    }

    pub fn add_destination(&mut self, name: &str) {
        push_unique(&mut self.destinations, name);
    }

    pub fn add_service(&mut self, name: &str) {
        push_unique(&mut self.services, name);
    }
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|n| n == name) {
        list.push(name.to_string());
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ID: {} Name: {} Disabled: {} From: {} To: {} Sources: [{}] Destinations: [{}] \
             Services: [{}] Application: {} NAT: {} NATAddress: {} NATPort: {} Action: {} \
             Log: {} LogInit: {}",
            self.id,
            self.name.as_deref().unwrap_or(""),
            self.disabled,
            self.from,
            self.to,
            self.sources.join(" "),
            self.destinations.join(" "),
            self.services.join(" "),
            self.application.as_deref().unwrap_or(""),
            self.nat,
            self.nat_address.as_deref().unwrap_or(""),
            self.nat_port.unwrap_or(0),
            self.action,
            self.log,
            self.log_init,
        )
    }
}

/// Policies keyed by id, iterated in definition order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySet {
    policies: IndexMap<u32, Policy>,
}

impl PolicySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new policy. Returns the policy back if the id is taken.
    pub fn insert(&mut self, policy: Policy) -> std::result::Result<(), Policy> {
        if self.policies.contains_key(&policy.id) {
            return Err(policy);
        }
        self.policies.insert(policy.id, policy);
        Ok(())
    }

    pub fn get(&self, id: u32) -> Option<&Policy> {
        self.policies.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Policy> {
        self.policies.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Policy> {
        self.policies.values()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Keep only the policies for which `keep` returns true, preserving order.
    pub fn retain(&mut self, mut keep: impl FnMut(&Policy) -> bool) {
        self.policies.retain(|_, p| keep(p));
    }

    pub fn into_vec(self) -> Vec<Policy> {
        self.policies.into_values().collect()
    }
}

impl<'a> IntoIterator for &'a PolicySet {
    type Item = &'a Policy;
    type IntoIter = indexmap::map::Values<'a, u32, Policy>;

    fn into_iter(self) -> Self::IntoIter {
        self.policies.values()
    }
}

/// A recoverable problem; conversion continues past it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A hostname address definition could not be resolved; the object was skipped.
    UnresolvedHost {
        line: usize,
        zone: String,
        name: String,
        host: String,
        message: String,
    },
    /// A policy referenced an address or group that resolves to nothing.
    ObjectNotFound { zone: String, name: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnresolvedHost {
                line,
                zone,
                name,
                host,
                message,
            } => write!(
                f,
                "line {}: cannot resolve {} for {} {}: {}",
                line, host, zone, name, message
            ),
            Diagnostic::ObjectNotFound { zone, name } => write!(f, "{} {} not found", zone, name),
        }
    }
}
