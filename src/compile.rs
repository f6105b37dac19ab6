use std::collections::HashSet;
use std::fmt;

use ipnet::IpNet;
use tracing::{debug, warn};

use crate::error::{ConvertError, Result};
use crate::objects::{is_any_network, ObjectStore};
use crate::services::{PortRange, Protocol, ServiceCatalog, ServiceList, ANY_SERVICE};
use crate::types::{Action, Diagnostic, Policy};

/// Section header for address-list statements
pub const ADDRESS_LIST_HEADER: &str = "/ip firewall address-list";
/// Section header for filter statements
pub const FILTER_HEADER: &str = "/ip firewall filter";
/// Echo request, any code
pub const ICMP_OPTIONS: &str = "8:0-255";

/// Name of the address-list generated for a multi-address reference.
pub fn list_name(zone: &str, reference: &str) -> String {
    format!("{}__{}", zone, reference)
}

/// Source or destination of a filter rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// A reference that resolved to exactly one network
    Address { label: String, network: IpNet },
    /// A reference that resolved to several networks, by address-list name
    List(String),
}

impl Endpoint {
    /// Human-readable name used in rule comments.
    pub fn label(&self) -> &str {
        match self {
            Endpoint::Address { label, .. } => label,
            Endpoint::List(name) => name,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Endpoint::List(_))
    }

    fn write_field(&self, f: &mut fmt::Formatter<'_>, side: &str) -> fmt::Result {
        match self {
            Endpoint::Address { network, .. } if is_any_network(network) => Ok(()),
            Endpoint::Address { network, .. } => write!(f, " {}-address={}", side, network),
            Endpoint::List(name) => write!(f, " {}-address-list={}", side, name),
        }
    }
}

/// One `add list=...` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressListEntry {
    pub list: String,
    pub address: IpNet,
    pub comment: String,
}

impl fmt::Display for AddressListEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "add list={} address={} comment=\"{}\"",
            self.list, self.address, self.comment
        )
    }
}

/// One `add chain=...` filter statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRule {
    pub chain: String,
    pub source: Endpoint,
    pub destination: Endpoint,
    /// None when the rule matches every protocol
    pub protocol: Option<Protocol>,
    pub src_ports: Vec<PortRange>,
    pub dst_ports: Vec<PortRange>,
    pub action: Action,
    pub log: bool,
    pub comment: String,
}

impl fmt::Display for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "add chain={}", self.chain)?;
        self.source.write_field(f, "src")?;
        self.destination.write_field(f, "dst")?;

        if let Some(protocol) = self.protocol {
            write!(f, " protocol={}", protocol)?;
            if protocol == Protocol::Icmp {
                write!(f, " icmp-options={}", ICMP_OPTIONS)?;
            }
        }
        if !self.src_ports.is_empty() {
            write!(f, " src-port={}", join_ports(&self.src_ports))?;
        }
        if !self.dst_ports.is_empty() {
            write!(f, " dst-port={}", join_ports(&self.dst_ports))?;
        }

        write!(f, " action={}", self.action.routeros())?;
        if self.log {
            f.write_str(" log=yes")?;
        }
        write!(f, " comment=\"{}\"", self.comment)
    }
}

fn join_ports(ports: &[PortRange]) -> String {
    ports
        .iter()
        .map(PortRange::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// The rules generated for one policy, under its comment header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRules {
    pub policy_id: u32,
    pub header: String,
    pub rules: Vec<FilterRule>,
}

/// Compiled script: address-lists, then filter rules grouped by policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    pub address_lists: Vec<AddressListEntry>,
    pub policies: Vec<PolicyRules>,
    /// Recoverable problems met while compiling
    pub diagnostics: Vec<Diagnostic>,
}

impl RuleSet {
    /// Total number of filter rules.
    pub fn rule_count(&self) -> usize {
        self.policies.iter().map(|p| p.rules.len()).sum()
    }

    /// All filter rules in output order.
    pub fn rules(&self) -> impl Iterator<Item = &FilterRule> {
        self.policies.iter().flat_map(|p| p.rules.iter())
    }

    /// Render the RouterOS script.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", ADDRESS_LIST_HEADER)?;
        for entry in &self.address_lists {
            writeln!(f, "{}", entry)?;
        }

        write!(f, "\n\n{}\n", FILTER_HEADER)?;
        for policy in &self.policies {
            writeln!(f, "# {}", policy.header)?;
            for rule in &policy.rules {
                writeln!(f, "{}", rule)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// A policy with its references resolved to endpoints.
struct ResolvedPolicy<'a> {
    policy: &'a Policy,
    sources: Vec<Endpoint>,
    destinations: Vec<Endpoint>,
}

/// Compile policies into a RouterOS rule set.
///
/// Disabled policies and zone-wide block policies are skipped. Unresolvable
/// address references are reported and dropped; an unknown service name
/// aborts compilation.
pub fn compile<'a>(
    policies: impl IntoIterator<Item = &'a Policy>,
    objects: &ObjectStore,
    services: &ServiceCatalog,
) -> Result<RuleSet> {
    let mut rule_set = RuleSet::default();
    let mut emitted_lists: HashSet<String> = HashSet::new();
    let mut resolved = Vec::new();

    // Address-list pass: resolve every reference once, emit each list once.
    for policy in policies.into_iter().filter(|p| p.is_materialized()) {
        let sources = resolve_side(
            &policy.from,
            &policy.sources,
            objects,
            &mut rule_set,
            &mut emitted_lists,
        )?;
        let destinations = resolve_side(
            &policy.to,
            &policy.destinations,
            objects,
            &mut rule_set,
            &mut emitted_lists,
        )?;
        resolved.push(ResolvedPolicy {
            policy,
            sources,
            destinations,
        });
    }

    for entry in &resolved {
        let rules = compile_policy(entry, services)?;
        rule_set.policies.push(PolicyRules {
            policy_id: entry.policy.id,
            header: entry.policy.to_string(),
            rules,
        });
    }

    debug!(
        address_lists = emitted_lists.len(),
        rules = rule_set.rule_count(),
        diagnostics = rule_set.diagnostics.len(),
        "compiled rule set"
    );
    Ok(rule_set)
}

/// Resolve one side's references. Singletons come first, then lists, each in reference order.
fn resolve_side(
    zone: &str,
    references: &[String],
    objects: &ObjectStore,
    rule_set: &mut RuleSet,
    emitted_lists: &mut HashSet<String>,
) -> Result<Vec<Endpoint>> {
    let mut singles = Vec::new();
    let mut lists = Vec::new();

    for reference in references {
        let resolution = objects.resolve(zone, reference)?;
        match resolution.addresses() {
            [] => {
                warn!(zone, name = %reference, "address not found");
                rule_set.diagnostics.push(Diagnostic::ObjectNotFound {
                    zone: zone.to_string(),
                    name: reference.clone(),
                });
            }
            [network] => singles.push(Endpoint::Address {
                label: reference.clone(),
                network: *network,
            }),
            _ => {
                let list = list_name(zone, reference);
                if emitted_lists.insert(list.clone()) {
                    for (name, address) in resolution.iter() {
                        rule_set.address_lists.push(AddressListEntry {
                            list: list.clone(),
                            address: *address,
                            comment: name.to_string(),
                        });
                    }
                }
                lists.push(Endpoint::List(list));
            }
        }
    }

    singles.extend(lists);
    Ok(singles)
}

fn compile_policy(entry: &ResolvedPolicy<'_>, services: &ServiceCatalog) -> Result<Vec<FilterRule>> {
    let policy = entry.policy;
    let chain = list_name(&policy.from, &policy.to);
    let mut rules = Vec::new();

    for service_name in &policy.services {
        let definitions = if service_name == ANY_SERVICE {
            None
        } else {
            Some(
                services
                    .get(service_name)
                    .ok_or_else(|| ConvertError::UnknownService {
                        policy: policy.id,
                        service: service_name.clone(),
                    })?,
            )
        };

        // No protocols means a single unconstrained pass.
        let mut protocols: Vec<Option<Protocol>> = definitions
            .map(|d| d.protocols().into_iter().map(Some).collect())
            .unwrap_or_default();
        if protocols.is_empty() {
            protocols.push(None);
        }

        for protocol in protocols {
            let (src_ports, dst_ports) = match (protocol, definitions) {
                (Some(p), Some(d)) if p.has_ports() => constrained_ports(d, p),
                _ => (Vec::new(), Vec::new()),
            };

            for source in &entry.sources {
                for destination in &entry.destinations {
                    rules.push(FilterRule {
                        chain: chain.clone(),
                        source: source.clone(),
                        destination: destination.clone(),
                        protocol,
                        src_ports: src_ports.clone(),
                        dst_ports: dst_ports.clone(),
                        action: policy.action,
                        log: policy.log,
                        comment: rule_comment(policy, source, destination),
                    });
                }
            }
        }
    }

    Ok(rules)
}

/// Port ranges of `protocol` that actually constrain something.
fn constrained_ports(list: &ServiceList, protocol: Protocol) -> (Vec<PortRange>, Vec<PortRange>) {
    let mut src = Vec::new();
    let mut dst = Vec::new();
    for svc in list.for_protocol(protocol) {
        if !svc.src_ports.is_full() {
            src.push(svc.src_ports);
        }
        if !svc.dst_ports.is_full() {
            dst.push(svc.dst_ports);
        }
    }
    (src, dst)
}

fn rule_comment(policy: &Policy, source: &Endpoint, destination: &Endpoint) -> String {
    let mut comment = format!("ID: {}", policy.id);
    if let Some(name) = policy.name.as_deref().filter(|n| !n.is_empty()) {
        comment.push_str(" - ");
        comment.push_str(&name.replace('"', ""));
    }
    comment.push_str(" - ");
    comment.push_str(source.label());
    comment.push_str(" -> ");
    comment.push_str(destination.label());
    comment
}
