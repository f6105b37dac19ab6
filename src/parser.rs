use std::collections::HashSet;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

use ipnet::IpNet;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::{debug, trace, warn};

use crate::error::{ConvertError, Result};
use crate::objects::{host_network, network_from_mask, ObjectStore};
use crate::resolver::Resolver;
use crate::services::{PortRange, Protocol, Service, ServiceCatalog};
use crate::types::{Action, Diagnostic, NatMode, Policy, PolicySet};

fn pattern(re: &str, name: &str) -> Regex {
    Regex::new(re).unwrap_or_else(|e| panic!("{name}: hardcoded regex is invalid: {e}"))
}

/// `set service "NAME" protocol ...` and the `+` continuation form.
/// Either a port-based protocol with src/dst ranges, or ICMP type/code.
static SERVICE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r#"^set service "([^"]+)" (protocol|\+) (?:(tcp|udp|\d+) src-port (\d+)-(\d+) dst-port (\d+)-(\d+)|icmp type (\d+) code (\d+))(?: timeout (?:\d+|never))?$"#,
        "SERVICE_PATTERN",
    )
});

/// Service attributes that carry nothing for the target platform.
static SERVICE_IGNORED_PATTERN: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r#"^set service "([^"]+)" (?:timeout (?:\d+|never)|session-cache)$"#,
        "SERVICE_IGNORED_PATTERN",
    )
});

/// `set address "ZONE" "NAME" <ip> <mask> ["comment"]`, or a hostname / CIDR in place of ip+mask.
static ADDRESS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r#"^set address "([^"]+)" "([^"]+)" ([^ "]+)(?: ([0-9.]+))?(?: "([^"]*)")?$"#,
        "ADDRESS_PATTERN",
    )
});

static GROUP_ADD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r#"^set group address "([^"]+)" "([^"]+)" add "([^"]+)"$"#,
        "GROUP_ADD_PATTERN",
    )
});

static GROUP_CREATE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r#"^set group address "([^"]+)" "([^"]+)"(?: comment .*)?$"#,
        "GROUP_CREATE_PATTERN",
    )
});

/// Single-line policy definition. Bandwidth and schedule clauses are
/// accepted and dropped; anything after the last recognized clause is ignored.
static POLICY_CREATE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    pattern(
        concat!(
            r#"^set policy id (\d+)(?: name "([^"]*)")? from "([^"]+)" to "([^"]+)"\s+"#,
            r#""([^"]+)" "([^"]+)" "([^"]+)""#,
            r#"(?: (nat src|nat dst))?(?: ip ([^ ]+))?(?: port (\d+))?"#,
            r#" (permit|deny|reject)(?: (log))?"#,
            r#"(?: traffic mbw \d+)?(?: schedule "[^"]+")?"#,
        ),
        "POLICY_CREATE_PATTERN",
    )
});

/// Bare `set policy id N`: opens a block that runs until `exit`.
static POLICY_BLOCK_PATTERN: Lazy<Regex> =
    Lazy::new(|| pattern(r"^set policy id (\d+)$", "POLICY_BLOCK_PATTERN"));

static POLICY_FLAGS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r#"^set policy id (\d+) (disable|application)(?: "([^"]*)")?$"#,
        "POLICY_FLAGS_PATTERN",
    )
});

static BLOCK_REFERENCE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r#"^set (service|src-address|dst-address) "([^"]+)"$"#,
        "BLOCK_REFERENCE_PATTERN",
    )
});

static BLOCK_LOG_PATTERN: Lazy<Regex> =
    Lazy::new(|| pattern(r"^set log (.*)$", "BLOCK_LOG_PATTERN"));

const BLOCK_TERMINATOR: &str = "exit";
const SESSION_INIT_LOG: &str = "session-init";

/// Everything the directive stream defines.
#[derive(Debug, Clone, Default)]
pub struct ParsedConfig {
    /// Policies in definition order
    pub policies: PolicySet,
    /// Address objects and groups by zone
    pub objects: ObjectStore,
    /// Built-in services plus the ones defined in the input
    pub services: ServiceCatalog,
    /// Recoverable problems met while parsing
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse a configuration export.
pub fn parse_config(text: &str, resolver: &dyn Resolver) -> Result<ParsedConfig> {
    DirectiveParser::new(resolver).parse(text)
}

/// Parse a configuration export from a file.
pub fn parse_config_from_file(
    path: impl AsRef<Path>,
    resolver: &dyn Resolver,
) -> Result<ParsedConfig> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| {
        ConvertError::ParseError(format!(
            "Failed to read configuration '{}': {}",
            path.display(),
            e
        ))
    })?;
    parse_config(&text, resolver)
}

struct DirectiveParser<'r> {
    resolver: &'r dyn Resolver,
    config: ParsedConfig,
    /// Target of `+` continuation lines
    last_service: Option<String>,
    /// Names already defined by the input (as opposed to built in)
    defined_services: HashSet<String>,
}

impl<'r> DirectiveParser<'r> {
    fn new(resolver: &'r dyn Resolver) -> Self {
        Self {
            resolver,
            config: ParsedConfig::default(),
            last_service: None,
            defined_services: HashSet::new(),
        }
    }

    fn parse(mut self, text: &str) -> Result<ParsedConfig> {
        let mut lines = text.lines().enumerate().map(|(i, l)| (i + 1, l.trim()));

        while let Some((line_num, line)) = lines.next() {
            if let Some(caps) = POLICY_BLOCK_PATTERN.captures(line) {
                let id = parse_number(&caps[1], line_num)?;
                self.parse_policy_block(id, line_num, &mut lines)?;
                continue;
            }
            self.parse_line(line_num, line)?;
        }

        debug!(
            policies = self.config.policies.len(),
            objects = self.config.objects.len(),
            services = self.config.services.len(),
            "parsed configuration"
        );
        Ok(self.config)
    }

    fn parse_line(&mut self, line_num: usize, line: &str) -> Result<()> {
        if line.starts_with("set service") {
            return self.parse_service(line_num, line);
        }
        if line.starts_with("set address") {
            return self.parse_address(line_num, line);
        }
        if line.starts_with("set group address") {
            return self.parse_group(line_num, line);
        }
        if line.starts_with("set policy id") {
            return self.parse_policy(line_num, line);
        }

        trace!(line = line_num, "ignoring directive");
        Ok(())
    }

    fn parse_service(&mut self, line_num: usize, line: &str) -> Result<()> {
        if let Some(caps) = SERVICE_PATTERN.captures(line) {
            let name = &caps[1];
            let service = service_from_captures(&caps, line_num)?;

            if &caps[2] == "+" {
                let target = self
                    .last_service
                    .as_deref()
                    .ok_or(ConvertError::OrphanServiceContinuation { line: line_num })?;
                self.config.services.add(target, service);
            } else {
                // The input's first definition of a name replaces the built-in one.
                if self.defined_services.insert(name.to_string()) {
                    self.config.services.redefine(name, service);
                } else {
                    self.config.services.add(name, service);
                }
                self.last_service = Some(name.to_string());
            }
            return Ok(());
        }

        if SERVICE_IGNORED_PATTERN.is_match(line) {
            return Ok(());
        }

        Err(malformed(line_num, line))
    }

    fn parse_address(&mut self, line_num: usize, line: &str) -> Result<()> {
        let caps = ADDRESS_PATTERN
            .captures(line)
            .ok_or_else(|| malformed(line_num, line))?;
        let zone = &caps[1];
        let name = &caps[2];
        let target = &caps[3];

        let network = if let Some(mask) = caps.get(4) {
            let ip: Ipv4Addr = target.parse().map_err(|_| ConvertError::ParseErrorAtLine {
                line: line_num,
                message: format!("Invalid IP address: {}", target),
            })?;
            let mask: Ipv4Addr = mask
                .as_str()
                .parse()
                .map_err(|_| ConvertError::ParseErrorAtLine {
                    line: line_num,
                    message: format!("Invalid netmask: {}", mask.as_str()),
                })?;
            network_from_mask(ip, mask).map_err(|e| ConvertError::ParseErrorAtLine {
                line: line_num,
                message: e.to_string(),
            })?
        } else if let Ok(net) = target.parse::<IpNet>() {
            net
        } else {
            match self.resolver.resolve(target) {
                Ok(ip) => host_network(ip),
                Err(e) => {
                    warn!(line = line_num, zone, name, host = target, error = %e, "skipping unresolvable address");
                    self.config.diagnostics.push(Diagnostic::UnresolvedHost {
                        line: line_num,
                        zone: zone.to_string(),
                        name: name.to_string(),
                        host: target.to_string(),
                        message: e.to_string(),
                    });
                    return Ok(());
                }
            }
        };

        self.config.objects.add(zone, name, network);
        Ok(())
    }

    fn parse_group(&mut self, line_num: usize, line: &str) -> Result<()> {
        if let Some(caps) = GROUP_ADD_PATTERN.captures(line) {
            self.config.objects.add_to_group(&caps[1], &caps[2], &caps[3]);
            return Ok(());
        }
        // Membership is what matters; creation alone adds nothing.
        if GROUP_CREATE_PATTERN.is_match(line) {
            return Ok(());
        }
        Err(malformed(line_num, line))
    }

    fn parse_policy(&mut self, line_num: usize, line: &str) -> Result<()> {
        if let Some(caps) = POLICY_CREATE_PATTERN.captures(line) {
            let policy = policy_from_captures(&caps, line_num)?;
            if let Err(reason) = policy.validate() {
                return Err(ConvertError::InvalidPolicy {
                    line: line_num,
                    id: policy.id,
                    reason,
                });
            }
            return self
                .config
                .policies
                .insert(policy)
                .map_err(|p| ConvertError::DuplicatePolicy {
                    line: line_num,
                    id: p.id,
                });
        }

        if let Some(caps) = POLICY_FLAGS_PATTERN.captures(line) {
            let id = parse_number(&caps[1], line_num)?;
            let policy = self
                .config
                .policies
                .get_mut(id)
                .ok_or(ConvertError::UnknownPolicy { line: line_num, id })?;

            if &caps[2] == "disable" {
                policy.disabled = true;
            } else {
                let app = caps
                    .get(3)
                    .map(|m| m.as_str().to_string())
                    .ok_or_else(|| malformed(line_num, line))?;
                policy.application = Some(app);
            }
            return Ok(());
        }

        Err(malformed(line_num, line))
    }

    fn parse_policy_block<'t, I>(&mut self, id: u32, open_line: usize, lines: &mut I) -> Result<()>
    where
        I: Iterator<Item = (usize, &'t str)>,
    {
        if self.config.policies.get(id).is_none() {
            return Err(ConvertError::UnknownPolicy {
                line: open_line,
                id,
            });
        }

        while let Some((line_num, line)) = lines.next() {
            if line == BLOCK_TERMINATOR {
                return Ok(());
            }
            if line.is_empty() {
                continue;
            }

            let Some(policy) = self.config.policies.get_mut(id) else {
                return Err(ConvertError::UnknownPolicy { line: line_num, id });
            };

            if let Some(caps) = BLOCK_REFERENCE_PATTERN.captures(line) {
                let name = &caps[2];
                match &caps[1] {
                    "service" => policy.add_service(name),
                    "src-address" => policy.add_source(name),
                    _ => policy.add_destination(name),
                }
                continue;
            }

            if let Some(caps) = BLOCK_LOG_PATTERN.captures(line) {
                let option = caps[1].trim();
                if option != SESSION_INIT_LOG {
                    return Err(ConvertError::UnsupportedLogOption {
                        line: line_num,
                        option: option.to_string(),
                    });
                }
                policy.log_init = true;
                continue;
            }

            return Err(ConvertError::UnexpectedBlockLine {
                line: line_num,
                content: line.to_string(),
            });
        }

        Err(ConvertError::UnterminatedBlock {
            line: open_line,
            id,
        })
    }
}

fn malformed(line_num: usize, line: &str) -> ConvertError {
    ConvertError::ParseErrorAtLine {
        line: line_num,
        message: format!("Malformed directive: {}", line),
    }
}

fn parse_number<T: std::str::FromStr>(s: &str, line_num: usize) -> Result<T> {
    s.parse().map_err(|_| ConvertError::ParseErrorAtLine {
        line: line_num,
        message: format!("Number out of range: {}", s),
    })
}

fn parse_range(start: &str, end: &str, line_num: usize) -> Result<PortRange> {
    let start = parse_number(start, line_num)?;
    let end = parse_number(end, line_num)?;
    PortRange::new(start, end).map_err(|e| ConvertError::ParseErrorAtLine {
        line: line_num,
        message: e.to_string(),
    })
}

fn service_from_captures(caps: &Captures<'_>, line_num: usize) -> Result<Service> {
    if let Some(proto) = caps.get(3) {
        let protocol: Protocol =
            proto
                .as_str()
                .parse()
                .map_err(|e: ConvertError| ConvertError::ParseErrorAtLine {
                    line: line_num,
                    message: e.to_string(),
                })?;
        let src = parse_range(&caps[4], &caps[5], line_num)?;
        let dst = parse_range(&caps[6], &caps[7], line_num)?;
        return Ok(Service::new(protocol, src, dst));
    }

    let icmp_type = parse_number(&caps[8], line_num)?;
    Ok(Service::icmp(Some(icmp_type)))
}

fn policy_from_captures(caps: &Captures<'_>, line_num: usize) -> Result<Policy> {
    let id = parse_number(&caps[1], line_num)?;
    let action: Action = caps[11]
        .parse()
        .map_err(|e: ConvertError| ConvertError::ParseErrorAtLine {
            line: line_num,
            message: e.to_string(),
        })?;

    let mut policy = Policy::new(id, &caps[3], &caps[4], &caps[5], &caps[6], &caps[7], action);
    policy.name = caps
        .get(2)
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    policy.nat = match caps.get(8).map(|m| m.as_str()) {
        Some("nat src") => NatMode::Source,
        Some("nat dst") => NatMode::Destination,
        _ => NatMode::None,
    };
    policy.nat_address = caps.get(9).map(|m| m.as_str().to_string());
    policy.nat_port = caps
        .get(10)
        .map(|m| parse_number(m.as_str(), line_num))
        .transpose()?;
    policy.log = caps.get(12).is_some();
    Ok(policy)
}
