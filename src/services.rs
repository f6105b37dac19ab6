//! Service catalog.
//!
//! Maps service names to the protocol/port tuples they stand for. A fixed
//! built-in table covers the names the source platform predefines; service
//! directives in the input extend it.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;

use crate::error::{ConvertError, Result};

/// Reserved service name that matches every protocol and port.
pub const ANY_SERVICE: &str = "ANY";

/// IP protocol carried by a service definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    /// Raw IP protocol number (ESP, AH, GRE, ...)
    Number(u8),
}

impl Protocol {
    /// Whether port ranges apply to this protocol.
    pub fn has_ports(&self) -> bool {
        matches!(self, Protocol::Tcp | Protocol::Udp)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("tcp"),
            Protocol::Udp => f.write_str("udp"),
            Protocol::Icmp => f.write_str("icmp"),
            Protocol::Number(n) => write!(f, "{}", n),
        }
    }
}

impl FromStr for Protocol {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            "icmp" => Ok(Protocol::Icmp),
            other => other
                .parse::<u8>()
                .map(Protocol::Number)
                .map_err(|_| ConvertError::ParseError(format!("Unknown protocol: {}", s))),
        }
    }
}

/// Inclusive port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    /// The whole 0-65535 span, meaning "no port constraint".
    pub const FULL: PortRange = PortRange {
        start: 0,
        end: u16::MAX,
    };

    pub fn new(start: u16, end: u16) -> Result<Self> {
        if start > end {
            return Err(ConvertError::ParseError(format!(
                "Invalid port range: {} > {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub const fn single(port: u16) -> Self {
        Self {
            start: port,
            end: port,
        }
    }

    pub fn is_full(&self) -> bool {
        *self == Self::FULL
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// One protocol/port tuple (or ICMP type) of a named service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub protocol: Protocol,
    pub icmp_type: Option<u8>,
    pub src_ports: PortRange,
    pub dst_ports: PortRange,
}

impl Service {
    pub fn new(protocol: Protocol, src_ports: PortRange, dst_ports: PortRange) -> Self {
        Self {
            protocol,
            icmp_type: None,
            src_ports,
            dst_ports,
        }
    }

    /// TCP with any source port and the given destination range.
    pub const fn tcp(dst_start: u16, dst_end: u16) -> Self {
        Self::ported(Protocol::Tcp, dst_start, dst_end)
    }

    /// UDP with any source port and the given destination range.
    pub const fn udp(dst_start: u16, dst_end: u16) -> Self {
        Self::ported(Protocol::Udp, dst_start, dst_end)
    }

    pub fn icmp(icmp_type: Option<u8>) -> Self {
        Self {
            protocol: Protocol::Icmp,
            icmp_type,
            src_ports: PortRange::FULL,
            dst_ports: PortRange::FULL,
        }
    }

    /// Portless raw IP protocol.
    pub fn ip(number: u8) -> Self {
        Self::new(Protocol::Number(number), PortRange::FULL, PortRange::FULL)
    }

    const fn ported(protocol: Protocol, dst_start: u16, dst_end: u16) -> Self {
        Self {
            protocol,
            icmp_type: None,
            src_ports: PortRange::FULL,
            dst_ports: PortRange {
                start: dst_start,
                end: dst_end,
            },
        }
    }
}

/// Ordered definitions behind one service name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceList(pub Vec<Service>);

impl ServiceList {
    /// Distinct protocols, in the order they first appear.
    pub fn protocols(&self) -> Vec<Protocol> {
        let mut protos: Vec<Protocol> = Vec::new();
        for svc in &self.0 {
            if !protos.contains(&svc.protocol) {
                protos.push(svc.protocol);
            }
        }
        protos
    }

    /// Definitions of the given protocol.
    pub fn for_protocol(&self, protocol: Protocol) -> impl Iterator<Item = &Service> {
        self.0.iter().filter(move |s| s.protocol == protocol)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Mapping from service name to its definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCatalog {
    entries: HashMap<String, ServiceList>,
}

impl ServiceCatalog {
    /// Catalog with no entries at all.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Copy of the built-in table.
    pub fn builtin() -> Self {
        BUILTIN_SERVICES.clone()
    }

    /// Append a definition to `name`, creating the entry if needed.
    pub fn add(&mut self, name: &str, service: Service) {
        self.entries
            .entry(name.to_string())
            .or_default()
            .0
            .push(service);
    }

    /// Replace whatever `name` held with a single definition.
    pub fn redefine(&mut self, name: &str, service: Service) {
        self.entries
            .insert(name.to_string(), ServiceList(vec![service]));
    }

    /// Register `name` with an explicit definition list (possibly empty).
    pub fn insert(&mut self, name: &str, list: ServiceList) {
        self.entries.insert(name.to_string(), list);
    }

    pub fn get(&self, name: &str) -> Option<&ServiceList> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

static BUILTIN_SERVICES: Lazy<ServiceCatalog> = Lazy::new(|| {
    let table: Vec<(&str, Vec<Service>)> = vec![
        (ANY_SERVICE, vec![]),
        ("HTTP", vec![Service::tcp(80, 80)]),
        ("HTTPS", vec![Service::tcp(443, 443)]),
        ("HTTP-EXT", vec![Service::tcp(8080, 8080)]),
        ("TELNET", vec![Service::tcp(23, 23)]),
        ("SSH", vec![Service::tcp(22, 22)]),
        ("SYSLOG", vec![Service::udp(514, 514)]),
        ("FTP", vec![Service::tcp(20, 21)]),
        (
            "CIFS",
            vec![
                Service::udp(137, 138),
                Service::tcp(139, 139),
                Service::tcp(445, 445),
            ],
        ),
        ("MS-SQL", vec![Service::tcp(1433, 1433), Service::udp(1434, 1434)]),
        ("SQL Monitor", vec![Service::udp(1434, 1434)]),
        ("RADIUS", vec![Service::udp(1812, 1813)]),
        ("VNC", vec![Service::tcp(5900, 5900)]),
        ("PING", vec![Service::icmp(Some(8))]),
        ("ICMP-ANY", vec![Service::icmp(None)]),
        (
            "MAIL",
            vec![
                Service::tcp(25, 25),
                Service::tcp(465, 465),
                Service::tcp(587, 587),
            ],
        ),
        (
            "SMTP",
            vec![
                Service::tcp(25, 25),
                Service::tcp(465, 465),
                Service::tcp(587, 587),
            ],
        ),
        (
            "H.323",
            vec![
                Service::udp(1719, 1719),
                Service::tcp(1720, 1720),
                Service::tcp(1731, 1731),
                Service::tcp(1024, u16::MAX),
            ],
        ),
        ("SCCP", vec![Service::tcp(2000, 2000)]),
        ("SIP", vec![Service::tcp(5060, 5061), Service::udp(5060, 5061)]),
        ("TFTP", vec![Service::udp(69, 69), Service::udp(1024, u16::MAX)]),
        ("PPTP", vec![Service::tcp(1723, 1723), Service::ip(47)]),
        ("UDP-ANY", vec![Service::udp(0, u16::MAX)]),
        ("TCP-ANY", vec![Service::tcp(0, u16::MAX)]),
        ("DHCP-Relay", vec![Service::udp(67, 68)]),
        ("NBDS", vec![Service::udp(137, 137)]),
        ("NBNAME", vec![Service::udp(138, 138)]),
        ("SMB", vec![Service::tcp(445, 445)]),
        ("SNMP", vec![Service::udp(161, 161)]),
        (
            "NFS",
            vec![
                Service::tcp(111, 111),
                Service::udp(111, 111),
                Service::tcp(2049, 2049),
                Service::udp(2049, 2049),
            ],
        ),
        ("IMAP", vec![Service::tcp(143, 143)]),
        ("POP3", vec![Service::tcp(110, 110)]),
        ("DNS", vec![Service::tcp(53, 53), Service::udp(53, 53)]),
        ("LDAP", vec![Service::tcp(389, 389)]),
        ("NTP", vec![Service::udp(123, 123)]),
        (
            "MS-NETLOGON",
            vec![
                Service::udp(137, 138),
                Service::tcp(139, 139),
                Service::tcp(445, 445),
                Service::tcp(1024, 5000),
                Service::tcp(49152, u16::MAX),
            ],
        ),
        // Tracked by name only; no port semantics
        ("MS-AD", vec![]),
        ("MS-AD-BR", vec![]),
        ("MS-AD-DRSUAPI", vec![]),
        ("MS-AD-DSROLE", vec![]),
        ("MS-AD-DSSETUP", vec![]),
        ("MS-RPC-ANY", vec![]),
        ("MS-RPC-EPM", vec![]),
        ("MS-WIN-DNS", vec![]),
        ("MS-WINS", vec![]),
        ("WHOIS", vec![]),
    ];

    let mut catalog = ServiceCatalog::empty();
    for (name, defs) in table {
        catalog.insert(name, ServiceList(defs));
    }
    catalog
});
