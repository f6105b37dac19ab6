//! ScreenOS to RouterOS - translate ScreenOS firewall configuration exports
//! into MikroTik RouterOS filter scripts
//!
//! This library provides:
//! - A directive parser for `set address`, `set group address`,
//!   `set service` and `set policy` lines, including multi-line policy blocks
//! - Zone-scoped address objects and recursive group resolution
//! - A built-in service catalog extended by the input's own definitions
//! - A rule compiler producing `/ip firewall address-list` and
//!   `/ip firewall filter` statements
//!
//! # Example
//!
//! ```rust
//! use screenos_mikrotik::{ConvertOptions, Converter, NilResolver};
//!
//! let config = r#"
//! set address "Trust" "Server1" 10.0.0.1 255.255.255.255
//! set policy id 1 from "Trust" to "Untrust"  "Server1" "Any" "HTTPS" permit
//! "#;
//!
//! let converter = Converter::new(ConvertOptions::new(), Box::new(NilResolver));
//! let conversion = converter.convert(config).unwrap();
//!
//! assert_eq!(conversion.rule_set.rule_count(), 1);
//! let script = conversion.script();
//! assert!(script.contains("src-address=10.0.0.1/32 protocol=tcp dst-port=443 action=accept"));
//! ```
//!
//! # Input Directives
//!
//! | Directive | Effect |
//! |-----------|--------|
//! | `set address "Z" "N" <ip> <mask>` | Address object, host name or CIDR accepted too |
//! | `set group address "Z" "G" add "N"` | Group membership, group created on demand |
//! | `set service "S" protocol tcp src-port a-b dst-port c-d` | Service definition |
//! | `set service "S" + udp src-port a-b dst-port c-d` | Additional service entry |
//! | `set policy id N from "Z1" to "Z2"  "src" "dst" "svc" permit` | Policy |
//! | `set policy id N` ... `exit` | Block appending sources, destinations, services |
//! | `set policy id N disable` | Disable a policy |
//!
//! Lines with any other prefix are ignored.
//!
//! # Output
//!
//! Groups (more than one resolved address) become address-lists named
//! `<zone>__<name>`; single addresses are inlined. Each policy yields one
//! rule per protocol of each service, per source, per destination, in
//! chain `<from>__<to>`.

pub mod compile;
pub mod convert;
pub mod error;
pub mod objects;
pub mod parser;
pub mod resolver;
pub mod services;
pub mod types;

// Re-export commonly used items
pub use compile::{compile, AddressListEntry, Endpoint, FilterRule, PolicyRules, RuleSet};
pub use convert::{ConvertOptions, Conversion, Converter, DEFAULT_ZONE};
pub use error::{ConvertError, Result};
pub use objects::{AddressObject, ObjectStore, Resolution};
pub use parser::{parse_config, parse_config_from_file, ParsedConfig};
pub use services::{PortRange, Protocol, Service, ServiceCatalog, ServiceList};
pub use types::{Action, Diagnostic, NatMode, Policy, PolicySet};

// Re-export resolver types
pub use resolver::{NilResolver, Resolver, StaticResolver, SystemResolver};
