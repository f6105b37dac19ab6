//! End-to-end conversion tests through the public API.

use pretty_assertions::assert_eq;
use screenos_mikrotik::{
    ConvertError, ConvertOptions, Conversion, Converter, Diagnostic, NilResolver, Result,
    StaticResolver,
};

fn convert(text: &str) -> Result<Conversion> {
    Converter::new(ConvertOptions::new(), Box::new(NilResolver)).convert(text)
}

const SITE: &str = r#"
set service "APP-8080" protocol tcp src-port 0-65535 dst-port 8080-8080
set service "APP-8080" + tcp src-port 1024-65535 dst-port 8443-8443
set service "APP-8080" + udp src-port 0-65535 dst-port 0-65535

set address "Trust" "Server1" 10.0.0.1 255.255.255.255
set address "Trust" "Server2" 10.0.0.2 255.255.255.255
set address "Trust" "Server3" 10.0.0.1 255.255.255.255
set address "Trust" "lan" 10.0.0.0 255.255.255.0
set address "Untrust" "dns-a" 192.0.2.53 255.255.255.255
set address "Untrust" "dns-b" 192.0.2.54 255.255.255.255

set group address "Trust" "Servers" add "Server1"
set group address "Trust" "Servers" add "Server2"
set group address "Trust" "All" add "Servers"
set group address "Trust" "All" add "Server3"
set group address "Trust" "All" add "lan"
set group address "Untrust" "Resolvers" add "dns-a"
set group address "Untrust" "Resolvers" add "dns-b"

set policy id 1 from "Trust" to "Untrust"  "Server1" "Any" "HTTPS" permit
set policy id 2 from "Trust" to "Untrust"  "Servers" "Any" "SSH" permit
set policy id 3 from "Trust" to "Untrust"  "All" "Resolvers" "DNS" permit
set policy id 4 from "Trust" to "Untrust"  "lan" "Any" "APP-8080" permit
set policy id 5 from "Untrust" to "Trust"  "Any" "Any" "ANY" deny
"#;

#[test]
fn test_single_host_https_rule() {
    let text = r#"
set address "Trust" "Server1" 10.0.0.1 255.255.255.255
set policy id 1 from "Trust" to "Untrust"  "Server1" "any" "HTTPS" permit
"#;
    let conversion = convert(text).unwrap();
    let rules: Vec<String> = conversion.rule_set.rules().map(|r| r.to_string()).collect();

    assert_eq!(
        rules,
        vec![
            "add chain=Trust__Untrust src-address=10.0.0.1/32 protocol=tcp dst-port=443 \
             action=accept comment=\"ID: 1 - Server1 -> any\""
                .to_string()
        ]
    );
    assert!(!rules[0].contains("dst-address"));
}

#[test]
fn test_group_becomes_address_list() {
    let conversion = convert(SITE).unwrap();

    let servers: Vec<String> = conversion
        .rule_set
        .address_lists
        .iter()
        .filter(|e| e.list == "Trust__Servers")
        .map(|e| e.to_string())
        .collect();
    assert_eq!(
        servers,
        vec![
            "add list=Trust__Servers address=10.0.0.1/32 comment=\"Server1\"".to_string(),
            "add list=Trust__Servers address=10.0.0.2/32 comment=\"Server2\"".to_string(),
        ]
    );

    let policy2 = &conversion.rule_set.policies[1];
    assert_eq!(policy2.policy_id, 2);
    assert_eq!(policy2.rules.len(), 1);
    assert!(policy2.rules[0]
        .to_string()
        .contains(" src-address-list=Trust__Servers protocol=tcp dst-port=22 "));
}

#[test]
fn test_nested_group_deduplicates_first_name() {
    let conversion = convert(SITE).unwrap();
    let all: Vec<(String, String)> = conversion
        .rule_set
        .address_lists
        .iter()
        .filter(|e| e.list == "Trust__All")
        .map(|e| (e.address.to_string(), e.comment.clone()))
        .collect();

    // Server3 duplicates Server1's address and is dropped
    assert_eq!(
        all,
        vec![
            ("10.0.0.1/32".to_string(), "Server1".to_string()),
            ("10.0.0.2/32".to_string(), "Server2".to_string()),
            ("10.0.0.0/24".to_string(), "lan".to_string()),
        ]
    );
}

#[test]
fn test_zone_wide_deny_is_not_materialized() {
    let conversion = convert(SITE).unwrap();
    let ids: Vec<u32> = conversion
        .rule_set
        .policies
        .iter()
        .map(|p| p.policy_id)
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert!(conversion
        .rule_set
        .rules()
        .all(|r| r.chain == "Trust__Untrust"));
}

#[test]
fn test_unknown_service_aborts() {
    let text = r#"
set address "Trust" "Server1" 10.0.0.1 255.255.255.255
set policy id 1 from "Trust" to "Untrust"  "Server1" "any" "HTTPS" permit
set policy id 2 from "Trust" to "Untrust"  "Server1" "any" "NO-SUCH-SERVICE" permit
"#;
    let err = convert(text).unwrap_err();
    assert!(matches!(
        err,
        ConvertError::UnknownService { policy: 2, ref service } if service == "NO-SUCH-SERVICE"
    ));
}

#[test]
fn test_rule_count_formula() {
    let text = r#"
set address "Trust" "a" 10.0.0.1 255.255.255.255
set address "Trust" "b" 10.0.0.2 255.255.255.255
set address "Trust" "c" 10.0.0.3 255.255.255.255
set group address "Trust" "bc" add "b"
set group address "Trust" "bc" add "c"
set address "Untrust" "x" 192.0.2.1 255.255.255.255
set address "Untrust" "y" 192.0.2.2 255.255.255.255
set group address "Untrust" "xy" add "x"
set group address "Untrust" "xy" add "y"
set policy id 7 from "Trust" to "Untrust"  "a" "x" "DNS" permit
set policy id 7
set src-address "bc"
set src-address "b"
set dst-address "xy"
exit
"#;
    let conversion = convert(text).unwrap();

    // N=2 (a, b), S=1 (bc), M=1 (x), D=1 (xy), DNS is tcp + udp
    let (n, s, m, d, p) = (2, 1, 1, 1, 2);
    assert_eq!(
        conversion.rule_set.rule_count(),
        (n * m + n * d + s * m + s * d) * p
    );
}

#[test]
fn test_full_port_range_never_emitted() {
    let conversion = convert(SITE).unwrap();
    let script = conversion.script();
    assert!(!script.contains("0-65535"));

    let app: Vec<String> = conversion.rule_set.policies[3]
        .rules
        .iter()
        .map(|r| r.to_string())
        .collect();
    assert_eq!(app.len(), 2);
    assert!(app[0].contains(" protocol=tcp src-port=1024-65535 dst-port=8080,8443 "));
    assert!(app[1].contains(" protocol=udp action=accept "));
}

#[test]
fn test_address_list_round_trip() {
    let conversion = convert(SITE).unwrap();
    let objects = &conversion.config.objects;

    for entry in &conversion.rule_set.address_lists {
        let (zone, name) = entry.list.split_once("__").unwrap();
        let resolution = objects.resolve(zone, name).unwrap();
        let matches = resolution
            .iter()
            .filter(|(n, a)| *n == entry.comment && **a == entry.address)
            .count();
        assert_eq!(matches, 1, "{}", entry);
    }
}

#[test]
fn test_wildcard_resolves_to_single_unconstrained_entry() {
    let conversion = convert(SITE).unwrap();
    for zone in ["Trust", "Untrust", "Nowhere"] {
        let resolution = conversion.config.objects.resolve(zone, "Any").unwrap();
        assert_eq!(resolution.len(), 1);
        assert_eq!(resolution.addresses()[0].prefix_len(), 0);
    }
}

#[test]
fn test_missing_reference_is_diagnosed() {
    let text = r#"
set address "Trust" "Server1" 10.0.0.1 255.255.255.255
set policy id 1 from "Trust" to "Untrust"  "Server1" "any" "HTTP" permit
set policy id 1
set src-address "Retired"
exit
"#;
    let conversion = convert(text).unwrap();
    assert_eq!(conversion.rule_set.rule_count(), 1);
    let diagnostics: Vec<String> = conversion.diagnostics().map(|d| d.to_string()).collect();
    assert_eq!(diagnostics, vec!["Trust Retired not found".to_string()]);
}

#[test]
fn test_unresolved_host_keeps_going() {
    let text = r#"
set address "Untrust" "relay" relay.example.org
set address "Untrust" "mx" mx.example.org
set policy id 1 from "Trust" to "Untrust"  "Any" "mx" "SMTP" permit
"#;
    let resolver =
        StaticResolver::new().with_mapping("mx.example.org", "198.51.100.25".parse().unwrap());
    let converter = Converter::new(ConvertOptions::new(), Box::new(resolver));
    let conversion = converter.convert(text).unwrap();

    assert!(matches!(
        conversion.diagnostics().next(),
        Some(Diagnostic::UnresolvedHost { line: 2, .. })
    ));
    assert!(conversion
        .script()
        .contains(" dst-address=198.51.100.25/32 protocol=tcp dst-port=25,465,587 "));
}

#[test]
fn test_script_framing() {
    let text = r#"
set address "Trust" "Server1" 10.0.0.1 255.255.255.255
set policy id 9 name "ping out" from "Trust" to "Untrust"  "Server1" "any" "PING" permit
"#;
    let script = convert(text).unwrap().script();
    assert_eq!(
        script,
        "/ip firewall address-list\n\
         \n\
         \n\
         /ip firewall filter\n\
         # ID: 9 Name: ping out Disabled: false From: Trust To: Untrust Sources: [Server1] \
         Destinations: [any] Services: [PING] Application:  NAT:  NATAddress:  NATPort: 0 \
         Action: permit Log: false LogInit: false\n\
         add chain=Trust__Untrust src-address=10.0.0.1/32 protocol=icmp icmp-options=8:0-255 \
         action=accept comment=\"ID: 9 - ping out - Server1 -> any\"\n\
         \n"
    );
}
