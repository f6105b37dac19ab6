use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

const CONFIG: &str = r#"
set address "Clients" "pc1" 10.10.0.11 255.255.255.255
set address "Servers" "db" 10.20.0.5 255.255.255.255
set address "Servers" "web" 10.20.0.6 255.255.255.255
set group address "Servers" "farm" add "db"
set group address "Servers" "farm" add "web"
set policy id 1 from "Clients" to "Servers"  "pc1" "farm" "HTTPS" permit
set policy id 2 from "Servers" to "Untrust"  "db" "Any" "DNS" permit
set policy id 3 from "Untrust" to "Clients"  "Any" "Any" "ANY" deny
"#;

fn cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("screenos-mikrotik"))
}

#[test]
fn stdin_defaults_to_clients_zone() {
    cmd()
        .write_stdin(CONFIG)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("/ip firewall address-list\n"))
        .stdout(predicate::str::contains(
            "add list=Servers__farm address=10.20.0.5/32 comment=\"db\"",
        ))
        .stdout(predicate::str::contains(
            "add chain=Clients__Servers src-address=10.10.0.11/32 dst-address-list=Servers__farm",
        ))
        .stdout(predicate::str::contains("chain=Servers__Untrust").not());
}

#[test]
fn all_zones_keeps_every_policy() {
    cmd()
        .arg("--all-zones")
        .write_stdin(CONFIG)
        .assert()
        .success()
        .stdout(predicate::str::contains("chain=Clients__Servers"))
        .stdout(predicate::str::contains(
            "add chain=Servers__Untrust src-address=10.20.0.5/32 protocol=udp dst-port=53",
        ));
}

#[test]
fn zone_flag_selects_policies() {
    cmd()
        .args(["--zone", "Untrust", "-"])
        .write_stdin(CONFIG)
        .assert()
        .success()
        .stdout(predicate::str::contains("chain=Servers__Untrust"))
        .stdout(predicate::str::contains("chain=Clients__Servers").not());
}

#[test]
fn reads_file_and_writes_output() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("export.conf");
    let output = dir.path().join("firewall.rsc");
    fs::write(&input, CONFIG).expect("write input");

    cmd()
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let script = fs::read_to_string(&output).expect("output should be readable");
    assert!(script.contains("\n/ip firewall filter\n# ID: 1 "));
}

#[test]
fn dump_json_writes_filtered_policies() {
    cmd()
        .arg("--dump-json")
        .write_stdin(CONFIG)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"id\": 1"))
        .stdout(predicate::str::contains("\"action\": \"permit\""))
        .stdout(predicate::str::contains("\"id\": 3"))
        .stdout(predicate::str::contains("\"id\": 2").not());
}

#[test]
fn missing_reference_goes_to_stderr() {
    let text = r#"set policy id 1 from "Clients" to "Untrust"  "retired-pc" "Any" "HTTP" permit"#;
    cmd()
        .write_stdin(text)
        .assert()
        .success()
        .stdout(predicate::str::contains("Sources: [retired-pc]"))
        .stdout(predicate::str::contains("add chain").not())
        .stderr(predicate::str::contains("address not found"));
}

#[test]
fn unknown_service_fails_without_output() {
    let text = r#"set policy id 1 from "Clients" to "Untrust"  "Any" "Any" "NO-SUCH-SERVICE" permit"#;
    cmd()
        .write_stdin(text)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("NO-SUCH-SERVICE"));
}

#[test]
fn malformed_directive_reports_line() {
    let text = "\nset address \"Clients\" broken 10.0.0.1\n";
    cmd()
        .write_stdin(text)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("line 2"));
}

#[test]
fn missing_input_file_fails() {
    cmd()
        .arg("/nonexistent/export.conf")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}
