//! Conversion pipeline.
//!
//! Parses a configuration export, keeps the policies of interest and
//! compiles them into a RouterOS script.

use std::path::Path;

use tracing::debug;

use crate::compile::{compile, RuleSet};
use crate::error::Result;
use crate::parser::{parse_config, parse_config_from_file, ParsedConfig};
use crate::resolver::{Resolver, SystemResolver};
use crate::types::{Diagnostic, Policy};

/// Zone the legacy migration cared about; the CLI's default filter.
pub const DEFAULT_ZONE: &str = "Clients";

/// Converter options.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Keep only policies whose from- or to-zone is listed. Empty keeps all.
    pub zones: Vec<String>,
}

impl ConvertOptions {
    /// Create new options that keep every policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a zone of interest.
    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zones.push(zone.into());
        self
    }

    /// Add several zones of interest.
    pub fn with_zones<I, S>(mut self, zones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.zones.extend(zones.into_iter().map(Into::into));
        self
    }

    fn keeps(&self, policy: &Policy) -> bool {
        self.zones.is_empty() || self.zones.iter().any(|z| policy.involves_zone(z))
    }
}

/// Result of a successful conversion.
#[derive(Debug, Clone)]
pub struct Conversion {
    /// Parsed model, already narrowed to the zones of interest
    pub config: ParsedConfig,
    pub rule_set: RuleSet,
}

impl Conversion {
    /// The generated RouterOS script.
    pub fn script(&self) -> String {
        self.rule_set.render()
    }

    /// Parse-time then compile-time diagnostics.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.config
            .diagnostics
            .iter()
            .chain(self.rule_set.diagnostics.iter())
    }
}

/// Converts configuration exports into RouterOS scripts.
pub struct Converter {
    options: ConvertOptions,
    resolver: Box<dyn Resolver>,
}

impl Converter {
    /// Create a converter with the given options and hostname resolver.
    pub fn new(options: ConvertOptions, resolver: Box<dyn Resolver>) -> Self {
        Self { options, resolver }
    }

    /// Replace the hostname resolver.
    pub fn with_resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Parse `text` and drop the policies outside the zones of interest.
    pub fn parse(&self, text: &str) -> Result<ParsedConfig> {
        let config = parse_config(text, self.resolver.as_ref())?;
        Ok(self.narrow(config))
    }

    /// Convert a whole configuration export.
    pub fn convert(&self, text: &str) -> Result<Conversion> {
        self.finish(self.parse(text)?)
    }

    /// Convert a configuration export read from a file.
    pub fn convert_file(&self, path: impl AsRef<Path>) -> Result<Conversion> {
        let config = parse_config_from_file(path, self.resolver.as_ref())?;
        self.finish(self.narrow(config))
    }

    fn narrow(&self, mut config: ParsedConfig) -> ParsedConfig {
        let before = config.policies.len();
        config
            .policies
            .retain(|p| self.options.keeps(p));
        debug!(
            kept = config.policies.len(),
            dropped = before - config.policies.len(),
            "filtered policies by zone"
        );
        config
    }

    fn finish(&self, config: ParsedConfig) -> Result<Conversion> {
        let rule_set = compile(&config.policies, &config.objects, &config.services)?;
        Ok(Conversion { config, rule_set })
    }
}

impl Default for Converter {
    fn default() -> Self {
        Self::new(ConvertOptions::default(), Box::new(SystemResolver::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvertError;
    use crate::resolver::NilResolver;
    use crate::types::Action;

    const CONFIG: &str = r#"
set address "Clients" "pc1" 10.10.0.11 255.255.255.255
set address "Servers" "db" 10.20.0.5 255.255.255.255
set policy id 1 from "Clients" to "Servers"  "pc1" "db" "MS-SQL" permit
set policy id 2 from "Servers" to "Untrust"  "db" "Any" "HTTPS" permit
set policy id 3 from "Untrust" to "Clients"  "Any" "pc1" "PING" permit
"#;

    fn converter(options: ConvertOptions) -> Converter {
        Converter::new(options, Box::new(NilResolver))
    }

    #[test]
    fn test_options_builder() {
        let options = ConvertOptions::new()
            .with_zone("Clients")
            .with_zones(["Servers", "DMZ"]);
        assert_eq!(options.zones, vec!["Clients", "Servers", "DMZ"]);
        let policy =
            |from: &str, to: &str| Policy::new(1, from, to, "any", "any", "ANY", Action::Permit);
        assert!(options.keeps(&policy("Clients", "Untrust")));
        assert!(options.keeps(&policy("Untrust", "DMZ")));
        assert!(!options.keeps(&policy("Untrust", "Trust")));
        assert!(ConvertOptions::new().keeps(&policy("a", "b")));
    }

    #[test]
    fn test_zone_filter_keeps_either_side() {
        let conv = converter(ConvertOptions::new().with_zone(DEFAULT_ZONE));
        let result = conv.convert(CONFIG).unwrap();
        let ids: Vec<u32> = result.config.policies.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 3]);
        // MS-SQL is tcp + udp, PING is icmp
        assert_eq!(result.rule_set.rule_count(), 3);
    }

    #[test]
    fn test_no_zone_filter_keeps_everything() {
        let conv = converter(ConvertOptions::new());
        let result = conv.convert(CONFIG).unwrap();
        assert_eq!(result.config.policies.len(), 3);
        assert_eq!(result.rule_set.rule_count(), 4);
    }

    #[test]
    fn test_diagnostics_are_chained() {
        let text = r#"
set address "Clients" "nas" nas.invalid
set policy id 1 from "Clients" to "Untrust"  "ghost" "Any" "HTTP" permit
"#;
        let result = converter(ConvertOptions::new()).convert(text).unwrap();
        let diags: Vec<&Diagnostic> = result.diagnostics().collect();
        assert_eq!(diags.len(), 2);
        assert!(matches!(diags[0], Diagnostic::UnresolvedHost { .. }));
        assert!(matches!(diags[1], Diagnostic::ObjectNotFound { .. }));
    }

    #[test]
    fn test_fatal_error_yields_no_conversion() {
        let text = r#"set policy id 1 from "Clients" to "Untrust"  "Any" "Any" "NOPE" permit"#;
        assert!(converter(ConvertOptions::new()).convert(text).is_err());
    }

    #[test]
    fn test_with_resolver() {
        use crate::resolver::StaticResolver;

        let text = r#"
set address "Clients" "nas" nas.lan
set policy id 1 from "Clients" to "Untrust"  "nas" "Any" "HTTP" permit
"#;
        let conv = converter(ConvertOptions::new()).with_resolver(
            StaticResolver::new().with_mapping("nas.lan", "10.10.0.50".parse().unwrap()),
        );
        let result = conv.convert(text).unwrap();
        assert!(result.script().contains("src-address=10.10.0.50/32"));
        assert_eq!(result.diagnostics().count(), 0);
    }

    #[test]
    fn test_convert_file_missing() {
        let conv = converter(ConvertOptions::new());
        assert!(matches!(
            conv.convert_file("/nonexistent/export.conf"),
            Err(ConvertError::ParseError(_))
        ));
    }
}
