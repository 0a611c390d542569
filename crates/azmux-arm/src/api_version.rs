use std::collections::HashSet;
use std::sync::Mutex;

use tracing::warn;

pub const DEFAULT_API_VERSION: &str = "2016-02-01";

#[derive(Debug, Clone, PartialEq, Eq)]
struct VersionRule {
    namespace: String,
    resource:  Option<String>,
    version:   String,
}

/// Maps ARM resource types to the `api-version` their endpoints require.
///
/// A rule matches a request path when the path contains the rule's provider
/// namespace segment and, for resource rules, the resource segment as well.
/// Resource rules win over namespace-only rules; within a class the first
/// rule added wins.
#[derive(Debug)]
pub struct ApiVersionTable {
    rules:   Vec<VersionRule>,
    default: String,
    warned:  Mutex<HashSet<String>>,
}

impl Default for ApiVersionTable {
    fn default() -> Self {
        Self::azure()
    }
}

impl Clone for ApiVersionTable {
    fn clone(&self) -> Self {
        Self {
            rules:   self.rules.clone(),
            default: self.default.clone(),
            warned:  Mutex::new(HashSet::new()),
        }
    }
}

impl ApiVersionTable {
    pub fn empty(default: &str) -> Self {
        Self {
            rules:   Vec::new(),
            default: default.to_string(),
            warned:  Mutex::new(HashSet::new()),
        }
    }

    /// Add a rule. `resource = None` covers the whole namespace.
    pub fn with_rule(mut self, namespace: &str, resource: Option<&str>, version: &str) -> Self {
        self.rules.push(VersionRule {
            namespace: namespace.to_ascii_lowercase(),
            resource:  resource.map(|r| r.to_ascii_lowercase()),
            version:   version.to_string(),
        });
        self
    }

    /// The versions the public ARM endpoints are known to accept.
    pub fn azure() -> Self {
        Self::empty(DEFAULT_API_VERSION)
            .with_rule("microsoft.compute", Some("virtualmachines"), "2021-11-01")
            .with_rule("microsoft.compute", Some("skus"), "2019-04-01")
            .with_rule("microsoft.compute", Some("publishers"), "2020-06-01")
            .with_rule("microsoft.compute", Some("tags"), "2020-06-01")
            .with_rule("microsoft.compute", None, "2018-06-01")
            .with_rule("microsoft.classiccompute", None, "2016-04-01")
            .with_rule("microsoft.network", Some("virtualnetworks"), "2018-08-01")
            .with_rule("microsoft.network", Some("publicipaddresses"), "2018-03-01")
            .with_rule("microsoft.network", Some("frontdoorwebapplicationfirewallpolicies"), "2020-11-01")
            .with_rule("microsoft.network", Some("frontdoorwebapplicationfirewallmanagedrulesets"), "2020-11-01")
            .with_rule("microsoft.network", Some("applicationgatewaywebapplicationfirewallpolicies"), "2021-01-01")
            .with_rule("microsoft.network", None, "2018-06-01")
            .with_rule("microsoft.classicnetwork", None, "2016-04-01")
            .with_rule("microsoft.storage", Some("storageaccounts"), "2016-12-01")
            .with_rule("microsoft.storage", Some("checknameavailability"), "2019-04-01")
            .with_rule("microsoft.storage", Some("skus"), "2019-04-01")
            .with_rule("microsoft.storage", Some("usages"), "2018-07-01")
            .with_rule("microsoft.storage", None, "2016-12-01")
            .with_rule("microsoft.classicstorage", Some("storageaccounts"), "2016-04-01")
            .with_rule("microsoft.billing", None, "2018-03-01-preview")
            .with_rule("microsoft.insights", None, "2017-03-01-preview")
            .with_rule("microsoft.authorization", None, "2018-01-01-preview")
            .with_rule("microsoft.dbformariadb", None, "2018-06-01-preview")
            .with_rule("microsoft.dbformysql", Some("flexibleservers"), "2020-07-01-privatepreview")
            .with_rule("microsoft.dbformysql", None, "2017-12-01")
            .with_rule("microsoft.dbforpostgresql", Some("flexibleservers"), "2020-02-14-preview")
            .with_rule("microsoft.dbforpostgresql", None, "2017-12-01")
            .with_rule("microsoft.sql", None, "2020-08-01-preview")
            .with_rule("microsoft.cache", Some("redisenterprise"), "2021-03-01")
            .with_rule("microsoft.cache", None, "2020-06-01")
            .with_rule("microsoft.containerservice", None, "2021-05-01")
            .with_rule("microsoft.operationalinsights", None, "2021-12-01-preview")
            .with_rule("microsoft.resources", Some("tags"), "2020-06-01")
    }

    pub fn default_version(&self) -> &str {
        &self.default
    }

    /// Version for a path; unknown `microsoft.*` namespaces fall back to the
    /// default with a one-time warning.
    pub fn version_for(&self, path: &str) -> &str {
        let path = path.split('?').next().unwrap_or_default().to_ascii_lowercase();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let has = |seg: &str| segments.iter().any(|s| *s == seg);

        let specific = self.rules.iter().find(|r| {
            r.resource.as_deref().map_or(false, |res| has(&r.namespace) && has(res))
        });
        let general = || {
            self.rules
                .iter()
                .find(|r| r.resource.is_none() && has(&r.namespace))
        };
        if let Some(rule) = specific.or_else(general) {
            return &rule.version;
        }

        // Rules exist for some resources of the namespace but not this one;
        // anything else under microsoft.* is simply not covered.
        for ns in segments.iter().filter(|s| s.starts_with("microsoft.")) {
            let known = self.rules.iter().any(|r| r.namespace == *ns);
            let mut warned = match self.warned.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            if warned.insert(ns.to_string()) {
                warn!(
                    namespace = %ns,
                    partially_covered = known,
                    version = %self.default,
                    "no api-version rule for namespace, using default"
                );
            }
        }
        &self.default
    }

    /// Append the api-version query parameter unless the path carries one.
    pub fn apply(&self, path: &str) -> String {
        if path.contains("api-version") {
            return path.to_string();
        }
        with_api_version(path, self.version_for(path))
    }
}

/// Append `api-version={version}` with `?` or `&` as appropriate.
pub fn with_api_version(path: &str, version: &str) -> String {
    if path.contains("api-version") {
        return path.to_string();
    }
    let sep = if path.contains('?') { '&' } else { '?' };
    format!("{}{}api-version={}", path, sep, version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_rule_selects_its_version() {
        let table = ApiVersionTable::azure();
        for rule in &table.rules {
            let resource = rule.resource.clone().unwrap_or_else(|| "unlistedthings".into());
            let path = format!(
                "/subscriptions/S/resourceGroups/rg/providers/{}/{}/x",
                rule.namespace, resource
            );
            let url = table.apply(&path);
            assert!(
                url.ends_with(&format!("api-version={}", rule.version)),
                "{} -> {}",
                path,
                url
            );
        }
    }

    #[test]
    fn matching_ignores_case() {
        let table = ApiVersionTable::azure();
        assert_eq!(
            table.version_for("/subscriptions/S/providers/Microsoft.Network/publicIPAddresses"),
            "2018-03-01"
        );
        assert_eq!(
            table.version_for("/subscriptions/S/providers/Microsoft.Storage/checkNameAvailability"),
            "2019-04-01"
        );
    }

    #[test]
    fn unrelated_path_uses_default() {
        let table = ApiVersionTable::azure();
        assert_eq!(table.version_for("/subscriptions/S/resourcegroups"), DEFAULT_API_VERSION);
        assert_eq!(table.version_for("/subscriptions"), DEFAULT_API_VERSION);
        assert_eq!(
            table.version_for("/subscriptions/S/providers/Microsoft.Web/sites"),
            DEFAULT_API_VERSION
        );
    }

    #[test]
    fn path_composition() {
        let table = ApiVersionTable::azure();
        assert_eq!(
            table.apply("/subscriptions?api-version=2020-01-01"),
            "/subscriptions?api-version=2020-01-01"
        );
        assert_eq!(
            table.apply("/subscriptions?foo=bar"),
            "/subscriptions?foo=bar&api-version=2016-02-01"
        );
        assert_eq!(table.apply("/subscriptions"), "/subscriptions?api-version=2016-02-01");
    }

    #[test]
    fn query_string_does_not_influence_matching() {
        let table = ApiVersionTable::azure();
        assert_eq!(
            table.version_for("/subscriptions/S/resourcegroups?$filter=microsoft.compute"),
            DEFAULT_API_VERSION
        );
    }

    #[test]
    fn custom_table() {
        let table = ApiVersionTable::empty("2000-01-01").with_rule("microsoft.web", None, "2022-03-01");
        assert_eq!(table.version_for("/providers/Microsoft.Web/sites"), "2022-03-01");
        assert_eq!(table.version_for("/providers/Microsoft.Compute/disks"), "2000-01-01");
    }
}
