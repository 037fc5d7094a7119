//! Rule registry and resolved rule sets

use crate::config::{Config, ConfigError};
use crate::diagnostic::Severity;
use crate::rule::{Rule, RuleGroup};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::de::DeserializeOwned;
use serde_yaml::Mapping;
use std::path::Path;
use std::sync::Arc;

/// Builds a rule instance from its option map
pub type BuildFn = fn(&Mapping) -> Result<Arc<dyn Rule>, serde_yaml::Error>;

/// A registered rule constructor
#[derive(Clone, Copy)]
pub struct RuleEntry {
    pub name: &'static str,
    pub group: RuleGroup,
    pub build: BuildFn,
}

impl RuleEntry {
    /// Fully qualified name (e.g. "Layout/LineLength")
    pub fn id(&self) -> String {
        format!("{}/{}", self.group, self.name)
    }

    /// Whether `key` names this entry, qualified or bare
    pub fn is_named(&self, key: &str) -> bool {
        key == self.name || key == self.id()
    }
}

impl std::fmt::Debug for RuleEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEntry")
            .field("name", &self.name)
            .field("group", &self.group)
            .finish()
    }
}

/// Deserialize typed rule options from a config map
///
/// An empty map yields the options' defaults. Unknown keys are rejected by
/// options types that deny them.
pub fn options<T: DeserializeOwned + Default>(options: &Mapping) -> Result<T, serde_yaml::Error> {
    if options.is_empty() {
        return Ok(T::default());
    }
    serde_yaml::from_value(serde_yaml::Value::Mapping(options.clone()))
}

/// Ordered list of known rules
#[derive(Debug, Default, Clone)]
pub struct Registry {
    entries: Vec<RuleEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in rule
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for entry in crate::plugins::ruby::rules::builtin_rules() {
            registry.register(entry);
        }
        registry
    }

    /// Add a rule. A rule with the same qualified name is replaced in place.
    pub fn register(&mut self, entry: RuleEntry) {
        let id = entry.id();
        if let Some(existing) = self.entries.iter_mut().find(|e| e.id() == id) {
            log::warn!("rule {} registered twice, replacing the earlier registration", id);
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
    }

    pub fn entries(&self) -> &[RuleEntry] {
        &self.entries
    }

    /// Look up a rule by qualified or bare name
    pub fn find(&self, key: &str) -> Option<&RuleEntry> {
        self.entries.iter().find(|e| e.is_named(key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A rule instance with its resolved settings
#[derive(Clone)]
pub struct ConfiguredRule {
    pub rule: Arc<dyn Rule>,
    pub enabled: bool,
    pub severity: Severity,
    patterns: Vec<String>,
    exclude: GlobSet,
}

impl ConfiguredRule {
    /// Enabled, with the group's default severity and no exclusions
    pub fn new(rule: Arc<dyn Rule>) -> Self {
        let severity = rule.group().default_severity();
        Self {
            rule,
            enabled: true,
            severity,
            patterns: Vec::new(),
            exclude: GlobSet::empty(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Exclude paths matching any of the glob patterns
    pub fn with_exclude(mut self, patterns: &[String]) -> Result<Self, globset::Error> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(Glob::new(pattern)?);
        }
        self.exclude = builder.build()?;
        self.patterns = patterns.to_vec();
        Ok(self)
    }

    pub fn id(&self) -> String {
        self.rule.id()
    }

    /// Whether the rule is skipped for `path`. In-memory sources are never excluded.
    pub fn is_excluded(&self, path: Option<&Path>) -> bool {
        let Some(path) = path else {
            return false;
        };
        let path = path.strip_prefix("./").unwrap_or(path);
        self.exclude.is_match(path)
    }

    fn matches(&self, selector: &str) -> bool {
        selector == self.rule.name()
            || selector == self.rule.id()
            || selector.parse::<RuleGroup>().ok() == Some(self.rule.group())
    }
}

impl std::fmt::Debug for ConfiguredRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfiguredRule")
            .field("rule", &self.rule.id())
            .field("enabled", &self.enabled)
            .field("severity", &self.severity)
            .field("exclude", &self.patterns)
            .finish()
    }
}

/// Rules for a run, in invocation order
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<ConfiguredRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enabled rules with default settings
    pub fn from_rules(rules: Vec<Arc<dyn Rule>>) -> Self {
        Self {
            rules: rules.into_iter().map(ConfiguredRule::new).collect(),
        }
    }

    pub fn push(&mut self, rule: ConfiguredRule) {
        self.rules.push(rule);
    }

    /// Instantiate every registered rule and apply the configuration
    pub fn resolve(registry: &Registry, config: &Config) -> Result<Self, ConfigError> {
        for key in config.groups.keys() {
            key.parse::<RuleGroup>()
                .map_err(|_| ConfigError::UnknownGroup(key.clone()))?;
        }
        for key in config.rules.keys() {
            if registry.find(key).is_none() {
                return Err(ConfigError::UnknownRule(key.clone()));
            }
        }

        let empty = Mapping::new();
        let mut set = Self::new();
        for entry in registry.entries() {
            let id = entry.id();
            let rule_config = config
                .rules
                .iter()
                .find(|(key, _)| entry.is_named(key))
                .map(|(_, value)| value);
            let group_config = config
                .groups
                .iter()
                .find(|(key, _)| key.parse::<RuleGroup>().ok() == Some(entry.group))
                .map(|(_, value)| value);

            let opts = rule_config.map_or(&empty, |c| &c.options);
            let rule = (entry.build)(opts).map_err(|source| ConfigError::RuleOptions {
                rule: id.clone(),
                source,
            })?;

            let enabled = rule_config
                .and_then(|c| c.enabled)
                .or(group_config.and_then(|g| g.enabled))
                .unwrap_or(true);
            let severity = rule_config
                .and_then(|c| c.severity)
                .or(group_config.and_then(|g| g.severity))
                .unwrap_or(entry.group.default_severity());
            let exclude = rule_config.map(|c| c.exclude.as_slice()).unwrap_or(&[]);

            let configured = ConfiguredRule::new(rule)
                .with_enabled(enabled)
                .with_severity(severity)
                .with_exclude(exclude)
                .map_err(|source| ConfigError::InvalidPattern {
                    rule: id.clone(),
                    source,
                })?;
            set.push(configured);
        }

        if !config.only.is_empty() {
            set.set_enabled("all", false);
            for selector in &config.only {
                if set.set_enabled(selector, true) == 0 {
                    return Err(ConfigError::UnknownRule(selector.clone()));
                }
            }
        }
        for selector in &config.except {
            if set.set_enabled(selector, false) == 0 {
                return Err(ConfigError::UnknownRule(selector.clone()));
            }
        }

        log::debug!(
            "resolved {} rules ({} enabled)",
            set.len(),
            set.enabled().count()
        );
        Ok(set)
    }

    /// Enable or disable rules by name, qualified name, group, or `all`.
    /// Returns how many rules matched.
    pub fn set_enabled(&mut self, selector: &str, enabled: bool) -> usize {
        let mut count = 0;
        for rule in self.select(selector) {
            rule.enabled = enabled;
            count += 1;
        }
        count
    }

    /// Override the severity of rules by name, qualified name, group, or `all`
    pub fn set_severity(&mut self, selector: &str, severity: Severity) -> usize {
        let mut count = 0;
        for rule in self.select(selector) {
            rule.severity = severity;
            count += 1;
        }
        count
    }

    fn select<'a>(&'a mut self, selector: &'a str) -> impl Iterator<Item = &'a mut ConfiguredRule> {
        self.rules
            .iter_mut()
            .filter(move |r| selector == "all" || r.matches(selector))
    }

    pub fn get(&self, id: &str) -> Option<&ConfiguredRule> {
        self.rules
            .iter()
            .find(|r| r.rule.id() == id || r.rule.name() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfiguredRule> {
        self.rules.iter()
    }

    pub fn enabled(&self) -> impl Iterator<Item = &ConfiguredRule> {
        self.rules.iter().filter(|r| r.enabled)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
