use std::collections::HashSet;

use crate::error::ConfigError;
use crate::grammar::Grammar;
use crate::parser::is_identifier;

/// Prefix given to generated symbols when none is set.
pub const DEFAULT_PREFIX: &str = "rule";

/// What a code generator needs to turn a grammar into a parser: the grammar,
/// the rule to start from and the prefix for every generated symbol.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    grammar: Grammar,
    start: Option<String>,
    prefix: String,
}

impl GeneratorConfig {
    pub fn new(grammar: Grammar) -> GeneratorConfig {
        GeneratorConfig {
            grammar,
            start: None,
            prefix: DEFAULT_PREFIX.to_owned(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Start from `name` instead of the grammar's first rule.
    pub fn with_start(mut self, name: impl Into<String>) -> Self {
        self.start = Some(name.into());
        self
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The start rule name, defaulting to the first rule in the grammar.
    pub fn start(&self) -> Option<&str> {
        self.start
            .as_deref()
            .or_else(|| self.grammar.rules.first().map(|pair| pair.name.as_str()))
    }

    /// The generated symbol name for rule `name`.
    pub fn symbol(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name)
    }

    /// Check the configuration is something a generator can work with: the
    /// prefix is an identifier, rule names are unique, the start rule exists
    /// and every reference resolves.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_identifier(&self.prefix) {
            return Err(ConfigError::InvalidPrefix(self.prefix.clone()));
        }
        if self.grammar.is_empty() {
            return Err(ConfigError::EmptyGrammar);
        }

        let mut seen = HashSet::new();
        for pair in &self.grammar {
            if !seen.insert(pair.name.as_str()) {
                return Err(ConfigError::DuplicateRule(pair.name.clone()));
            }
        }

        if let Some(start) = self.start() {
            if !self.grammar.contains(start) {
                return Err(ConfigError::MissingStartRule(start.to_owned()));
            }
        }

        if let Some(name) = self.grammar.undefined_references().first() {
            return Err(ConfigError::UndefinedReference((*name).to_owned()));
        }

        log::debug!(
            "generator config valid: {} rules, start {:?}, prefix {:?}",
            self.grammar.len(),
            self.start(),
            self.prefix
        );
        Ok(())
    }
}
