use std::fmt::{self, Display};

use crate::print::write_rule;
use crate::rule::{Rule, RuleKind};

/// A named rule.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct GrammarPair {
    pub name: String,
    pub rule: Rule,
}

impl GrammarPair {
    pub fn new(name: impl Into<String>, rule: Rule) -> GrammarPair {
        GrammarPair {
            name: name.into(),
            rule,
        }
    }
}

impl Display for GrammarPair {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ::= ", self.name)?;
        write_rule(f, &self.rule)
    }
}

/// An ordered set of named rules.
///
/// Names are not required to be unique here; the first pair with a name is
/// the one [`Grammar::get`] finds.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct Grammar {
    pub rules: Vec<GrammarPair>,
}

impl Grammar {
    pub fn new() -> Grammar {
        Grammar { rules: Vec::new() }
    }

    pub fn push(&mut self, name: impl Into<String>, rule: Rule) {
        self.rules.push(GrammarPair::new(name, rule));
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules
            .iter()
            .find(|pair| pair.name == name)
            .map(|pair| &pair.rule)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GrammarPair> {
        self.rules.iter()
    }

    /// Every name referenced by any rule, once, in order of first
    /// appearance. References are not resolved.
    pub fn references(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for pair in &self.rules {
            let mut stack = vec![&pair.rule];
            while let Some(rule) = stack.pop() {
                if let RuleKind::Reference(name) = rule.kind() {
                    if !names.contains(&name.as_str()) {
                        names.push(name);
                    }
                }
                stack.extend(rule.children().iter().rev());
            }
        }
        names
    }

    /// Referenced names that no pair in the grammar defines.
    pub fn undefined_references(&self) -> Vec<&str> {
        self.references()
            .into_iter()
            .filter(|name| !self.contains(name))
            .collect()
    }
}

impl Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for pair in &self.rules {
            writeln!(f, "{}", pair)?;
        }
        Ok(())
    }
}

impl FromIterator<GrammarPair> for Grammar {
    fn from_iter<I: IntoIterator<Item = GrammarPair>>(iter: I) -> Self {
        Grammar {
            rules: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Grammar {
    type Item = &'a GrammarPair;
    type IntoIter = std::slice::Iter<'a, GrammarPair>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Rule {
        s.parse().unwrap()
    }

    fn sample() -> Grammar {
        let mut g = Grammar::new();
        g.push("number", parse("digit+ {\".\" digit+}?"));
        g.push("digit", parse("[0-9]"));
        g.push("list", parse("\"[\" {number {\",\" number}*}? \"]\" rest"));
        g
    }

    #[test]
    fn lookup() {
        let mut g = sample();
        assert_eq!(g.len(), 3);
        assert_eq!(g.get("digit"), Some(&parse("[0-9]")));
        assert_eq!(g.get("missing"), None);

        // First definition wins.
        g.push("digit", parse("\"0\""));
        assert_eq!(g.get("digit"), Some(&parse("[0-9]")));
    }

    #[test]
    fn references_in_order() {
        let g = sample();
        assert_eq!(g.references(), vec!["digit", "number", "rest"]);
        assert_eq!(g.undefined_references(), vec!["rest"]);
    }

    #[test]
    fn display() {
        let g: Grammar = vec![
            GrammarPair::new("seq", parse("\"amogus\" \"sus\" $")),
            GrammarPair::new("opt", parse("x?")),
        ]
        .into_iter()
        .collect();

        assert_eq!(g.to_string(), "seq ::= {\"amogus\" \"sus\" $}\nopt ::= x?\n");
    }
}
