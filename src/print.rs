//! Canonical printing of rules.
//!
//! Sequences and variants always carry their own braces, so they can sit
//! anywhere without extra grouping, and postfix operators stack directly on
//! their operand. Parsing the output gives back the same tree.

use std::fmt::{self, Display, Write};

use crate::parser::ANY_CHAR_KEYWORD;
use crate::rule::{CharRange, Rule, RuleKind};

/// Pending output while walking a tree.
enum Step<'a> {
    Rule(&'a Rule),
    Text(&'static str),
}

/// Write `rule` in rule notation.
///
/// The tree is walked with an explicit stack, so any depth the constructors
/// can build can be printed.
pub fn write_rule<W: Write>(out: &mut W, rule: &Rule) -> fmt::Result {
    let mut stack = vec![Step::Rule(rule)];
    while let Some(step) = stack.pop() {
        let rule = match step {
            Step::Text(text) => {
                out.write_str(text)?;
                continue;
            }
            Step::Rule(rule) => rule,
        };
        match rule.kind() {
            RuleKind::Sequence(rules) => push_list(&mut stack, rules, " "),
            RuleKind::Variant(rules) => push_list(&mut stack, rules, " | "),
            RuleKind::Optional(rule) => {
                stack.push(Step::Text("?"));
                stack.push(Step::Rule(rule));
            }
            RuleKind::Repeat {
                rule,
                at_least_once,
            } => {
                stack.push(Step::Text(if *at_least_once { "+" } else { "*" }));
                stack.push(Step::Rule(rule));
            }
            RuleKind::StringTerminal(text) => write!(out, "\"{}\"", text)?,
            RuleKind::CharTerminal(ranges) => write_ranges(out, ranges)?,
            RuleKind::Reference(name) => out.write_str(name)?,
            RuleKind::End => out.write_char('$')?,
            RuleKind::Empty => {}
        }
    }
    Ok(())
}

/// Queues `{a sep b sep c}` so that it pops in reading order.
fn push_list<'a>(stack: &mut Vec<Step<'a>>, rules: &'a [Rule], sep: &'static str) {
    stack.push(Step::Text("}"));
    for (i, rule) in rules.iter().enumerate().rev() {
        stack.push(Step::Rule(rule));
        if i > 0 {
            stack.push(Step::Text(sep));
        }
    }
    stack.push(Step::Text("{"));
}

fn write_ranges<W: Write>(out: &mut W, ranges: &[CharRange]) -> fmt::Result {
    if ranges == [CharRange::ANY] {
        return out.write_str(ANY_CHAR_KEYWORD);
    }
    out.write_char('[')?;
    for range in ranges {
        write_class_byte(out, range.low)?;
        if !range.is_single() {
            out.write_char('-')?;
            write_class_byte(out, range.high)?;
        }
    }
    out.write_char(']')
}

fn write_class_byte<W: Write>(out: &mut W, byte: u8) -> fmt::Result {
    match byte {
        b'-' | b']' | b'\\' => write!(out, "\\{}", byte as char),
        0x20..=0x7e => out.write_char(byte as char),
        _ => write!(out, "\\x{:02X}", byte),
    }
}

impl Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_rule(f, self)
    }
}
