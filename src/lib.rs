//! Grammar rules: the tree, its parser and its printer.
//!
//! A [`Rule`] is one node of an EBNF-like grammar rule. Rules are written in
//! a small notation:
//!
//! | Rule | Notation |
//! |-|-|
//! | sequence | `a b c`, printed `{a b c}` |
//! | variant | `a \| b \| c`, printed `{a \| b \| c}` |
//! | optional | `x?` |
//! | repeat | `x*` (zero or more), `x+` (one or more) |
//! | string terminal | `"text"` |
//! | character terminal | `[a-z0-9_]`, `\-` for a literal `-`, `\xHH` for any byte |
//! | any byte | `__char__` |
//! | reference | `digit` |
//! | end of input | `$` |
//! | empty | nothing, as a variant alternative: `{a \| }` |
//!
//! `{ }` groups. Postfix operators bind tightest, then juxtaposition, then
//! `|`.
//!
//! Printing a rule and parsing the result gives back the same tree:
//!
//! ```
//! use ebnf_rules::Rule;
//!
//! let rule: Rule = "a | b c".parse().unwrap();
//! assert_eq!(rule.to_string(), "{a | {b c}}");
//! assert_eq!(rule.to_string().parse::<Rule>().unwrap(), rule);
//! ```

use std::str::FromStr;

mod alloc;
mod buffer;
mod config;
mod error;
mod grammar;
mod parser;
mod print;
mod rule;

pub use buffer::Buffer;
pub use config::{GeneratorConfig, DEFAULT_PREFIX};
pub use error::{
    AllocError, ConfigError, Malformed, ParseError, ParseErrorKind, PushError, RuleError,
};
pub use grammar::{Grammar, GrammarPair};
pub use parser::{parse_complete, parse_rule, ANY_CHAR_KEYWORD};
pub use print::write_rule;
pub use rule::{CharRange, Rule, RuleKind};

impl FromStr for Rule {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_complete(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Debug;

    fn assert_lossless_conversion<T, E>(t: T)
    where
        T: ToString + FromStr<Err = E> + Eq + Debug,
        E: std::error::Error,
    {
        let s = t.to_string();
        let t_parse = T::from_str(&s).unwrap();
        assert_eq!(t, t_parse, "To string:\n{}\n", s);
    }

    #[test]
    fn lossless_rule() {
        let tests = vec![
            "\"amogus\" \"sus\" $",
            "[a-zA-Z0-9_]",
            "x?",
            "a | b c",
            "{a | b}* c+ {d e}?",
            "x*?+",
            "{a | {b | c} | }",
            "[\\--\\]\\x00\\xff] __char__",
        ];

        for test in tests {
            assert_lossless_conversion(test.parse::<Rule>().unwrap());
        }
    }

    #[test]
    fn printing_is_idempotent() {
        let tests = vec!["a b", "{a}", "{{a b}}?", "a | b | {c}", "[a-a]"];

        for test in tests {
            let once = test.parse::<Rule>().unwrap().to_string();
            let twice = once.parse::<Rule>().unwrap().to_string();
            assert_eq!(once, twice, "input: {:?}", test);
        }
    }

    #[test]
    fn error_display() {
        let err = "\"unterminated".parse::<Rule>().unwrap_err();
        assert_eq!(err.to_string(), "unterminated string terminal at offset 0");

        let err = "".parse::<Rule>().unwrap_err();
        assert_eq!(err.to_string(), "unexpected end of input at offset 0");
    }
}
