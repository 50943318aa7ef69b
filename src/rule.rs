use std::fmt;
use std::mem;
use std::slice;

use crate::alloc;
use crate::error::{AllocError, RuleError};
use crate::parser::{is_identifier, ANY_CHAR_KEYWORD};

/// An inclusive byte range matched by a character terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharRange {
    pub low: u8,
    pub high: u8,
}

impl CharRange {
    pub const ANY: CharRange = CharRange {
        low: 0x00,
        high: 0xff,
    };

    pub const fn new(low: u8, high: u8) -> CharRange {
        CharRange { low, high }
    }

    pub const fn single(byte: u8) -> CharRange {
        CharRange {
            low: byte,
            high: byte,
        }
    }

    pub fn is_single(&self) -> bool {
        self.low == self.high
    }

    pub fn contains(&self, byte: u8) -> bool {
        self.low <= byte && byte <= self.high
    }
}

/// The shape and payload of a [`Rule`].
#[derive(Debug, PartialEq, Eq)]
pub enum RuleKind {
    /// All children match in order.
    Sequence(Vec<Rule>),
    /// Exactly one child matches.
    Variant(Vec<Rule>),
    Optional(Box<Rule>),
    Repeat {
        rule: Box<Rule>,
        at_least_once: bool,
    },
    StringTerminal(String),
    /// Matches one byte that falls in any of the ranges.
    CharTerminal(Vec<CharRange>),
    /// A named rule, resolved against a grammar by whoever consumes the tree.
    Reference(String),
    End,
    Empty,
}

/// A node in a grammar rule tree.
///
/// Rules are only built through the constructors below, which uphold the
/// tree invariants: sequences and variants have at least one child, character
/// terminals have at least one range and every range has `low <= high`.
/// Every node exclusively owns its children.
///
/// Constructors taking children consume them even when they fail, so no
/// cleanup is ever needed on the caller's side.
#[derive(PartialEq, Eq)]
pub struct Rule {
    kind: RuleKind,
}

impl Rule {
    fn from_kind(kind: RuleKind) -> Rule {
        #[cfg(test)]
        live::inc();
        Rule { kind }
    }

    /// Concatenation of `rules`.
    ///
    /// Takes ownership of each rule the iterator yields, but not of the
    /// collection behind it: `Rule::sequence(buf.drain())` leaves `buf` with
    /// the caller.
    pub fn sequence<I>(rules: I) -> Result<Rule, RuleError>
    where
        I: IntoIterator<Item = Rule>,
    {
        Ok(Rule::from_kind(RuleKind::Sequence(collect_children(rules)?)))
    }

    /// Alternation between `rules`. Ownership as with [`Rule::sequence`].
    pub fn variant<I>(rules: I) -> Result<Rule, RuleError>
    where
        I: IntoIterator<Item = Rule>,
    {
        Ok(Rule::from_kind(RuleKind::Variant(collect_children(rules)?)))
    }

    pub fn optional(rule: Rule) -> Result<Rule, RuleError> {
        let rule = alloc::try_box(rule)?;
        Ok(Rule::from_kind(RuleKind::Optional(rule)))
    }

    pub fn repeat(rule: Rule, at_least_once: bool) -> Result<Rule, RuleError> {
        let rule = alloc::try_box(rule)?;
        Ok(Rule::from_kind(RuleKind::Repeat {
            rule,
            at_least_once,
        }))
    }

    pub fn string_terminal(text: &str) -> Result<Rule, RuleError> {
        let text = alloc::try_string(text)?;
        Ok(Rule::from_kind(RuleKind::StringTerminal(text)))
    }

    /// A terminal matching one byte from any of `ranges`.
    ///
    /// Ranges are stored as given; overlapping or unordered ranges are kept.
    pub fn char_terminal(ranges: &[CharRange]) -> Result<Rule, RuleError> {
        if ranges.is_empty() {
            return Err(RuleError::NoRanges);
        }
        if let Some(range) = ranges.iter().find(|r| r.low > r.high) {
            return Err(RuleError::InvertedRange(*range));
        }
        let ranges = alloc::try_copy(ranges)?;
        Ok(Rule::from_kind(RuleKind::CharTerminal(ranges)))
    }

    /// A terminal matching any single byte, written `__char__`.
    pub fn any_char() -> Result<Rule, RuleError> {
        Rule::char_terminal(&[CharRange::ANY])
    }

    /// A reference to the rule called `name`.
    ///
    /// The name must be an identifier other than the `__char__` keyword.
    pub fn reference(name: &str) -> Result<Rule, RuleError> {
        if !is_identifier(name) || name == ANY_CHAR_KEYWORD {
            return Err(RuleError::InvalidName(name.to_owned()));
        }
        let name = alloc::try_string(name)?;
        Ok(Rule::from_kind(RuleKind::Reference(name)))
    }

    pub fn end() -> Rule {
        Rule::from_kind(RuleKind::End)
    }

    pub fn empty() -> Rule {
        Rule::from_kind(RuleKind::Empty)
    }

    pub fn kind(&self) -> &RuleKind {
        &self.kind
    }

    /// Take the node apart. Children stay owned by the returned kind.
    pub fn into_kind(mut self) -> RuleKind {
        mem::replace(&mut self.kind, RuleKind::Empty)
    }

    /// Direct children of this node, in order.
    pub fn children(&self) -> &[Rule] {
        match &self.kind {
            RuleKind::Sequence(rules) | RuleKind::Variant(rules) => rules,
            RuleKind::Optional(rule) | RuleKind::Repeat { rule, .. } => slice::from_ref(&**rule),
            _ => &[],
        }
    }

    /// Deep copy of the tree.
    ///
    /// Walks the tree with an explicit stack, so depth is bounded by memory
    /// rather than by the call stack. If an allocation fails part way, every
    /// subtree cloned so far is dropped before the error is returned.
    pub fn try_clone(&self) -> Result<Rule, AllocError> {
        enum Step<'a> {
            Enter(&'a Rule),
            Sequence(usize),
            Variant(usize),
            Optional,
            Repeat(bool),
        }

        let mut steps = alloc::try_vec(1)?;
        steps.push(Step::Enter(self));
        let mut done: Vec<Rule> = Vec::new();

        while let Some(step) = steps.pop() {
            let cloned = match step {
                Step::Enter(rule) => {
                    let assemble = match &rule.kind {
                        RuleKind::Sequence(rules) => Step::Sequence(rules.len()),
                        RuleKind::Variant(rules) => Step::Variant(rules.len()),
                        RuleKind::Optional(_) => Step::Optional,
                        RuleKind::Repeat { at_least_once, .. } => Step::Repeat(*at_least_once),
                        _ => {
                            alloc::try_push(&mut done, rule.clone_leaf()?)?;
                            continue;
                        }
                    };
                    let children = rule.children();
                    alloc::try_reserve(&mut steps, children.len() + 1)?;
                    steps.push(assemble);
                    steps.extend(children.iter().rev().map(Step::Enter));
                    continue;
                }
                Step::Sequence(n) => RuleKind::Sequence(take_tail(&mut done, n)?),
                Step::Variant(n) => RuleKind::Variant(take_tail(&mut done, n)?),
                Step::Optional => RuleKind::Optional(alloc::try_box(pop_done(&mut done))?),
                Step::Repeat(at_least_once) => RuleKind::Repeat {
                    rule: alloc::try_box(pop_done(&mut done))?,
                    at_least_once,
                },
            };
            alloc::try_push(&mut done, Rule::from_kind(cloned))?;
        }

        log::trace!("cloned rule tree");
        Ok(pop_done(&mut done))
    }

    fn clone_leaf(&self) -> Result<Rule, AllocError> {
        let kind = match &self.kind {
            RuleKind::StringTerminal(text) => RuleKind::StringTerminal(alloc::try_string(text)?),
            RuleKind::CharTerminal(ranges) => RuleKind::CharTerminal(alloc::try_copy(ranges)?),
            RuleKind::Reference(name) => RuleKind::Reference(alloc::try_string(name)?),
            RuleKind::End => RuleKind::End,
            _ => RuleKind::Empty,
        };
        Ok(Rule::from_kind(kind))
    }
}

fn collect_children<I>(rules: I) -> Result<Vec<Rule>, RuleError>
where
    I: IntoIterator<Item = Rule>,
{
    let rules = rules.into_iter();
    let mut children = alloc::try_vec(rules.size_hint().0)?;
    for rule in rules {
        alloc::try_push(&mut children, rule)?;
    }
    if children.is_empty() {
        return Err(RuleError::NoChildren);
    }
    Ok(children)
}

/// Moves the last `n` finished clones into a new child list.
fn take_tail(done: &mut Vec<Rule>, n: usize) -> Result<Vec<Rule>, AllocError> {
    let mut children = alloc::try_vec(n)?;
    children.extend(done.drain(done.len() - n..));
    Ok(children)
}

/// Every step that consumes a finished clone runs after the step that
/// produced it.
fn pop_done(done: &mut Vec<Rule>) -> Rule {
    done.pop().unwrap_or_else(Rule::empty)
}

impl Clone for Rule {
    /// Like the standard collections, aborts through
    /// [`handle_alloc_error`](std::alloc::handle_alloc_error) if memory runs
    /// out. Use [`Rule::try_clone`] to handle that case.
    fn clone(&self) -> Rule {
        match self.try_clone() {
            Ok(rule) => rule,
            Err(err) => std::alloc::handle_alloc_error(err.layout()),
        }
    }
}

impl Drop for Rule {
    fn drop(&mut self) {
        #[cfg(test)]
        live::dec();

        // Detach children onto a heap stack instead of letting the compiler
        // recurse through them, so arbitrarily deep trees can be dropped.
        let mut pending = Vec::new();
        detach_children(&mut self.kind, &mut pending);
        while let Some(mut rule) = pending.pop() {
            detach_children(&mut rule.kind, &mut pending);
        }
    }
}

fn detach_children(kind: &mut RuleKind, out: &mut Vec<Rule>) {
    if let RuleKind::Sequence(rules) | RuleKind::Variant(rules) = kind {
        out.append(rules);
        return;
    }
    if matches!(kind, RuleKind::Optional(_) | RuleKind::Repeat { .. }) {
        if let RuleKind::Optional(rule) | RuleKind::Repeat { rule, .. } =
            mem::replace(kind, RuleKind::Empty)
        {
            out.push(*rule);
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.kind.fmt(f)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::fail_after;

    fn r(name: &str) -> Rule {
        Rule::reference(name).unwrap()
    }

    fn s(text: &str) -> Rule {
        Rule::string_terminal(text).unwrap()
    }

    /// A tree touching every variant.
    fn sample() -> Rule {
        Rule::variant(vec![
            Rule::sequence(vec![
                s("amogus"),
                Rule::optional(Rule::repeat(r("sus"), true).unwrap()).unwrap(),
                Rule::end(),
            ])
            .unwrap(),
            Rule::char_terminal(&[CharRange::new(b'a', b'z'), CharRange::single(b'_')]).unwrap(),
            Rule::empty(),
        ])
        .unwrap()
    }

    #[test]
    fn constructors_build_expected_kinds() {
        let seq = Rule::sequence(vec![s("a"), Rule::end()]).unwrap();
        assert_eq!(
            seq.kind(),
            &RuleKind::Sequence(vec![s("a"), Rule::end()])
        );

        let rep = Rule::repeat(r("x"), false).unwrap();
        match rep.kind() {
            RuleKind::Repeat {
                rule,
                at_least_once,
            } => {
                assert_eq!(**rule, r("x"));
                assert!(!at_least_once);
            }
            other => panic!("unexpected kind: {:?}", other),
        }

        assert_eq!(
            Rule::any_char().unwrap().kind(),
            &RuleKind::CharTerminal(vec![CharRange::new(0, 255)])
        );
        assert_eq!(s("").kind(), &RuleKind::StringTerminal(String::new()));
    }

    #[test]
    fn contract_violations() {
        assert_eq!(Rule::sequence(vec![]), Err(RuleError::NoChildren));
        assert_eq!(Rule::variant(Vec::new()), Err(RuleError::NoChildren));
        assert_eq!(Rule::char_terminal(&[]), Err(RuleError::NoRanges));
        assert_eq!(
            Rule::char_terminal(&[CharRange::new(b'a', b'z'), CharRange::new(b'z', b'a')]),
            Err(RuleError::InvertedRange(CharRange::new(b'z', b'a')))
        );
    }

    #[test]
    fn reference_names_must_be_identifiers() {
        for name in ["", "a b", "1x", "x-y", "__char__", "{a}"] {
            assert_eq!(
                Rule::reference(name),
                Err(RuleError::InvalidName(name.to_owned())),
                "name: {:?}",
                name
            );
        }
        for name in ["a", "_", "__char", "__char__x", "Digit_2"] {
            assert_eq!(
                Rule::reference(name).unwrap().kind(),
                &RuleKind::Reference(name.to_owned())
            );
        }
    }

    #[test]
    fn char_range_contains() {
        let range = CharRange::new(b'b', b'd');
        assert!(!range.contains(b'a'));
        assert!(range.contains(b'b'));
        assert!(range.contains(b'd'));
        assert!(!range.contains(b'e'));
        assert!(CharRange::ANY.contains(0x00));
        assert!(CharRange::ANY.contains(0xff));
        assert!(CharRange::single(b'x').contains(b'x'));
    }

    #[test]
    fn ranges_are_stored_as_given() {
        let ranges = [
            CharRange::new(b'm', b'z'),
            CharRange::new(b'a', b'p'),
            CharRange::single(b'c'),
        ];
        let rule = Rule::char_terminal(&ranges).unwrap();
        assert_eq!(rule.kind(), &RuleKind::CharTerminal(ranges.to_vec()));
    }

    #[test]
    fn sequence_leaves_container_with_caller() {
        let mut rules = vec![r("a"), r("b")];
        let seq = Rule::sequence(rules.drain(..)).unwrap();
        assert!(rules.is_empty());
        assert_eq!(seq.children(), &[r("a"), r("b")]);
    }

    #[test]
    fn children_of_every_kind() {
        let opt = Rule::optional(r("a")).unwrap();
        assert_eq!(opt.children(), &[r("a")]);
        assert!(Rule::end().children().is_empty());
        assert!(s("x").children().is_empty());
        assert_eq!(sample().children().len(), 3);
    }

    #[test]
    fn into_kind_keeps_children() {
        let kind = Rule::optional(r("a")).unwrap().into_kind();
        assert_eq!(kind, RuleKind::Optional(Box::new(r("a"))));
    }

    #[test]
    fn clone_is_deep_and_independent() {
        let original = sample();
        let copy = original.clone();
        assert_eq!(copy, original);

        drop(original);
        assert_eq!(copy, sample());

        let mut kind = copy.into_kind();
        if let RuleKind::Variant(alternatives) = &mut kind {
            alternatives.pop();
        }
        assert_ne!(kind, sample().into_kind());
    }

    #[test]
    fn clone_of_leaves() {
        for rule in vec![s("lit"), r("name"), Rule::end(), Rule::empty(), Rule::any_char().unwrap()] {
            assert_eq!(rule.try_clone().unwrap(), rule);
        }
    }

    #[test]
    fn destroy_counts() {
        let before = live::count();
        let rule = sample();
        // variant, sequence, "amogus", optional, repeat, sus, end, chars, empty
        assert_eq!(live::count() - before, 9);
        drop(rule);
        assert_eq!(live::count(), before);
    }

    #[test]
    fn deep_trees_drop_and_clone_without_recursion() {
        let mut rule = r("x");
        for i in 0..200_000 {
            rule = if i % 2 == 0 {
                Rule::optional(rule).unwrap()
            } else {
                Rule::sequence(vec![rule, Rule::end()]).unwrap()
            };
        }
        let copy = rule.try_clone().unwrap();
        drop(rule);
        drop(copy);
    }

    #[test]
    fn deep_trees_print_and_parse_without_recursion() {
        let depth = 200_000;
        let mut rule = r("x");
        for i in 0..depth {
            rule = if i % 2 == 0 {
                Rule::optional(rule).unwrap()
            } else {
                Rule::sequence(vec![rule, Rule::end()]).unwrap()
            };
        }

        let printed = rule.to_string();
        assert!(printed.starts_with("{{{"));
        assert!(printed.ends_with("? $}"));

        let parsed = crate::parser::parse_complete(&printed).unwrap();
        assert_eq!(parsed.to_string(), printed);
    }

    #[test]
    fn failing_constructor_destroys_children() {
        let before = live::count();

        let children = vec![r("a"), sample(), Rule::end()];
        fail_after(Some(0));
        let res = Rule::sequence(children);
        fail_after(None);
        assert!(matches!(res, Err(RuleError::Alloc(_))));
        assert_eq!(live::count(), before);

        let child = sample();
        fail_after(Some(0));
        let res = Rule::optional(child);
        fail_after(None);
        assert!(matches!(res, Err(RuleError::Alloc(_))));
        assert_eq!(live::count(), before);

        let child = sample();
        fail_after(Some(0));
        let res = Rule::repeat(child, true);
        fail_after(None);
        assert!(res.is_err());
        assert_eq!(live::count(), before);
    }

    #[test]
    fn failing_constructor_midway_destroys_remaining_children() {
        let before = live::count();
        let mut children = vec![r("a"), r("b"), r("c"), r("d"), r("e"), r("f")];

        // `filter` hides the exact size, so the child list grows while
        // collecting. The first growth succeeds, the next one fails.
        fail_after(Some(1));
        let res = Rule::variant(children.drain(..).filter(|_| true));
        fail_after(None);

        assert!(res.is_err());
        assert!(children.is_empty());
        assert_eq!(live::count(), before);
    }

    #[test]
    fn failing_clone_is_leak_free_at_every_step() {
        let original = sample();
        let before = live::count();

        let mut failures = 0;
        for successes in 0.. {
            fail_after(Some(successes));
            let res = original.try_clone();
            fail_after(None);
            match res {
                Ok(copy) => {
                    assert_eq!(copy, original);
                    break;
                }
                Err(_) => {
                    failures += 1;
                    assert_eq!(live::count(), before, "leak after {} allocations", successes);
                }
            }
        }
        assert!(failures > 0);
        assert_eq!(live::count(), before);
    }
}
