//! Top-down parser for the rule notation.
//!
//! ```text
//! rule     = variant
//! variant  = sequence , { "|" , sequence }
//! sequence = postfix , { postfix }
//! postfix  = atom , { "?" | "*" | "+" }
//! atom     = "{" , rule , "}" | string | chars | "__char__" | identifier | "$"
//! ```
//!
//! Whitespace between tokens is skipped. A variant alternative with no
//! tokens at all is the empty rule. Open groups are tracked on an explicit
//! stack rather than by recursion, so nesting depth is limited by memory.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until},
    character::complete::{alpha1, alphanumeric1, char, multispace0, one_of},
    combinator::{opt, recognize},
    error::{ErrorKind, ParseError as NomParseError},
    multi::many0,
    sequence::{pair, preceded},
    IResult,
};

use std::mem;

use crate::buffer::Buffer;
use crate::error::{Malformed, ParseError, ParseErrorKind, RuleError};
use crate::rule::{CharRange, Rule};

/// Keyword for a character terminal matching any byte.
pub const ANY_CHAR_KEYWORD: &str = "__char__";

/// Error threaded through the combinators. Positions are kept as the length
/// of the input remaining, and turned into offsets once parsing stops.
#[derive(Debug)]
struct RawError {
    remaining: usize,
    kind: ParseErrorKind,
}

impl RawError {
    fn at(input: &str, kind: ParseErrorKind) -> RawError {
        RawError {
            remaining: input.len(),
            kind,
        }
    }

    fn malformed(input: &str, reason: Malformed) -> RawError {
        RawError::at(input, ParseErrorKind::MalformedToken(reason))
    }

    /// Nothing usable at `input`: either it ran out or the next character
    /// cannot start what was expected.
    fn stuck(input: &str) -> RawError {
        if input.is_empty() {
            RawError::at(input, ParseErrorKind::UnexpectedEndOfInput)
        } else {
            RawError::malformed(input, Malformed::UnexpectedCharacter)
        }
    }

    fn locate(self, source: &str) -> ParseError {
        ParseError::new(self.kind, source.len() - self.remaining)
    }
}

impl<'a> NomParseError<&'a str> for RawError {
    fn from_error_kind(input: &'a str, _kind: ErrorKind) -> Self {
        RawError::stuck(input)
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

type PResult<'a, T> = IResult<&'a str, T, RawError>;

fn fail<T>(err: RawError) -> Result<T, nom::Err<RawError>> {
    Err(nom::Err::Failure(err))
}

/// Turns a constructor failure into a hard parse failure at `input`.
fn built(input: &str, res: Result<Rule, RuleError>) -> Result<Rule, nom::Err<RawError>> {
    res.map_err(|err| nom::Err::Failure(RawError::at(input, ParseErrorKind::Internal(err))))
}

fn push<T>(input: &str, buf: &mut Buffer<T>, value: T) -> Result<(), nom::Err<RawError>> {
    buf.push(value).map_err(|err| {
        nom::Err::Failure(RawError::at(
            input,
            ParseErrorKind::Internal(RuleError::from(err)),
        ))
    })
}

/// Parse one rule from the start of `input`.
///
/// Returns the rule and the unparsed rest of the input, which begins where
/// the rule could not be continued (for example at a `;` or `}`).
pub fn parse_rule(input: &str) -> Result<(Rule, &str), ParseError> {
    log::trace!("parsing rule from {} bytes", input.len());
    match variant(input) {
        Ok((rest, rule)) => Ok((rule, rest)),
        Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => {
            let err = err.locate(input);
            log::debug!("rule parse failed: {}", err);
            Err(err)
        }
        Err(nom::Err::Incomplete(_)) => Err(ParseError::new(
            ParseErrorKind::UnexpectedEndOfInput,
            input.len(),
        )),
    }
}

/// Parse `input` as exactly one rule, allowing surrounding whitespace.
pub fn parse_complete(input: &str) -> Result<Rule, ParseError> {
    let (rule, rest) = parse_rule(input)?;
    let rest = rest.trim_start();
    if rest.is_empty() {
        Ok(rule)
    } else {
        let err = ParseError::new(
            ParseErrorKind::MalformedToken(Malformed::TrailingInput),
            input.len() - rest.len(),
        );
        log::debug!("rule parse failed: {}", err);
        Err(err)
    }
}

/// Whether all of `s` is one identifier.
pub(crate) fn is_identifier(s: &str) -> bool {
    matches!(identifier(s), Ok(("", _)))
}

fn identifier(input: &str) -> PResult<&str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)
}

/// A variant being collected: the top level, or the body of a `{` group.
struct Frame<'a> {
    /// Where the frame opened; the `{` for a group.
    open: &'a str,
    body: &'a str,
    /// Where the current alternative started.
    alternative: &'a str,
    alternatives: Buffer<Option<Rule>>,
    elements: Buffer<Rule>,
}

impl<'a> Frame<'a> {
    fn new(open: &'a str, body: &'a str) -> Frame<'a> {
        Frame {
            open,
            body,
            alternative: body,
            alternatives: Buffer::new(),
            elements: Buffer::new(),
        }
    }

    /// Ends the current alternative. An alternative with no elements is
    /// kept as `None`.
    fn close_alternative(&mut self) -> Result<(), nom::Err<RawError>> {
        let rule = match self.elements.len() {
            0 => None,
            1 => self.elements.pop(),
            _ => Some(built(self.alternative, Rule::sequence(self.elements.drain()))?),
        };
        push(self.alternative, &mut self.alternatives, rule)
    }

    /// The collected rule, or `None` if the frame holds a single empty
    /// alternative.
    fn finish(&mut self) -> Result<Option<Rule>, nom::Err<RawError>> {
        self.close_alternative()?;
        if self.alternatives.len() == 1 {
            return Ok(self.alternatives.pop().flatten());
        }
        let rule = Rule::variant(
            self.alternatives
                .drain()
                .map(|choice| choice.unwrap_or_else(Rule::empty)),
        );
        Ok(Some(built(self.body, rule)?))
    }
}

/// Parses `variant` without recursing on nesting: open groups are kept on a
/// stack of frames, so group depth is bounded by memory.
fn variant(input: &str) -> PResult<Rule> {
    let mut outer: Buffer<Frame> = Buffer::new();
    let mut frame = Frame::new(input, input);
    let mut rest = input;

    loop {
        let (at, _) = multispace0(rest)?;

        if let Some(after) = at.strip_prefix('|') {
            frame.close_alternative()?;
            frame.alternative = after;
            rest = after;
            continue;
        }

        if let Some(body) = at.strip_prefix('{') {
            let parent = mem::replace(&mut frame, Frame::new(at, body));
            push(at, &mut outer, parent)?;
            rest = body;
            continue;
        }

        match alt((string_terminal, char_terminal, end, name))(at) {
            Ok((after, rule)) => {
                let (after, rule) = postfix(after, rule)?;
                push(at, &mut frame.elements, rule)?;
                rest = after;
                continue;
            }
            Err(nom::Err::Error(_)) => {}
            Err(e) => return Err(e),
        }

        // Nothing more belongs to the innermost frame.
        let open = frame.open;
        let rule = frame.finish()?;

        let mut parent = match outer.pop() {
            Some(parent) => parent,
            None => {
                return match rule {
                    Some(rule) => Ok((rest, rule)),
                    None => Err(nom::Err::Error(RawError::stuck(at))),
                };
            }
        };

        let rule = match rule {
            Some(rule) => rule,
            None if at.starts_with('}') => {
                return fail(RawError::malformed(open, Malformed::EmptyGroup))
            }
            None => return fail(RawError::stuck(at)),
        };
        let after = match at.strip_prefix('}') {
            Some(after) => after,
            None if at.is_empty() => return fail(RawError::stuck(at)),
            None => return fail(RawError::malformed(at, Malformed::UnclosedGroup)),
        };
        let (after, rule) = postfix(after, rule)?;
        push(open, &mut parent.elements, rule)?;
        frame = parent;
        rest = after;
    }
}

/// Applies any `?`, `*` and `+` following `rule`.
fn postfix(input: &str, rule: Rule) -> PResult<Rule> {
    let (mut rest, mut rule) = (input, rule);
    while let (after, Some(op)) = opt(preceded(multispace0, one_of("?*+")))(rest)? {
        let res = match op {
            '?' => Rule::optional(rule),
            '*' => Rule::repeat(rule, false),
            _ => Rule::repeat(rule, true),
        };
        rule = built(rest, res)?;
        rest = after;
    }
    Ok((rest, rule))
}

/// `"..."`, taken verbatim. There is no escape syntax, so a terminal cannot
/// contain `"`.
fn string_terminal(input: &str) -> PResult<Rule> {
    let (body, _) = char('"')(input)?;
    let (rest, text) = match take_until::<_, _, RawError>("\"")(body) {
        Ok(ok) => ok,
        Err(_) => return fail(RawError::malformed(input, Malformed::UnterminatedString)),
    };
    let (rest, _) = char('"')(rest)?;
    Ok((rest, built(input, Rule::string_terminal(text))?))
}

/// `[...]` holding single bytes and `low-high` ranges. Inside the brackets
/// every byte is literal except `\`, `-` and `]`; `\` escapes the next byte,
/// and `\xHH` writes a byte in hex.
fn char_terminal(input: &str) -> PResult<Rule> {
    let (_, _) = char('[')(input)?;
    let bytes = input.as_bytes();
    // Offsets inside the class can fall inside a multi-byte character, so
    // errors are positioned by remaining length instead of by slicing.
    let err_at = |pos: usize, reason: Malformed| RawError {
        remaining: input.len() - pos,
        kind: ParseErrorKind::MalformedToken(reason),
    };

    let mut ranges = Buffer::new();
    let mut pos = 1;
    loop {
        match bytes.get(pos) {
            None => return fail(err_at(0, Malformed::UnterminatedCharClass)),
            Some(b']') => break,
            Some(_) => {}
        }

        let start = pos;
        let (next, low) = class_byte(bytes, pos).map_err(|(p, r)| nom::Err::Failure(err_at(p, r)))?;
        pos = next;
        let high = if bytes.get(pos) == Some(&b'-') {
            let (next, high) =
                class_byte(bytes, pos + 1).map_err(|(p, r)| nom::Err::Failure(err_at(p, r)))?;
            pos = next;
            high
        } else {
            low
        };
        if low > high {
            return fail(err_at(start, Malformed::InvalidRange));
        }
        ranges.push(CharRange::new(low, high)).map_err(|err| {
            nom::Err::Failure(RawError {
                remaining: input.len() - start,
                kind: ParseErrorKind::Internal(RuleError::from(err)),
            })
        })?;
    }

    if ranges.is_empty() {
        return fail(RawError::malformed(input, Malformed::EmptyCharClass));
    }
    // `pos` is at the closing `]`, which is ASCII, so `pos + 1` is a
    // character boundary.
    let rest = &input[pos + 1..];
    Ok((rest, built(input, Rule::char_terminal(ranges.as_slice()))?))
}

/// Reads one class member at `pos`, returning the position after it.
fn class_byte(bytes: &[u8], pos: usize) -> Result<(usize, u8), (usize, Malformed)> {
    match bytes.get(pos) {
        None => Err((0, Malformed::UnterminatedCharClass)),
        Some(b'-') | Some(b']') => Err((pos, Malformed::InvalidRange)),
        Some(b'\\') => match bytes.get(pos + 1) {
            None => Err((0, Malformed::UnterminatedCharClass)),
            Some(b'x') => {
                let hex = bytes
                    .get(pos + 2..pos + 4)
                    .filter(|h| h.iter().all(u8::is_ascii_hexdigit))
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                match hex {
                    Some(byte) => Ok((pos + 4, byte)),
                    None => Err((pos, Malformed::InvalidEscape)),
                }
            }
            Some(&b) => Ok((pos + 2, b)),
        },
        Some(&b) => Ok((pos + 1, b)),
    }
}

fn end(input: &str) -> PResult<Rule> {
    let (rest, _) = char('$')(input)?;
    Ok((rest, Rule::end()))
}

/// A rule reference, or the any-character keyword.
fn name(input: &str) -> PResult<Rule> {
    let (rest, matched) = identifier(input)?;
    let rule = if matched == ANY_CHAR_KEYWORD {
        Rule::any_char()
    } else {
        Rule::reference(matched)
    };
    Ok((rest, built(input, rule)?))
}
