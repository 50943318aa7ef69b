use std::alloc::Layout;
use std::error;
use std::fmt::{self, Display};

use crate::rule::CharRange;

/// The global allocator refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocError {
    layout: Layout,
}

impl AllocError {
    pub(crate) fn new(layout: Layout) -> AllocError {
        AllocError { layout }
    }

    /// The layout of the allocation that failed.
    pub fn layout(&self) -> Layout {
        self.layout
    }
}

impl Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "memory allocation of {} bytes failed", self.layout.size())
    }
}

impl error::Error for AllocError {}

/// A value that could not be appended to a [`Buffer`](crate::Buffer).
///
/// The buffer is left exactly as it was before the push; the value is handed
/// back to the caller.
#[derive(Debug)]
pub struct PushError<T> {
    pub(crate) value: T,
    pub(crate) error: AllocError,
}

impl<T> PushError<T> {
    pub fn into_value(self) -> T {
        self.value
    }

    pub fn error(&self) -> AllocError {
        self.error
    }
}

impl<T> Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "failed to grow buffer: {}", self.error)
    }
}

impl<T: fmt::Debug> error::Error for PushError<T> {}

impl<T> From<PushError<T>> for AllocError {
    fn from(err: PushError<T>) -> AllocError {
        err.error
    }
}

/// Failure to construct a rule node.
///
/// Any child rules handed to the failing constructor have already been
/// dropped when this is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    Alloc(AllocError),
    /// A sequence or variant was given no children.
    NoChildren,
    /// A character terminal was given no ranges.
    NoRanges,
    /// A character range whose low byte is above its high byte.
    InvertedRange(CharRange),
    /// A reference name that would not read back as a reference.
    InvalidName(String),
}

impl Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            RuleError::Alloc(ref err) => write!(f, "rule allocation failed: {}", err),
            RuleError::NoChildren => write!(f, "sequence and variant rules need at least one child"),
            RuleError::NoRanges => write!(f, "character terminals need at least one range"),
            RuleError::InvertedRange(range) => write!(
                f,
                "inverted character range: {:#04x} > {:#04x}",
                range.low, range.high
            ),
            RuleError::InvalidName(ref name) => write!(f, "invalid rule name: {:?}", name),
        }
    }
}

impl error::Error for RuleError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            RuleError::Alloc(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AllocError> for RuleError {
    fn from(err: AllocError) -> RuleError {
        RuleError::Alloc(err)
    }
}

impl<T> From<PushError<T>> for RuleError {
    fn from(err: PushError<T>) -> RuleError {
        RuleError::Alloc(err.error)
    }
}

/// Why a token could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformed {
    UnterminatedString,
    UnterminatedCharClass,
    EmptyCharClass,
    /// `-` without both endpoints, or a range with low > high.
    InvalidRange,
    /// `\x` not followed by two hex digits.
    InvalidEscape,
    EmptyGroup,
    UnclosedGroup,
    UnexpectedCharacter,
    TrailingInput,
}

impl Display for Malformed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Malformed::UnterminatedString => "unterminated string terminal",
            Malformed::UnterminatedCharClass => "unterminated character class",
            Malformed::EmptyCharClass => "empty character class",
            Malformed::InvalidRange => "invalid character range",
            Malformed::InvalidEscape => "invalid escape sequence",
            Malformed::EmptyGroup => "empty group",
            Malformed::UnclosedGroup => "group is not closed",
            Malformed::UnexpectedCharacter => "unexpected character",
            Malformed::TrailingInput => "unexpected input after rule",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Text ran out while a token was still required.
    UnexpectedEndOfInput,
    MalformedToken(Malformed),
    /// Building the tree failed.
    Internal(RuleError),
}

/// A rule parse failure, located by byte offset into the parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub offset: usize,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, offset: usize) -> ParseError {
        ParseError { kind, offset }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            ParseErrorKind::UnexpectedEndOfInput => {
                write!(f, "unexpected end of input at offset {}", self.offset)
            }
            ParseErrorKind::MalformedToken(reason) => {
                write!(f, "{} at offset {}", reason, self.offset)
            }
            ParseErrorKind::Internal(ref err) => {
                write!(f, "internal error at offset {}: {}", self.offset, err)
            }
        }
    }
}

impl error::Error for ParseError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.kind {
            ParseErrorKind::Internal(err) => Some(err),
            _ => None,
        }
    }
}

/// A generator configuration that cannot be handed to code generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    EmptyGrammar,
    InvalidPrefix(String),
    MissingStartRule(String),
    DuplicateRule(String),
    UndefinedReference(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ConfigError::EmptyGrammar => write!(f, "grammar has no rules"),
            ConfigError::InvalidPrefix(ref s) => {
                write!(f, "symbol prefix is not an identifier: {:?}", s)
            }
            ConfigError::MissingStartRule(ref s) => write!(f, "start rule not defined: {}", s),
            ConfigError::DuplicateRule(ref s) => write!(f, "rule defined more than once: {}", s),
            ConfigError::UndefinedReference(ref s) => {
                write!(f, "reference to undefined rule: {}", s)
            }
        }
    }
}

impl error::Error for ConfigError {}
