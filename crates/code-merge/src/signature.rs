//! C# token scanner and normalized statement signatures.
//!
//! A signature is the sequence of significant tokens of a piece of source:
//! whitespace, newlines and comments are trivia and never take part in a
//! comparison. Anchors, duplicate detection and host-variable discovery all
//! compare signatures rather than raw text, so formatting differences in the
//! target file do not defeat them.

use std::fmt;
use std::ops::Range;

/// Token classes produced by [`tokenize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Literal,
    Punct,
}

/// A significant token with its byte span in the scanned text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub span: Range<usize>,
}

/// Scan C# source into significant tokens
///
/// Punctuation is emitted one character at a time; both sides of every
/// comparison are scanned the same way, so `=>` and `= >` are equivalent.
#[must_use]
pub fn tokenize(source: &str) -> Vec<Token<'_>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if b == b'/' && bytes.get(i + 1) == Some(&b'/') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }

        if b == b'/' && bytes.get(i + 1) == Some(&b'*') {
            i = source[i + 2..]
                .find("*/")
                .map_or(bytes.len(), |end| i + 2 + end + 2);
            continue;
        }

        let start = i;
        let kind = if let Some(quote) = string_start(bytes, i) {
            i = scan_string(bytes, quote);
            TokenKind::Literal
        } else if b == b'\'' {
            i = scan_char(bytes, i);
            TokenKind::Literal
        } else if is_ident_start(b) || (b == b'@' && bytes.get(i + 1).is_some_and(|n| is_ident_start(*n))) {
            i += 1;
            while i < bytes.len() && is_ident_continue(bytes[i]) {
                i += 1;
            }
            TokenKind::Identifier
        } else if b.is_ascii_digit() {
            i += 1;
            while i < bytes.len() {
                let c = bytes[i];
                let fraction = c == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit);
                if c.is_ascii_alphanumeric() || c == b'_' || fraction {
                    i += 1;
                } else {
                    break;
                }
            }
            TokenKind::Literal
        } else {
            i += 1;
            TokenKind::Punct
        };

        tokens.push(Token {
            kind,
            text: &source[start..i],
            span: start..i,
        });
    }

    tokens
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

/// Opening quote position and verbatim-ness for string literal prefixes
/// (`"`, `@"`, `$"`, `$@"`, `@$"`, raw `"""`).
#[derive(Debug, Clone, Copy)]
struct Quote {
    at: usize,
    verbatim: bool,
}

fn string_start(bytes: &[u8], i: usize) -> Option<Quote> {
    let mut j = i;
    let mut verbatim = false;
    while j < bytes.len() && j - i < 3 {
        match bytes[j] {
            b'"' => return Some(Quote { at: j, verbatim }),
            b'@' => verbatim = true,
            b'$' => {}
            _ => return None,
        }
        j += 1;
    }
    None
}

fn scan_string(bytes: &[u8], quote: Quote) -> usize {
    let run = bytes[quote.at..].iter().take_while(|&&b| b == b'"').count();
    if run >= 3 {
        // raw string literal: closes on the same number of quotes
        let mut i = quote.at + run;
        while i < bytes.len() {
            if bytes[i] == b'"' {
                let close = bytes[i..].iter().take_while(|&&b| b == b'"').count();
                if close >= run {
                    return i + close;
                }
                i += close;
            } else {
                i += 1;
            }
        }
        return bytes.len();
    }

    let mut i = quote.at + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'"' if quote.verbatim && bytes.get(i + 1) == Some(&b'"') => i += 2,
            b'"' => return i + 1,
            b'\\' if !quote.verbatim => i += 2,
            b'\n' if !quote.verbatim => return i,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn scan_char(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\'' => return i + 1,
            b'\n' => return i,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Normalized token sequence of a statement or snippet
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Signature(Vec<String>);

impl Signature {
    /// Compute the signature of source text
    #[must_use]
    pub fn of(text: &str) -> Self {
        Self(tokenize(text).into_iter().map(|t| t.text.to_string()).collect())
    }

    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Tokens without trailing statement terminators
    #[must_use]
    pub fn shape(&self) -> &[String] {
        let mut end = self.0.len();
        while end > 0 && self.0[end - 1] == ";" {
            end -= 1;
        }
        &self.0[..end]
    }

    /// True when `needle` occurs as a contiguous run of tokens
    ///
    /// Trailing terminators of the needle are ignored; an empty needle
    /// never matches.
    #[must_use]
    pub fn contains(&self, needle: &Signature) -> bool {
        let needle = needle.shape();
        if needle.is_empty() || needle.len() > self.0.len() {
            return false;
        }
        self.0.windows(needle.len()).any(|window| window == needle)
    }

    /// Statement-shape equality: same tokens, terminators aside
    #[must_use]
    pub fn same_shape(&self, other: &Signature) -> bool {
        !self.shape().is_empty() && self.shape() == other.shape()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" "))
    }
}
