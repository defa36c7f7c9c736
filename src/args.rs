//! Header argument tokenizer.
//!
//! Turns the text that follows the sentinel on a header line into an
//! [`Arguments`] mapping. Tokens are either bare whitespace-delimited words
//! or double-quoted strings in which `""` stands for one literal quote.
//!
//! Tokens are then read with a small flag convention:
//!
//! | Token | Result |
//! |-------|--------|
//! | `--key=value`, `-key=value`, `key=value` | `key` → `"value"` |
//! | `--key value` (value not key-shaped) | `key` → `"value"` |
//! | `--key` followed by a key or nothing | `key` → `true` |
//! | `word` not consumed as a value | positional `word`, and `word` → `true` |
//! | `"quoted"` not consumed as a value | positional only |
//!
//! ```rust
//! use fce_bridge::args::{tokenize, ArgValue};
//!
//! let args = tokenize(r#"console type=Python commit"#).unwrap();
//! assert!(args.flag("console"));
//! assert_eq!(args.get_str("type"), Some("Python"));
//! assert_eq!(args.get("commit"), Some(&ArgValue::Flag));
//! ```

use std::collections::BTreeMap;

use crate::error::ParseError;

/// Value bound to a header argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Text(String),
    /// Present without a value (boolean `true`).
    Flag,
}

impl ArgValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Text(s) => Some(s),
            ArgValue::Flag => None,
        }
    }
}

/// Named arguments read from one header line, plus any positionals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arguments {
    named: BTreeMap<String, ArgValue>,
    positional: Vec<String>,
}

impl Arguments {
    pub fn is_empty(&self) -> bool {
        self.named.is_empty() && self.positional.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ArgValue> {
        self.named.get(key)
    }

    /// String value of `key`; `None` when absent or a bare flag.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.named.get(key).and_then(ArgValue::as_str)
    }

    /// Whether `key` is present at all, with or without a value.
    pub fn flag(&self, key: &str) -> bool {
        self.named.contains_key(key)
    }

    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.named.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn insert(&mut self, key: &str, value: ArgValue) {
        self.named.insert(key.to_string(), value);
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Bare(String),
    Quoted(String),
}

/// Tokenize header argument text into an [`Arguments`] mapping.
///
/// Pure and deterministic. Fails only on an unterminated quoted token.
pub fn tokenize(arg_text: &str) -> Result<Arguments, ParseError> {
    let tokens = split_tokens(arg_text)?;
    Ok(assemble(tokens))
}

fn split_tokens(text: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '"' {
            chars.next();
            let mut value = String::new();
            let mut closed = false;
            while let Some((_, ch)) = chars.next() {
                if ch == '"' {
                    if matches!(chars.peek(), Some(&(_, '"'))) {
                        chars.next();
                        value.push('"');
                        continue;
                    }
                    closed = true;
                    break;
                }
                value.push(ch);
            }
            if !closed {
                return Err(ParseError::UnterminatedQuote { offset: start });
            }
            tokens.push(Token::Quoted(value));
        } else {
            let mut word = String::new();
            while let Some(&(_, ch)) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                word.push(ch);
                chars.next();
            }
            tokens.push(Token::Bare(word));
        }
    }

    Ok(tokens)
}

/// Key name of a `-x` / `--x` token, if it is one.
fn key_name(word: &str) -> Option<&str> {
    let name = word
        .strip_prefix("--")
        .or_else(|| word.strip_prefix('-'))?;
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// `(key, value)` for `--k=v`, `-k=v` or `k=v`.
fn assignment(word: &str) -> Option<(&str, &str)> {
    let (lhs, value) = word.split_once('=')?;
    let key = key_name(lhs).unwrap_or(lhs);
    if key.is_empty() || key.starts_with('-') {
        return None;
    }
    Some((key, value))
}

fn starts_argument(token: &Token) -> bool {
    match token {
        Token::Bare(word) => key_name(word).is_some() || assignment(word).is_some(),
        Token::Quoted(_) => false,
    }
}

fn assemble(tokens: Vec<Token>) -> Arguments {
    let mut args = Arguments::default();
    let mut iter = tokens.into_iter().peekable();

    while let Some(token) = iter.next() {
        let word = match token {
            Token::Quoted(value) => {
                args.positional.push(value);
                continue;
            }
            Token::Bare(word) => word,
        };

        if let Some((key, value)) = assignment(&word) {
            args.insert(key, ArgValue::Text(value.to_string()));
            continue;
        }

        if let Some(key) = key_name(&word) {
            let takes_value = iter.peek().is_some_and(|next| !starts_argument(next));
            let value = match iter.next_if(|_| takes_value) {
                Some(Token::Bare(v)) | Some(Token::Quoted(v)) => ArgValue::Text(v),
                None => ArgValue::Flag,
            };
            args.insert(key, value);
            continue;
        }

        if word != "-" && word != "--" {
            args.insert(&word, ArgValue::Flag);
        }
        args.positional.push(word);
    }

    args
}
