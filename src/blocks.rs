//! Marker-delimited block parser.
//!
//! A file is split into blocks at every line that contains the sentinel
//! (the "header" lines). Each block carries the arguments written after the
//! sentinel on its header and the text up to the next header:
//!
//! ```text
//! -- FCE-EDITOR doctype=Note docname=test docfield=content
//! print("hi")
//! -- FCE-EDITOR console type=Python commit
//! 1 + 1
//! ```
//!
//! Lines before the first header belong to no block. Block text is trimmed.

use crate::args::{tokenize, Arguments};
use crate::error::ParseError;

/// One header and the text that follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub arguments: Arguments,
    pub text: String,
    /// The trimmed header line; `None` for the whole-file fallback block.
    pub header: Option<String>,
}

/// What [`parse_blocks`] returns when the input has no header line at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoHeaderPolicy {
    /// No blocks.
    #[default]
    Empty,
    /// One block with empty arguments whose text is the whole input.
    WholeFile,
}

/// Split `content` into blocks at lines containing `sentinel`.
///
/// Lines are split on `\n` only; a `\r` stays part of its line.
/// A header whose arguments fail to tokenize fails the whole parse.
pub fn parse_blocks(
    content: &str,
    sentinel: &str,
    policy: NoHeaderPolicy,
) -> Result<Vec<Block>, ParseError> {
    let mut blocks = Vec::new();
    let mut header: Option<(usize, &str)> = None;
    let mut text_lines: Vec<&str> = Vec::new();

    for (index, line) in content.split('\n').enumerate() {
        if line.contains(sentinel) {
            if let Some(open) = header.take() {
                blocks.push(finalize(open, &text_lines, sentinel)?);
            }
            header = Some((index + 1, line.trim()));
            text_lines.clear();
        } else if header.is_some() {
            text_lines.push(line);
        }
    }

    if let Some(open) = header {
        blocks.push(finalize(open, &text_lines, sentinel)?);
    }

    if blocks.is_empty() && policy == NoHeaderPolicy::WholeFile {
        blocks.push(Block {
            arguments: Arguments::default(),
            text: content.trim().to_string(),
            header: None,
        });
    }

    Ok(blocks)
}

fn finalize(
    (line_no, header): (usize, &str),
    text_lines: &[&str],
    sentinel: &str,
) -> Result<Block, ParseError> {
    let arg_text = header
        .split_once(sentinel)
        .map(|(_, rest)| rest.trim())
        .unwrap_or_default();
    let arguments = tokenize(arg_text).map_err(|e| ParseError::Header {
        line: line_no,
        source: Box::new(e),
    })?;

    Ok(Block {
        arguments,
        text: text_lines.join("\n").trim().to_string(),
        header: Some(header.to_string()),
    })
}

/// Write blocks back out as text: each header followed by its text.
///
/// The fallback block (no header) contributes its text alone.
pub fn render_blocks(blocks: &[Block]) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(blocks.len() * 2);
    for block in blocks {
        if let Some(header) = &block.header {
            parts.push(header);
        }
        if !block.text.is_empty() {
            parts.push(&block.text);
        }
    }
    let mut out = parts.join("\n");
    out.push('\n');
    out
}
