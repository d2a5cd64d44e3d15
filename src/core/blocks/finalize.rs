use log::{debug, warn};

use crate::escape::encode_all;
use crate::registry::parse_array;
use crate::types::FunctionDefinition;

use super::{BlockFrame, BlockKind, ConditionStyle, DEFAULT_SLOT, ELSE_MARKER};

/// What the scanner does with a closed block.
#[derive(Clone, Debug, PartialEq)]
pub enum Finalized {
    /// Append to the enclosing buffer.
    Append(String),
    /// Insert into the unscanned input at the current position.
    Splice(String),
    /// Register a function; nothing is emitted.
    Define { name: String, definition: FunctionDefinition },
}

/// Produces the result of a block from the text collected inside it.
pub fn finalize(block: BlockFrame, content: String) -> Finalized {
    match block.kind {
        BlockKind::Conditional { truthy, style } => {
            let branch = match (truthy, block.else_at) {
                (true, Some(at)) => &content[..at],
                (true, None) => content.as_str(),
                (false, Some(at)) => &content[at + ELSE_MARKER.len()..],
                (false, None) => "",
            };
            Finalized::Append(match style {
                ConditionStyle::Trim => trim_lines(branch),
                ConditionStyle::Legacy => branch.trim().to_string(),
                ConditionStyle::Keep => branch.to_string(),
            })
        }
        BlockKind::Loop { source, slot } => {
            let items = parse_array(&source).unwrap_or_else(|e| {
                warn!("Loop source {:?} is not a list: {}", source, e);
                Vec::new()
            });
            debug!("Expanding loop over {} items into slot '{}'", items.len(), slot);
            Finalized::Splice(items.iter().map(|item| bind_slot(&content, &slot, item)).collect())
        }
        BlockKind::Function { name, params } => {
            debug!("Defining function '{}' with params {:?}", name, params);
            Finalized::Define {
                name,
                definition: FunctionDefinition::new(content.trim(), params),
            }
        }
        BlockKind::Literal => Finalized::Append(content),
        BlockKind::DisplayLiteral => {
            Finalized::Append(content.replace("{{", "\\{\\{").replace("}}", "\\}\\}"))
        }
        BlockKind::Normalize => Finalized::Append(normalize(&content)),
        BlockKind::Escape => Finalized::Append(encode_all(&content)),
    }
}

fn bind_slot(body: &str, slot: &str, value: &str) -> String {
    let bound = body.replace(&format!("{{{{slot::{}}}}}", slot), value);
    if slot == DEFAULT_SLOT {
        bound.replace("{{slot}}", value)
    } else {
        bound
    }
}

/// Strips leading whitespace from every line and trims the result.
pub fn trim_lines(text: &str) -> String {
    text.split('\n')
        .map(str::trim_start)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Removes line breaks and tabs, then resolves `\uXXXX` and backslash escapes.
pub fn normalize(text: &str) -> String {
    let collapsed: String = text
        .trim()
        .chars()
        .filter(|c| !matches!(c, '\n' | '\r' | '\t'))
        .collect();

    let mut unescaped = String::with_capacity(collapsed.len());
    let mut chars = collapsed.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => unescaped.push('\n'),
            Some('r') => unescaped.push('\r'),
            Some('t') => unescaped.push('\t'),
            Some('0') => unescaped.push('\0'),
            Some('u') => {
                let hex: String = chars.clone().take(4).collect();
                let decoded = (hex.len() == 4)
                    .then(|| u32::from_str_radix(&hex, 16).ok())
                    .flatten()
                    .and_then(char::from_u32);
                match decoded {
                    Some(ch) => {
                        unescaped.push(ch);
                        chars.nth(3);
                    }
                    None => unescaped.push_str("\\u"),
                }
            }
            Some(other) => unescaped.push(other),
            None => unescaped.push('\\'),
        }
    }
    unescaped
}
