//! Block constructs: `{{#kind ...}} ... {{/kind}}`.
//!
//! [`classify`] decides what an opening header means; [`finalize`] turns the
//! text collected up to the matching close into the block's output.

use log::trace;

use crate::registry::ChatBridge;

pub mod condition;
pub mod finalize;

pub use condition::{ConditionEvaluator, StatementEvaluator, is_truthy};
pub use finalize::{Finalized, finalize, normalize, trim_lines};

/// Slot name used by `#each` when no `as <name>` is given. `{{slot}}` is
/// accepted as a shorthand for `{{slot::slot}}`.
pub const DEFAULT_SLOT: &str = "slot";

/// Separates the taken and untaken branches of a conditional block.
pub const ELSE_MARKER: &str = "{{:else}}";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConditionStyle {
    /// Strip leading whitespace from every line, then trim the block.
    Trim,
    /// Trim the block as a whole.
    Legacy,
    /// Leave whitespace untouched.
    Keep,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BlockKind {
    Conditional { truthy: bool, style: ConditionStyle },
    Loop { source: String, slot: String },
    Function { name: String, params: Vec<String> },
    Literal,
    DisplayLiteral,
    Normalize,
    Escape,
}

impl BlockKind {
    /// Whether macros between the opener and the close are left unevaluated.
    pub fn enters_pure_mode(&self) -> bool {
        match self {
            BlockKind::Conditional { truthy, .. } => !truthy,
            BlockKind::Loop { .. }
            | BlockKind::Function { .. }
            | BlockKind::Literal
            | BlockKind::DisplayLiteral
            | BlockKind::Escape => true,
            BlockKind::Normalize => false,
        }
    }
}

/// An open block on the scanner's stack.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockFrame {
    pub kind: BlockKind,
    /// Opening text without the braces, for re-emission if the block never closes.
    pub header: String,
    /// Byte offset of [`ELSE_MARKER`] in the block's buffer.
    pub else_at: Option<usize>,
}

impl BlockFrame {
    pub fn new(kind: BlockKind, header: &str) -> Self {
        Self { kind, header: header.to_string(), else_at: None }
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self.kind, BlockKind::Conditional { .. })
    }
}

/// Splits `#keyword rest` into the lowercased keyword and its argument text.
/// The argument may follow a space or a `::`.
fn split_header(header: &str) -> (String, &str) {
    let body = header.strip_prefix('#').unwrap_or(header);
    let end = body
        .find(|c: char| c.is_whitespace() || c == ':')
        .unwrap_or(body.len());
    let (keyword, rest) = body.split_at(end);
    let rest = rest.strip_prefix("::").unwrap_or_else(|| rest.trim_start());
    (keyword.to_lowercase(), rest)
}

/// A loop slot is a single bare word, so list text such as `["a as b"]` never
/// reads as `<source> as <slot>`.
fn is_slot_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

/// Classifies a block opener. `None` means the header is not a block and the
/// scanner keeps it as literal text.
pub fn classify<C: ChatBridge + 'static>(
    header: &str,
    conditions: &dyn ConditionEvaluator<C>,
    bridge: &C,
) -> Option<BlockKind> {
    let (keyword, rest) = split_header(header);
    trace!("Classifying block '{}' with argument {:?}", keyword, rest);

    let kind = match keyword.as_str() {
        "if" => BlockKind::Conditional { truthy: is_truthy(rest), style: ConditionStyle::Legacy },
        "if_pure" => BlockKind::Conditional { truthy: is_truthy(rest), style: ConditionStyle::Keep },
        "when" => {
            let mut statement: Vec<String> = rest.split("::").map(str::to_string).collect();
            let mut style = ConditionStyle::Trim;
            while statement.len() > 1 {
                match statement[0].trim() {
                    "keep" => style = ConditionStyle::Keep,
                    "legacy" => style = ConditionStyle::Legacy,
                    _ => break,
                }
                statement.remove(0);
            }
            let truthy = conditions.evaluate(&statement, bridge);
            BlockKind::Conditional { truthy, style }
        }
        "each" => {
            let (source, slot) = match rest.rsplit_once(" as ") {
                Some((source, slot)) if is_slot_name(slot.trim()) => (source, slot.trim()),
                _ => (rest, DEFAULT_SLOT),
            };
            BlockKind::Loop { source: source.trim().to_string(), slot: slot.to_string() }
        }
        "func" => {
            let mut tokens = rest
                .split(char::is_whitespace)
                .flat_map(|token| token.split("::"))
                .filter(|token| !token.is_empty())
                .map(str::to_string);
            let name = tokens.next()?;
            BlockKind::Function { name, params: tokens.collect() }
        }
        "pure" if rest.trim().is_empty() => BlockKind::Literal,
        "puredisplay" | "pure_display" if rest.trim().is_empty() => BlockKind::DisplayLiteral,
        "code" if rest.trim().is_empty() => BlockKind::Normalize,
        "escape" if rest.trim().is_empty() => BlockKind::Escape,
        _ => return None,
    };
    Some(kind)
}
