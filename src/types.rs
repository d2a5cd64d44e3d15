use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref ARG_PLACEHOLDER: Regex = Regex::new(r"\{\{arg::([^{}]*)\}\}").unwrap();
}

/// Per-evaluation temporary variables, read and written by `tempvar`-class macros.
pub type TempVars = HashMap<String, String>;

/// Result of a single macro handler invocation.
#[derive(Clone, Debug, PartialEq)]
pub enum MacroOutput {
    /// Replacement text.
    Text(String),
    /// Replacement text plus the temporary variables the session continues with.
    WithVars { text: String, vars: TempVars },
    /// The handler does not recognise the invocation; the source text is kept verbatim.
    Unrecognized,
    /// Stop the whole evaluation and yield the payload (`"null"` when absent).
    Return(Option<String>),
}

impl From<String> for MacroOutput {
    fn from(value: String) -> Self {
        MacroOutput::Text(value)
    }
}

impl From<&str> for MacroOutput {
    fn from(value: &str) -> Self {
        MacroOutput::Text(value.to_string())
    }
}

/// A template registered by a `#func` block.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub body: String,
    pub params: Vec<String>,
}

impl FunctionDefinition {
    pub fn new(body: impl Into<String>, params: Vec<String>) -> Self {
        Self { body: body.into(), params }
    }

    /// Substitutes `{{arg::<index>}}` and `{{arg::<param name>}}` placeholders.
    /// Placeholders without a supplied value are left untouched.
    pub fn bind(&self, args: &[&str]) -> String {
        ARG_PLACEHOLDER
            .replace_all(&self.body, |caps: &Captures| {
                let key = caps[1].trim();
                let index = key
                    .parse::<usize>()
                    .ok()
                    .or_else(|| self.params.iter().position(|param| param == key));
                match index.and_then(|i| args.get(i)) {
                    Some(value) => value.to_string(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

/// User-defined functions visible to `call::` during one top-level evaluation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionTable {
    functions: HashMap<String, FunctionDefinition>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, name: impl Into<String>, definition: FunctionDefinition) {
        self.functions.insert(name.into(), definition);
    }

    pub fn get(&self, name: &str) -> Option<&FunctionDefinition> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Renders a JSON value the way macros expect to see it: strings unquoted,
/// everything else in its JSON form.
pub fn value_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Formats a number without a trailing `.0` when it is integral.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}
