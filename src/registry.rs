use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{Arc, PoisonError, RwLock},
};

use log::{debug, error, trace, warn};
use once_cell::sync::Lazy;
use serde_json::Value;

use crate::{
    Engine, EvaluationContext, MacroError,
    core::macros::{MacroHandler, load_builtins},
    parser::Evaluation,
    types::{FunctionTable, MacroOutput, TempVars, value_to_text},
};

/// Separator used by `§`-joined lists when the text is not a JSON array.
pub const LIST_SEPARATOR: char = '§';

// --- ChatBridge Trait ---

/// Read access to the active character and chat, plus the persistent variable store.
pub trait ChatBridge: Debug {
    fn char_name(&self) -> String;
    fn user_name(&self) -> String;
    fn chat_variable(&self, name: &str) -> Option<String>;
    fn set_chat_variable(&self, name: &str, value: String) -> Result<(), MacroError>;

    fn global_variable(&self, _name: &str) -> Option<String> {
        None
    }
}

/// Aliases shared by every registry, resolved before handler lookup.
static BUILTIN_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("bot", "char"),
        ("gettempvar", "tempvar"),
        ("newline", "br"),
        ("blank", "none"),
        ("makearray", "array"),
        ("dice", "roll"),
        ("?", "calc"),
    ])
});

// --- Invocation ---

/// A parsed `{{...}}` body that is neither a block opener nor a closer.
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    /// Lowercased macro name, before alias resolution.
    pub name: String,
    /// Everything after the first `::`, untouched.
    pub raw_args: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// Splits `raw` into name and positional arguments.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Some(expression) = trimmed.strip_prefix('?') {
            return Self::single("?", expression.trim());
        }
        if let Some(comment) = trimmed.strip_prefix("//") {
            return Self::single("//", comment.trim());
        }

        match raw.split_once("::") {
            Some((name, rest)) => Invocation {
                name: name.trim().to_lowercase(),
                raw_args: rest.to_string(),
                args: rest.split("::").map(str::to_string).collect(),
            },
            None => Self::bare(trimmed),
        }
    }

    fn bare(name: &str) -> Self {
        Invocation {
            name: name.to_lowercase(),
            raw_args: String::new(),
            args: Vec::new(),
        }
    }

    fn single(name: &str, arg: &str) -> Self {
        Invocation {
            name: name.to_string(),
            raw_args: arg.to_string(),
            args: vec![arg.to_string()],
        }
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

// --- MacroContext ---

/// The view of an evaluation a handler receives.
pub struct MacroContext<'a, C: ChatBridge + 'static> {
    pub(crate) engine: &'a Engine<C>,
    pub(crate) bridge: &'a C,
    pub(crate) functions: &'a FunctionTable,
    pub(crate) visualize: bool,
    pub(crate) tokenize_accurate: bool,
    pub(crate) depth: u8,
}

impl<'a, C: ChatBridge + 'static> MacroContext<'a, C> {
    pub fn bridge(&self) -> &C {
        self.bridge
    }

    /// True when the output is rendered for a reader rather than sent to a model.
    pub fn visualize(&self) -> bool {
        self.visualize
    }

    /// True during token-counting passes; output must be deterministic.
    pub fn tokenize_accurate(&self) -> bool {
        self.tokenize_accurate
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Evaluates `text` one level deeper, with a copy of the current function table.
    ///
    /// At the call-depth limit the text is not scanned and the call-stack error
    /// is returned in its place.
    pub fn evaluate_nested(&self, text: &str, vars: TempVars) -> Evaluation {
        if self.depth >= self.engine.config().call_depth_limit {
            warn!("Nested evaluation refused at depth {}", self.depth);
            return Evaluation::call_stack_exceeded(vars, self.functions.clone());
        }
        let context = EvaluationContext::new(self.bridge)
            .visualize(self.visualize)
            .tokenize_accurate(self.tokenize_accurate)
            .with_vars(vars)
            .with_functions(self.functions.clone())
            .at_depth(self.depth + 1);
        self.engine.evaluate_session(text, context)
    }
}

// --- MacroRegistry ---

pub struct MacroRegistry<C: ChatBridge + 'static> {
    handlers: RwLock<HashMap<String, Arc<dyn MacroHandler<C>>>>,
    aliases: RwLock<HashMap<String, String>>,
}

impl<C: ChatBridge + 'static> MacroRegistry<C> {
    /// Creates a registry preloaded with the built-in macros.
    pub fn new() -> Self {
        let registry = Self::empty();
        for handler in load_builtins::<C>() {
            registry.register_macro(handler);
        }
        registry
    }

    /// Creates a registry without any handlers.
    pub fn empty() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            aliases: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a handler under its canonical name and declared aliases.
    /// A later registration with the same name replaces the earlier one.
    pub fn register_macro(&self, handler: Arc<dyn MacroHandler<C>>) {
        let signature = handler.signature();
        let name = signature.name.to_lowercase();
        debug!("Registering macro: {}", name);
        {
            let mut aliases = self.aliases.write().unwrap_or_else(PoisonError::into_inner);
            for alias in &signature.aliases {
                trace!("Registering alias '{}' -> '{}'", alias, name);
                aliases.insert(alias.to_lowercase(), name.clone());
            }
        }
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, handler);
    }

    /// Resolves an alias to its canonical macro name.
    pub fn resolve_name(&self, name: &str) -> String {
        let name = name.to_lowercase();
        if let Some(canonical) = self
            .aliases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name)
        {
            return canonical.clone();
        }
        BUILTIN_ALIASES
            .get(name.as_str())
            .map(|canonical| canonical.to_string())
            .unwrap_or(name)
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn MacroHandler<C>>> {
        let canonical = self.resolve_name(name);
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&canonical)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Resolves and runs the handler for `raw`.
    ///
    /// Unknown names, argument validation failures and handler errors all come
    /// back as [`MacroOutput::Unrecognized`].
    pub fn dispatch(&self, raw: &str, ctx: &MacroContext<'_, C>, vars: &TempVars) -> MacroOutput {
        let whole = raw.trim();
        let (handler, invocation) = match self.lookup(whole) {
            Some(handler) => (handler, Invocation::bare(whole)),
            None => {
                let invocation = Invocation::parse(raw);
                match self.lookup(&invocation.name) {
                    Some(handler) => (handler, invocation),
                    None => {
                        trace!("No macro registered for '{}'", invocation.name);
                        return MacroOutput::Unrecognized;
                    }
                }
            }
        };

        trace!("Dispatching macro '{}' with {} args", invocation.name, invocation.args.len());
        if let Err(validation_err) = handler.validate_args(&invocation.args) {
            warn!("Argument validation failed for macro '{}': {}", invocation.name, validation_err);
            return MacroOutput::Unrecognized;
        }

        match handler.call(&invocation, ctx, vars) {
            Ok(output) => output,
            Err(e) => {
                error!("Macro '{}' failed: {}", invocation.name, e);
                MacroOutput::Unrecognized
            }
        }
    }
}

impl<C: ChatBridge + 'static> Default for MacroRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes a list argument: a JSON array, or a `§`-separated list.
///
/// Non-string JSON elements are rendered in their JSON form.
pub fn parse_array(raw: &str) -> Result<Vec<String>, MacroError> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        let value: Value = serde_json::from_str(trimmed)
            .map_err(|e| MacroError::TypeMismatch(format!("Invalid array '{}': {}", trimmed, e)))?;
        return match value {
            Value::Array(items) => Ok(items.iter().map(value_to_text).collect()),
            other => Err(MacroError::TypeMismatch(format!("Expected array, got {}", other))),
        };
    }
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    Ok(trimmed.split(LIST_SEPARATOR).map(str::to_string).collect())
}
