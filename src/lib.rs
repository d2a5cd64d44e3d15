use std::borrow::Cow;
use std::sync::Arc;

use lazy_static::lazy_static;
use log::{trace, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::parser::Session;

pub mod core;
pub mod errors;
pub mod escape;
pub mod registry;
pub mod types;
mod parser;
mod tests;

pub use crate::core::blocks::{ConditionEvaluator, StatementEvaluator};
pub use errors::{EngineError, MacroError};
pub use parser::{CALL_STACK_LIMIT_ERROR, Evaluation};
pub use registry::{ChatBridge, Invocation, MacroContext, MacroRegistry};
pub use types::{FunctionDefinition, FunctionTable, MacroOutput, TempVars};

lazy_static! {
    static ref ANGLE_MACRO: Regex = Regex::new(r"(?i)<(user|char|bot)>").unwrap();
}

/// Rewrites `<user>`, `<char>` and `<bot>` into their `{{...}}` form.
pub fn normalize_angle_macros(text: &str) -> Cow<'_, str> {
    ANGLE_MACRO.replace_all(text, "{{${1}}}")
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum nesting of `call::` and nested evaluations.
    pub call_depth_limit: u8,
    /// Inputs longer than this many characters are returned unevaluated.
    pub input_char_limit: Option<usize>,
    pub normalize_angle_macros: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            call_depth_limit: 20,
            input_char_limit: None,
            normalize_angle_macros: true,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Per-call inputs to [`Engine::evaluate`].
pub struct EvaluationContext<'a, C: ChatBridge + 'static> {
    pub(crate) bridge: &'a C,
    pub(crate) visualize: bool,
    pub(crate) tokenize_accurate: bool,
    pub(crate) vars: TempVars,
    pub(crate) functions: FunctionTable,
    pub(crate) depth: u8,
}

impl<'a, C: ChatBridge + 'static> EvaluationContext<'a, C> {
    pub fn new(bridge: &'a C) -> Self {
        Self {
            bridge,
            visualize: false,
            tokenize_accurate: false,
            vars: TempVars::new(),
            functions: FunctionTable::new(),
            depth: 0,
        }
    }

    /// Render for a reader (comments and other display-only output).
    pub fn visualize(mut self, visualize: bool) -> Self {
        self.visualize = visualize;
        self
    }

    /// Token-counting pass: random macros stay deterministic and chat variables are not written.
    pub fn tokenize_accurate(mut self, tokenize_accurate: bool) -> Self {
        self.tokenize_accurate = tokenize_accurate;
        self
    }

    pub fn with_vars(mut self, vars: TempVars) -> Self {
        self.vars = vars;
        self
    }

    pub fn with_functions(mut self, functions: FunctionTable) -> Self {
        self.functions = functions;
        self
    }

    pub fn at_depth(mut self, depth: u8) -> Self {
        self.depth = depth;
        self
    }
}

pub struct Engine<C: ChatBridge + 'static> {
    registry: Arc<MacroRegistry<C>>,
    conditions: Arc<dyn ConditionEvaluator<C>>,
    config: EngineConfig,
}

impl<C: ChatBridge + 'static> Engine<C> {
    /// Evaluates `text` and returns the resolved string.
    pub fn evaluate(&self, text: &str, context: EvaluationContext<'_, C>) -> String {
        self.evaluate_session(text, context).output
    }

    /// Evaluates `text` and returns the output together with the final
    /// temporary variables and function table.
    pub fn evaluate_session(&self, text: &str, context: EvaluationContext<'_, C>) -> Evaluation {
        if let Some(limit) = self.config.input_char_limit {
            if text.chars().count() > limit {
                warn!("Input exceeds {} characters, skipping evaluation", limit);
                return Evaluation {
                    output: text.to_string(),
                    vars: context.vars,
                    functions: context.functions,
                    returned: false,
                };
            }
        }

        trace!("Evaluating {} chars at depth {}", text.len(), context.depth);
        let text = if self.config.normalize_angle_macros {
            normalize_angle_macros(text)
        } else {
            Cow::Borrowed(text)
        };
        Session::new(self, &text, context).run()
    }

    pub fn registry(&self) -> &MacroRegistry<C> {
        &self.registry
    }

    pub fn conditions(&self) -> &dyn ConditionEvaluator<C> {
        self.conditions.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

pub trait EngineFactory<C: ChatBridge + 'static> {
    /// Creates an engine with the default config and condition semantics
    fn new(registry: Arc<MacroRegistry<C>>) -> Self;
    /// Replaces the engine config
    fn set_config(&mut self, config: EngineConfig) -> &mut Self;
    /// Replaces the collaborator deciding `#when` conditions
    fn set_condition_evaluator(&mut self, conditions: Arc<dyn ConditionEvaluator<C>>) -> &mut Self;
}

impl<C: ChatBridge + 'static> EngineFactory<C> for Engine<C> {
    fn new(registry: Arc<MacroRegistry<C>>) -> Self {
        Engine {
            registry,
            conditions: Arc::new(StatementEvaluator),
            config: EngineConfig::default(),
        }
    }
    fn set_config(&mut self, config: EngineConfig) -> &mut Self {
        self.config = config;
        self
    }
    fn set_condition_evaluator(&mut self, conditions: Arc<dyn ConditionEvaluator<C>>) -> &mut Self {
        self.conditions = conditions;
        self
    }
}
