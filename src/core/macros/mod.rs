use log::trace;
use std::fmt;
use std::sync::Arc;

use crate::registry::{ChatBridge, Invocation, MacroContext, parse_array};
use crate::types::{MacroOutput, TempVars};
use crate::MacroError;

pub mod array;
pub mod calc;
pub mod random;
pub mod text;
pub mod vars;

#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    Text,
    Number,
    Integer,
    /// JSON array or `§`-separated list.
    Array,
    Any,
    Optional(Box<ParamType>),
}

impl ParamType {
    pub fn is_optional(&self) -> bool {
        matches!(self, ParamType::Optional(_))
    }

    pub fn matches(&self, value: &str) -> bool {
        trace!("ParamType::matches({:?}, {:?})", self, value);
        match self {
            ParamType::Text | ParamType::Any => true,
            ParamType::Number => value.trim().parse::<f64>().is_ok(),
            ParamType::Integer => value.trim().parse::<i64>().is_ok(),
            ParamType::Array => parse_array(value).is_ok(),
            ParamType::Optional(inner) => inner.matches(value),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Text => write!(f, "Text"),
            ParamType::Number => write!(f, "Number"),
            ParamType::Integer => write!(f, "Integer"),
            ParamType::Array => write!(f, "Array"),
            ParamType::Any => write!(f, "Any"),
            ParamType::Optional(inner) => write!(f, "Optional({})", inner),
        }
    }
}

pub struct ParamSignature {
    pub param_type: ParamType,
    pub name: String,
    pub description: String,
}

impl ParamSignature {
    pub fn new(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            param_type,
            name: name.to_string(),
            description: description.to_string(),
        }
    }
}

pub struct MacroSignature {
    pub name: String,
    pub aliases: Vec<String>,
    pub params: Vec<ParamSignature>,
    /// Accept any number of trailing arguments beyond `params`.
    pub variadic: bool,
    pub description: String,
}

impl MacroSignature {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            aliases: Vec::new(),
            params: Vec::new(),
            variadic: false,
            description: description.to_string(),
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    pub fn param(mut self, name: &str, param_type: ParamType, description: &str) -> Self {
        self.params.push(ParamSignature::new(name, param_type, description));
        self
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }
}

pub trait MacroHandler<C: ChatBridge + 'static>: Send + Sync {
    fn call(
        &self,
        invocation: &Invocation,
        ctx: &MacroContext<'_, C>,
        vars: &TempVars,
    ) -> Result<MacroOutput, MacroError>;

    fn signature(&self) -> MacroSignature;

    fn validate_args(&self, args: &[String]) -> Result<(), String> {
        trace!("MacroHandler::validate_args({:?})", args);
        let signature = self.signature();
        let params = &signature.params;
        let required = params.iter().filter(|p| !p.param_type.is_optional()).count();

        if args.len() < required {
            return Err(format!("Expected at least {} arguments, got {}", required, args.len()));
        }
        if args.len() > params.len() && !signature.variadic {
            return Err(format!("Expected at most {} arguments, got {}", params.len(), args.len()));
        }

        for (i, (arg, param)) in args.iter().zip(params.iter()).enumerate() {
            if !param.param_type.matches(arg) {
                return Err(format!(
                    "Argument {} ('{}') expected to be of type {}, got {:?}",
                    i, param.name, param.param_type, arg
                ));
            }
        }

        Ok(())
    }
}

pub(crate) fn load_builtins<C: ChatBridge + 'static>() -> Vec<Arc<dyn MacroHandler<C>>> {
    let mut handlers: Vec<Arc<dyn MacroHandler<C>>> = Vec::new();
    handlers.extend(vars::handlers::<C>());
    handlers.extend(text::handlers::<C>());
    handlers.extend(random::handlers::<C>());
    handlers.extend(array::handlers::<C>());
    handlers.push(Arc::new(calc::CalcMacro));
    handlers
}
