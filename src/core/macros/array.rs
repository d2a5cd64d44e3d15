use std::sync::Arc;

use serde_json::Value;

use crate::registry::{ChatBridge, Invocation, MacroContext, parse_array};
use crate::types::{MacroOutput, TempVars};
use crate::MacroError;

use super::{MacroHandler, MacroSignature, ParamType};

pub(crate) fn handlers<C: ChatBridge + 'static>() -> Vec<Arc<dyn MacroHandler<C>>> {
    vec![
        Arc::new(MakeArrayMacro),
        Arc::new(ArrayLengthMacro),
        Arc::new(ArrayElementMacro),
        Arc::new(ArrayPushMacro),
        Arc::new(JoinMacro),
    ]
}

fn to_json(items: Vec<String>) -> Result<String, MacroError> {
    serde_json::to_string(&Value::Array(items.into_iter().map(Value::String).collect()))
        .map_err(|e| MacroError::Evaluation(e.to_string()))
}

fn list_arg(invocation: &Invocation) -> Result<Vec<String>, MacroError> {
    parse_array(invocation.arg(0).unwrap_or_default())
}

pub struct MakeArrayMacro;

impl<C: ChatBridge + 'static> MacroHandler<C> for MakeArrayMacro {
    fn call(
        &self,
        invocation: &Invocation,
        _: &MacroContext<'_, C>,
        _: &TempVars,
    ) -> Result<MacroOutput, MacroError> {
        Ok(to_json(invocation.args.clone())?.into())
    }

    fn signature(&self) -> MacroSignature {
        MacroSignature::new("array", "Builds a JSON array from the arguments")
            .param("item", ParamType::Optional(Box::new(ParamType::Text)), "The first element")
            .variadic()
    }
}

pub struct ArrayLengthMacro;

impl<C: ChatBridge + 'static> MacroHandler<C> for ArrayLengthMacro {
    fn call(
        &self,
        invocation: &Invocation,
        _: &MacroContext<'_, C>,
        _: &TempVars,
    ) -> Result<MacroOutput, MacroError> {
        Ok(list_arg(invocation)?.len().to_string().into())
    }

    fn signature(&self) -> MacroSignature {
        MacroSignature::new("array_length", "Number of elements in a list")
            .param("list", ParamType::Array, "The list")
    }
}

pub struct ArrayElementMacro;

impl<C: ChatBridge + 'static> MacroHandler<C> for ArrayElementMacro {
    fn call(
        &self,
        invocation: &Invocation,
        _: &MacroContext<'_, C>,
        _: &TempVars,
    ) -> Result<MacroOutput, MacroError> {
        let items = list_arg(invocation)?;
        let index: i64 = invocation
            .arg(1)
            .unwrap_or_default()
            .trim()
            .parse()
            .map_err(|_| MacroError::TypeMismatch("index must be an integer".to_string()))?;

        // negative indices count from the end
        let resolved = if index < 0 { items.len() as i64 + index } else { index };
        let element = usize::try_from(resolved)
            .ok()
            .and_then(|i| items.get(i).cloned())
            .unwrap_or_else(|| "null".to_string());
        Ok(element.into())
    }

    fn signature(&self) -> MacroSignature {
        MacroSignature::new("array_element", "The element at an index")
            .param("list", ParamType::Array, "The list")
            .param("index", ParamType::Integer, "Zero-based index")
    }
}

pub struct ArrayPushMacro;

impl<C: ChatBridge + 'static> MacroHandler<C> for ArrayPushMacro {
    fn call(
        &self,
        invocation: &Invocation,
        _: &MacroContext<'_, C>,
        _: &TempVars,
    ) -> Result<MacroOutput, MacroError> {
        let mut items = list_arg(invocation)?;
        items.push(invocation.arg(1).unwrap_or_default().to_string());
        Ok(to_json(items)?.into())
    }

    fn signature(&self) -> MacroSignature {
        MacroSignature::new("array_push", "Appends an element to a list")
            .param("list", ParamType::Array, "The list")
            .param("value", ParamType::Text, "The element to append")
    }
}

pub struct JoinMacro;

impl<C: ChatBridge + 'static> MacroHandler<C> for JoinMacro {
    fn call(
        &self,
        invocation: &Invocation,
        _: &MacroContext<'_, C>,
        _: &TempVars,
    ) -> Result<MacroOutput, MacroError> {
        let items = list_arg(invocation)?;
        let separator = invocation.arg(1).unwrap_or(", ");
        Ok(items.join(separator).into())
    }

    fn signature(&self) -> MacroSignature {
        MacroSignature::new("join", "Joins list elements with a separator")
            .param("list", ParamType::Array, "The list")
            .param("separator", ParamType::Optional(Box::new(ParamType::Text)), "Defaults to ', '")
    }
}
