use std::sync::Arc;

use log::debug;

use crate::registry::{ChatBridge, Invocation, MacroContext};
use crate::types::{MacroOutput, TempVars, format_number};
use crate::MacroError;

use super::{MacroHandler, MacroSignature, ParamType};

/// Value reported for variables that were never set.
const UNSET: &str = "null";

pub(crate) fn handlers<C: ChatBridge + 'static>() -> Vec<Arc<dyn MacroHandler<C>>> {
    vec![
        Arc::new(TempVarMacro),
        Arc::new(SetTempVarMacro),
        Arc::new(ReturnMacro),
        Arc::new(GetVarMacro),
        Arc::new(SetVarMacro),
        Arc::new(AddVarMacro),
        Arc::new(GetGlobalVarMacro),
    ]
}

fn name_arg(invocation: &Invocation) -> Result<&str, MacroError> {
    invocation
        .arg(0)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| MacroError::InvalidArguments("Variable name is empty".to_string()))
}

pub struct TempVarMacro;

impl<C: ChatBridge + 'static> MacroHandler<C> for TempVarMacro {
    fn call(
        &self,
        invocation: &Invocation,
        _: &MacroContext<'_, C>,
        vars: &TempVars,
    ) -> Result<MacroOutput, MacroError> {
        let name = name_arg(invocation)?;
        Ok(vars.get(name).cloned().unwrap_or_default().into())
    }

    fn signature(&self) -> MacroSignature {
        MacroSignature::new("tempvar", "Reads a temporary variable")
            .param("name", ParamType::Text, "The variable to read")
    }
}

pub struct SetTempVarMacro;

impl<C: ChatBridge + 'static> MacroHandler<C> for SetTempVarMacro {
    fn call(
        &self,
        invocation: &Invocation,
        _: &MacroContext<'_, C>,
        vars: &TempVars,
    ) -> Result<MacroOutput, MacroError> {
        let name = name_arg(invocation)?;
        let value = invocation.arg(1).unwrap_or_default().to_string();
        let mut vars = vars.clone();
        vars.insert(name.to_string(), value);
        Ok(MacroOutput::WithVars { text: String::new(), vars })
    }

    fn signature(&self) -> MacroSignature {
        MacroSignature::new("settempvar", "Sets a temporary variable for the rest of the evaluation")
            .param("name", ParamType::Text, "The variable to set")
            .param("value", ParamType::Text, "The value to store")
    }
}

pub struct ReturnMacro;

impl<C: ChatBridge + 'static> MacroHandler<C> for ReturnMacro {
    fn call(
        &self,
        invocation: &Invocation,
        _: &MacroContext<'_, C>,
        _: &TempVars,
    ) -> Result<MacroOutput, MacroError> {
        Ok(MacroOutput::Return(invocation.arg(0).map(str::to_string)))
    }

    fn signature(&self) -> MacroSignature {
        MacroSignature::new("return", "Stops the evaluation and yields the given value")
            .param("value", ParamType::Optional(Box::new(ParamType::Text)), "The value to yield")
    }
}

pub struct GetVarMacro;

impl<C: ChatBridge + 'static> MacroHandler<C> for GetVarMacro {
    fn call(
        &self,
        invocation: &Invocation,
        ctx: &MacroContext<'_, C>,
        _: &TempVars,
    ) -> Result<MacroOutput, MacroError> {
        let name = name_arg(invocation)?;
        Ok(ctx
            .bridge()
            .chat_variable(name)
            .unwrap_or_else(|| UNSET.to_string())
            .into())
    }

    fn signature(&self) -> MacroSignature {
        MacroSignature::new("getvar", "Reads a chat variable")
            .param("name", ParamType::Text, "The variable to read")
    }
}

pub struct SetVarMacro;

impl<C: ChatBridge + 'static> MacroHandler<C> for SetVarMacro {
    fn call(
        &self,
        invocation: &Invocation,
        ctx: &MacroContext<'_, C>,
        _: &TempVars,
    ) -> Result<MacroOutput, MacroError> {
        let name = name_arg(invocation)?;
        let value = invocation.arg(1).unwrap_or_default().to_string();
        if ctx.tokenize_accurate() {
            return Ok(MacroOutput::Text(String::new()));
        }
        debug!("Setting chat variable '{}'", name);
        ctx.bridge().set_chat_variable(name, value)?;
        Ok(MacroOutput::Text(String::new()))
    }

    fn signature(&self) -> MacroSignature {
        MacroSignature::new("setvar", "Sets a chat variable")
            .param("name", ParamType::Text, "The variable to set")
            .param("value", ParamType::Text, "The value to store")
    }
}

pub struct AddVarMacro;

impl<C: ChatBridge + 'static> MacroHandler<C> for AddVarMacro {
    fn call(
        &self,
        invocation: &Invocation,
        ctx: &MacroContext<'_, C>,
        _: &TempVars,
    ) -> Result<MacroOutput, MacroError> {
        let name = name_arg(invocation)?;
        let delta: f64 = invocation
            .arg(1)
            .unwrap_or_default()
            .trim()
            .parse()
            .map_err(|_| MacroError::TypeMismatch("addvar expects a number".to_string()))?;
        if ctx.tokenize_accurate() {
            return Ok(MacroOutput::Text(String::new()));
        }

        let current = ctx
            .bridge()
            .chat_variable(name)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .unwrap_or(0.0);
        ctx.bridge().set_chat_variable(name, format_number(current + delta))?;
        Ok(MacroOutput::Text(String::new()))
    }

    fn signature(&self) -> MacroSignature {
        MacroSignature::new("addvar", "Adds a number to a chat variable")
            .param("name", ParamType::Text, "The variable to modify")
            .param("value", ParamType::Number, "The amount to add")
    }
}

pub struct GetGlobalVarMacro;

impl<C: ChatBridge + 'static> MacroHandler<C> for GetGlobalVarMacro {
    fn call(
        &self,
        invocation: &Invocation,
        ctx: &MacroContext<'_, C>,
        _: &TempVars,
    ) -> Result<MacroOutput, MacroError> {
        let name = name_arg(invocation)?;
        Ok(ctx
            .bridge()
            .global_variable(name)
            .unwrap_or_else(|| UNSET.to_string())
            .into())
    }

    fn signature(&self) -> MacroSignature {
        MacroSignature::new("getglobalvar", "Reads a global variable")
            .param("name", ParamType::Text, "The variable to read")
    }
}
