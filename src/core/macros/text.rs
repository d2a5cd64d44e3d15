use std::sync::Arc;

use crate::escape::encode_literal;
use crate::registry::{ChatBridge, Invocation, MacroContext};
use crate::types::{MacroOutput, TempVars};
use crate::MacroError;

use super::{MacroHandler, MacroSignature, ParamType};

pub(crate) fn handlers<C: ChatBridge + 'static>() -> Vec<Arc<dyn MacroHandler<C>>> {
    let mut handlers: Vec<Arc<dyn MacroHandler<C>>> = vec![
        Arc::new(CharMacro),
        Arc::new(UserMacro),
        Arc::new(ConstantMacro { name: "br", value: "\n".to_string() }),
        Arc::new(ConstantMacro { name: "none", value: String::new() }),
        Arc::new(ConstantMacro { name: "bo", value: "{{".to_string() }),
        Arc::new(ConstantMacro { name: "bc", value: "}}".to_string() }),
        Arc::new(ConstantMacro { name: "decbo", value: "{".to_string() }),
        Arc::new(ConstantMacro { name: "decbc", value: "}".to_string() }),
        Arc::new(CaseMacro { upper: true }),
        Arc::new(CaseMacro { upper: false }),
        Arc::new(TrimMacro),
        Arc::new(ReplaceMacro),
        Arc::new(LengthMacro),
        Arc::new(CommentMacro),
        Arc::new(LineCommentMacro),
    ];
    for c in ['(', ')', '<', '>', ':', ';'] {
        handlers.push(Arc::new(PunctuationMacro { literal: c }));
    }
    handlers
}

pub struct CharMacro;

impl<C: ChatBridge + 'static> MacroHandler<C> for CharMacro {
    fn call(
        &self,
        _: &Invocation,
        ctx: &MacroContext<'_, C>,
        _: &TempVars,
    ) -> Result<MacroOutput, MacroError> {
        Ok(ctx.bridge().char_name().into())
    }

    fn signature(&self) -> MacroSignature {
        MacroSignature::new("char", "The active character's name")
    }
}

pub struct UserMacro;

impl<C: ChatBridge + 'static> MacroHandler<C> for UserMacro {
    fn call(
        &self,
        _: &Invocation,
        ctx: &MacroContext<'_, C>,
        _: &TempVars,
    ) -> Result<MacroOutput, MacroError> {
        Ok(ctx.bridge().user_name().into())
    }

    fn signature(&self) -> MacroSignature {
        MacroSignature::new("user", "The user's persona name")
    }
}

/// A zero-argument macro with fixed output.
pub struct ConstantMacro {
    name: &'static str,
    value: String,
}

impl<C: ChatBridge + 'static> MacroHandler<C> for ConstantMacro {
    fn call(
        &self,
        _: &Invocation,
        _: &MacroContext<'_, C>,
        _: &TempVars,
    ) -> Result<MacroOutput, MacroError> {
        Ok(self.value.clone().into())
    }

    fn signature(&self) -> MacroSignature {
        MacroSignature::new(self.name, "Constant text")
    }
}

/// Emits an escaped punctuation character that later passes leave alone.
pub struct PunctuationMacro {
    literal: char,
}

impl<C: ChatBridge + 'static> MacroHandler<C> for PunctuationMacro {
    fn call(
        &self,
        _: &Invocation,
        _: &MacroContext<'_, C>,
        _: &TempVars,
    ) -> Result<MacroOutput, MacroError> {
        Ok(encode_literal(self.literal).into())
    }

    fn signature(&self) -> MacroSignature {
        MacroSignature::new(&self.literal.to_string(), "Literal punctuation")
    }
}

pub struct CaseMacro {
    upper: bool,
}

impl<C: ChatBridge + 'static> MacroHandler<C> for CaseMacro {
    fn call(
        &self,
        invocation: &Invocation,
        _: &MacroContext<'_, C>,
        _: &TempVars,
    ) -> Result<MacroOutput, MacroError> {
        let text = invocation.raw_args.as_str();
        let converted = if self.upper { text.to_uppercase() } else { text.to_lowercase() };
        Ok(converted.into())
    }

    fn signature(&self) -> MacroSignature {
        let name = if self.upper { "upper" } else { "lower" };
        MacroSignature::new(name, "Changes the case of the text")
            .param("text", ParamType::Text, "The text to convert")
            .variadic()
    }
}

pub struct TrimMacro;

impl<C: ChatBridge + 'static> MacroHandler<C> for TrimMacro {
    fn call(
        &self,
        invocation: &Invocation,
        _: &MacroContext<'_, C>,
        _: &TempVars,
    ) -> Result<MacroOutput, MacroError> {
        Ok(invocation.raw_args.trim().into())
    }

    fn signature(&self) -> MacroSignature {
        MacroSignature::new("trim", "Strips surrounding whitespace")
            .param("text", ParamType::Text, "The text to trim")
            .variadic()
    }
}

pub struct ReplaceMacro;

impl<C: ChatBridge + 'static> MacroHandler<C> for ReplaceMacro {
    fn call(
        &self,
        invocation: &Invocation,
        _: &MacroContext<'_, C>,
        _: &TempVars,
    ) -> Result<MacroOutput, MacroError> {
        let (text, from, to) = (
            invocation.arg(0).unwrap_or_default(),
            invocation.arg(1).unwrap_or_default(),
            invocation.arg(2).unwrap_or_default(),
        );
        if from.is_empty() {
            return Ok(text.into());
        }
        Ok(text.replace(from, to).into())
    }

    fn signature(&self) -> MacroSignature {
        MacroSignature::new("replace", "Replaces every occurrence of a substring")
            .param("text", ParamType::Text, "The source text")
            .param("from", ParamType::Text, "The substring to find")
            .param("to", ParamType::Text, "The replacement")
    }
}

pub struct LengthMacro;

impl<C: ChatBridge + 'static> MacroHandler<C> for LengthMacro {
    fn call(
        &self,
        invocation: &Invocation,
        _: &MacroContext<'_, C>,
        _: &TempVars,
    ) -> Result<MacroOutput, MacroError> {
        Ok(invocation.raw_args.chars().count().to_string().into())
    }

    fn signature(&self) -> MacroSignature {
        MacroSignature::new("length", "Number of characters in the text")
            .param("text", ParamType::Text, "The text to measure")
            .variadic()
    }
}

/// Author notes shown only when rendering for a reader.
pub struct CommentMacro;

impl<C: ChatBridge + 'static> MacroHandler<C> for CommentMacro {
    fn call(
        &self,
        invocation: &Invocation,
        ctx: &MacroContext<'_, C>,
        _: &TempVars,
    ) -> Result<MacroOutput, MacroError> {
        if !ctx.visualize() {
            return Ok(MacroOutput::Text(String::new()));
        }
        Ok(format!("<div class=\"cbs-comment\">{}</div>", invocation.raw_args).into())
    }

    fn signature(&self) -> MacroSignature {
        MacroSignature::new("comment", "A note rendered only in display mode")
            .param("text", ParamType::Text, "The note")
            .variadic()
    }
}

pub struct LineCommentMacro;

impl<C: ChatBridge + 'static> MacroHandler<C> for LineCommentMacro {
    fn call(
        &self,
        _: &Invocation,
        _: &MacroContext<'_, C>,
        _: &TempVars,
    ) -> Result<MacroOutput, MacroError> {
        Ok(MacroOutput::Text(String::new()))
    }

    fn signature(&self) -> MacroSignature {
        MacroSignature::new("//", "Source comment, never rendered")
            .param("text", ParamType::Optional(Box::new(ParamType::Text)), "The comment")
            .variadic()
    }
}
