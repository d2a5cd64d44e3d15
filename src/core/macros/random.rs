use std::sync::Arc;

use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;

use crate::registry::{ChatBridge, Invocation, MacroContext};
use crate::types::{MacroOutput, TempVars};
use crate::MacroError;

use super::{MacroHandler, MacroSignature, ParamType};

lazy_static! {
    static ref DICE: Regex = Regex::new(r"^(\d*)[dD](\d+)$").unwrap();
}

pub(crate) fn handlers<C: ChatBridge + 'static>() -> Vec<Arc<dyn MacroHandler<C>>> {
    vec![Arc::new(RandomMacro), Arc::new(RandIntMacro), Arc::new(RollMacro)]
}

/// Picks one of its arguments. A single argument is split on commas.
pub struct RandomMacro;

impl<C: ChatBridge + 'static> MacroHandler<C> for RandomMacro {
    fn call(
        &self,
        invocation: &Invocation,
        ctx: &MacroContext<'_, C>,
        _: &TempVars,
    ) -> Result<MacroOutput, MacroError> {
        let options: Vec<&str> = match invocation.args.as_slice() {
            [single] => single.split(',').collect(),
            many => many.iter().map(String::as_str).collect(),
        };

        // empty options does not need to fail
        if options.is_empty() {
            return Ok(MacroOutput::Text(String::new()));
        }
        if ctx.tokenize_accurate() {
            return Ok(options[0].into());
        }

        let index = rand::rng().random_range(0..options.len());
        Ok(options[index].into())
    }

    fn signature(&self) -> MacroSignature {
        MacroSignature::new("random", "Picks one of the options at random")
            .param("option", ParamType::Text, "The first option")
            .variadic()
    }
}

pub struct RandIntMacro;

impl<C: ChatBridge + 'static> MacroHandler<C> for RandIntMacro {
    fn call(
        &self,
        invocation: &Invocation,
        ctx: &MacroContext<'_, C>,
        _: &TempVars,
    ) -> Result<MacroOutput, MacroError> {
        let min = parse_int(invocation.arg(0))?;
        let max = parse_int(invocation.arg(1))?;
        if min > max {
            return Err(MacroError::InvalidArguments(format!("min {} is greater than max {}", min, max)));
        }
        if ctx.tokenize_accurate() {
            return Ok(min.to_string().into());
        }
        Ok(rand::rng().random_range(min..=max).to_string().into())
    }

    fn signature(&self) -> MacroSignature {
        MacroSignature::new("randint", "A random integer between min and max, inclusive")
            .param("min", ParamType::Integer, "Lower bound")
            .param("max", ParamType::Integer, "Upper bound")
    }
}

/// Dice notation: `2d6`, `d20` or a bare side count.
pub struct RollMacro;

impl<C: ChatBridge + 'static> MacroHandler<C> for RollMacro {
    fn call(
        &self,
        invocation: &Invocation,
        ctx: &MacroContext<'_, C>,
        _: &TempVars,
    ) -> Result<MacroOutput, MacroError> {
        let notation = invocation.arg(0).unwrap_or_default().trim();
        let (count, sides) = parse_dice(notation)?;
        if ctx.tokenize_accurate() {
            return Ok(count.to_string().into());
        }

        let mut rng = rand::rng();
        let total = (0..count)
            .try_fold(0u64, |total, _| total.checked_add(rng.random_range(1..=sides)))
            .ok_or_else(|| MacroError::InvalidArguments(format!("Dice total for '{}' overflows", notation)))?;
        Ok(total.to_string().into())
    }

    fn signature(&self) -> MacroSignature {
        MacroSignature::new("roll", "Rolls dice and sums the result")
            .param("dice", ParamType::Text, "Dice notation such as 2d6")
    }
}

fn parse_int(value: Option<&str>) -> Result<i64, MacroError> {
    value
        .unwrap_or_default()
        .trim()
        .parse()
        .map_err(|_| MacroError::TypeMismatch(format!("Expected integer, got {:?}", value)))
}

fn parse_dice(notation: &str) -> Result<(u64, u64), MacroError> {
    let invalid = || MacroError::InvalidArguments(format!("Invalid dice notation '{}'", notation));

    let (count, sides) = match DICE.captures(notation) {
        Some(caps) => {
            let count = match &caps[1] {
                "" => 1,
                digits => digits.parse().map_err(|_| invalid())?,
            };
            (count, caps[2].parse().map_err(|_| invalid())?)
        }
        None => (1, notation.parse().map_err(|_| invalid())?),
    };

    if count == 0 || sides == 0 || count > 1000 {
        return Err(invalid());
    }
    Ok((count, sides))
}
