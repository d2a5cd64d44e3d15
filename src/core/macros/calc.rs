use lazy_static::lazy_static;
use pest::iterators::Pairs;
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;
use pest_derive::Parser;

use crate::escape::decode_all;
use crate::registry::{ChatBridge, Invocation, MacroContext};
use crate::types::{MacroOutput, TempVars, format_number};
use crate::MacroError;

use super::{MacroHandler, MacroSignature, ParamType};

#[derive(Parser)]
#[grammar = "core/macros/calc.pest"]
struct CalcParser;

lazy_static! {
    static ref PRATT: PrattParser<Rule> = PrattParser::new()
        .op(Op::infix(Rule::op_or, Assoc::Left))
        .op(Op::infix(Rule::op_and, Assoc::Left))
        .op(Op::infix(Rule::eq, Assoc::Left) | Op::infix(Rule::ne, Assoc::Left))
        .op(Op::infix(Rule::lt, Assoc::Left)
            | Op::infix(Rule::le, Assoc::Left)
            | Op::infix(Rule::gt, Assoc::Left)
            | Op::infix(Rule::ge, Assoc::Left))
        .op(Op::infix(Rule::add, Assoc::Left) | Op::infix(Rule::sub, Assoc::Left))
        .op(Op::infix(Rule::mul, Assoc::Left)
            | Op::infix(Rule::div, Assoc::Left)
            | Op::infix(Rule::rem, Assoc::Left))
        .op(Op::prefix(Rule::neg) | Op::prefix(Rule::op_not))
        .op(Op::infix(Rule::pow, Assoc::Right));
}

fn truth(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

/// Evaluates an arithmetic expression. Comparisons and logic yield `1` or `0`.
pub fn calculate(expression: &str) -> Result<f64, MacroError> {
    let mut pairs = CalcParser::parse(Rule::calculation, expression)
        .map_err(|e| MacroError::Calc(e.to_string()))?;
    let expr = pairs
        .next()
        .ok_or_else(|| MacroError::Calc("Empty expression".to_string()))?;
    eval(expr.into_inner())
}

fn eval(pairs: Pairs<Rule>) -> Result<f64, MacroError> {
    PRATT
        .map_primary(|primary| match primary.as_rule() {
            Rule::number => primary
                .as_str()
                .parse::<f64>()
                .map_err(|e| MacroError::Calc(e.to_string())),
            Rule::expr => eval(primary.into_inner()),
            rule => Err(MacroError::Calc(format!("Unexpected rule {:?}", rule))),
        })
        .map_prefix(|op, rhs| {
            let rhs = rhs?;
            match op.as_rule() {
                Rule::neg => Ok(-rhs),
                Rule::op_not => Ok(truth(rhs == 0.0)),
                rule => Err(MacroError::Calc(format!("Unexpected prefix {:?}", rule))),
            }
        })
        .map_infix(|lhs, op, rhs| {
            let (lhs, rhs) = (lhs?, rhs?);
            match op.as_rule() {
                Rule::add => Ok(lhs + rhs),
                Rule::sub => Ok(lhs - rhs),
                Rule::mul => Ok(lhs * rhs),
                Rule::div | Rule::rem if rhs == 0.0 => {
                    Err(MacroError::Calc("Division by zero".to_string()))
                }
                Rule::div => Ok(lhs / rhs),
                Rule::rem => Ok(lhs % rhs),
                Rule::pow => Ok(lhs.powf(rhs)),
                Rule::lt => Ok(truth(lhs < rhs)),
                Rule::le => Ok(truth(lhs <= rhs)),
                Rule::gt => Ok(truth(lhs > rhs)),
                Rule::ge => Ok(truth(lhs >= rhs)),
                Rule::eq => Ok(truth(lhs == rhs)),
                Rule::ne => Ok(truth(lhs != rhs)),
                Rule::op_and => Ok(truth(lhs != 0.0 && rhs != 0.0)),
                Rule::op_or => Ok(truth(lhs != 0.0 || rhs != 0.0)),
                rule => Err(MacroError::Calc(format!("Unexpected operator {:?}", rule))),
            }
        })
        .parse(pairs)
}

pub struct CalcMacro;

impl<C: ChatBridge + 'static> MacroHandler<C> for CalcMacro {
    fn call(
        &self,
        invocation: &Invocation,
        _: &MacroContext<'_, C>,
        _: &TempVars,
    ) -> Result<MacroOutput, MacroError> {
        let expression = decode_all(&invocation.raw_args);
        Ok(format_number(calculate(&expression)?).into())
    }

    fn signature(&self) -> MacroSignature {
        MacroSignature::new("calc", "Evaluates an arithmetic expression")
            .param("expression", ParamType::Text, "The expression")
            .variadic()
    }
}
