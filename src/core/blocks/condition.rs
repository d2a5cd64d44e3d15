use log::{debug, trace};

use crate::registry::ChatBridge;

/// Decides the outcome of a `#when` header.
///
/// `statement` is the header split on `::`, with style keywords removed.
pub trait ConditionEvaluator<C: ChatBridge + 'static>: Send + Sync {
    fn evaluate(&self, statement: &[String], bridge: &C) -> bool;
}

/// Default `#when` semantics: the statement is reduced from the right, two
/// tokens (operator and operand) at a time.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatementEvaluator;

pub fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn flag(value: bool) -> String {
    let text = if value { "1" } else { "0" };
    text.to_string()
}

fn compare(lhs: &str, rhs: &str, op: fn(f64, f64) -> bool) -> Option<bool> {
    let lhs = lhs.trim().parse::<f64>().ok()?;
    let rhs = rhs.trim().parse::<f64>().ok()?;
    Some(op(lhs, rhs))
}

impl<C: ChatBridge + 'static> ConditionEvaluator<C> for StatementEvaluator {
    fn evaluate(&self, statement: &[String], bridge: &C) -> bool {
        trace!("StatementEvaluator::evaluate({:?})", statement);
        let mut stack: Vec<String> = statement.to_vec();

        while stack.len() > 1 {
            let (Some(operand), Some(operator)) = (stack.pop(), stack.pop()) else {
                break;
            };

            let reduced = match operator.trim() {
                "not" => flag(!is_truthy(&operand)),
                "var" => flag(bridge.chat_variable(operand.trim()).is_some_and(|v| is_truthy(&v))),
                binary => {
                    let Some(lhs) = stack.pop() else {
                        debug!("Operator '{}' is missing its left operand", binary);
                        return false;
                    };
                    let outcome = match binary {
                        "is" => Some(lhs == operand),
                        "isnot" => Some(lhs != operand),
                        "and" => Some(is_truthy(&lhs) && is_truthy(&operand)),
                        "or" => Some(is_truthy(&lhs) || is_truthy(&operand)),
                        ">" => compare(&lhs, &operand, |a, b| a > b),
                        "<" => compare(&lhs, &operand, |a, b| a < b),
                        ">=" => compare(&lhs, &operand, |a, b| a >= b),
                        "<=" => compare(&lhs, &operand, |a, b| a <= b),
                        unknown => {
                            debug!("Unknown condition operator '{}'", unknown);
                            return false;
                        }
                    };
                    flag(outcome.unwrap_or(false))
                }
            };
            stack.push(reduced);
        }

        stack.first().is_some_and(|value| is_truthy(value))
    }
}
