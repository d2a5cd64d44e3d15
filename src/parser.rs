// src/parser.rs
//! The evaluation core: one left-to-right scan over the input with an explicit
//! frame stack.
//!
//! `{{` and `{#` open frames, `}}` and `#}` close them. A closed `{{...}}` is a
//! block opener (`#`), a block closer (`/`), a function call (`call::`) or a
//! macro. Input that never closes is re-wrapped with its opening delimiter at
//! the end of the scan, so no text is dropped.

use std::mem;

use log::{debug, trace, warn};

use crate::core::blocks::{BlockFrame, ELSE_MARKER, Finalized, classify, finalize};
use crate::registry::{ChatBridge, MacroContext};
use crate::types::{FunctionTable, MacroOutput, TempVars};
use crate::{Engine, EvaluationContext};

/// Emitted in place of a `call::` (or nested evaluation) beyond the depth limit.
pub const CALL_STACK_LIMIT_ERROR: &str = "ERROR: Call stack limit reached";

/// Payload used when `return` is invoked without a value.
const RETURN_NULL: &str = "null";

/// Outcome of one evaluation session.
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    pub output: String,
    pub vars: TempVars,
    pub functions: FunctionTable,
    /// True when a `return` macro ended the scan early.
    pub returned: bool,
}

impl Evaluation {
    pub(crate) fn call_stack_exceeded(vars: TempVars, functions: FunctionTable) -> Self {
        Self {
            output: CALL_STACK_LIMIT_ERROR.to_string(),
            vars,
            functions,
            returned: false,
        }
    }
}

#[derive(Debug)]
enum FrameKind {
    Root,
    /// Opened by `{{`, closed by `}}`.
    Macro,
    /// Opened by `{#`, closed by `#}`.
    LegacyBlock,
    Block(BlockFrame),
    /// A block opened inside a pure region. Its buffer starts with the opener.
    Ignored,
}

#[derive(Debug)]
struct Frame {
    buffer: String,
    kind: FrameKind,
    pure: bool,
}

impl Frame {
    fn new(kind: FrameKind) -> Self {
        Self { buffer: String::new(), kind, pure: false }
    }

    /// The frame's text with its opening delimiter restored.
    fn into_literal(self) -> String {
        match self.kind {
            FrameKind::Root | FrameKind::Ignored => self.buffer,
            FrameKind::Macro => format!("{{{{{}", self.buffer),
            FrameKind::LegacyBlock => format!("{{#{}", self.buffer),
            FrameKind::Block(block) => format!("{{{{{}}}}}{}", block.header, self.buffer),
        }
    }
}

pub(crate) struct Session<'e, C: ChatBridge + 'static> {
    engine: &'e Engine<C>,
    bridge: &'e C,
    visualize: bool,
    tokenize_accurate: bool,
    depth: u8,
    input: Vec<char>,
    pos: usize,
    frames: Vec<Frame>,
    vars: TempVars,
    functions: FunctionTable,
}

impl<'e, C: ChatBridge + 'static> Session<'e, C> {
    pub(crate) fn new(engine: &'e Engine<C>, text: &str, context: EvaluationContext<'e, C>) -> Self {
        Self {
            engine,
            bridge: context.bridge,
            visualize: context.visualize,
            tokenize_accurate: context.tokenize_accurate,
            depth: context.depth,
            input: text.chars().collect(),
            pos: 0,
            frames: vec![Frame::new(FrameKind::Root)],
            vars: context.vars,
            functions: context.functions,
        }
    }

    pub(crate) fn run(mut self) -> Evaluation {
        while self.pos < self.input.len() {
            let c = self.input[self.pos];
            let next = self.input.get(self.pos + 1).copied();

            match (c, next) {
                ('{', Some('{')) => {
                    self.pos += 2;
                    self.frames.push(Frame::new(FrameKind::Macro));
                }
                ('{', Some('#')) => {
                    self.pos += 2;
                    self.frames.push(Frame::new(FrameKind::LegacyBlock));
                }
                ('#', Some('}')) if matches!(self.top().kind, FrameKind::LegacyBlock) => {
                    self.pos += 2;
                    self.close_legacy_block();
                }
                ('}', Some('}')) if matches!(self.top().kind, FrameKind::Macro) => {
                    self.pos += 2;
                    if let Some(value) = self.close_macro() {
                        debug!("Evaluation returned early at depth {}", self.depth);
                        return self.finish(value, true);
                    }
                }
                _ => {
                    self.pos += 1;
                    self.top_mut().buffer.push(c);
                }
            }
        }

        while self.frames.len() > 1 {
            if let Some(frame) = self.frames.pop() {
                trace!("Re-emitting unclosed frame {:?}", frame.kind);
                let literal = frame.into_literal();
                self.top_mut().buffer.push_str(&literal);
            }
        }
        let output = self.frames.pop().map(|root| root.buffer).unwrap_or_default();
        self.finish(output, false)
    }

    fn finish(self, output: String, returned: bool) -> Evaluation {
        Evaluation { output, vars: self.vars, functions: self.functions, returned }
    }

    fn top(&self) -> &Frame {
        // the root frame is only removed once the scan is over
        &self.frames[self.frames.len() - 1]
    }

    fn top_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn emit(&mut self, text: &str) {
        self.top_mut().buffer.push_str(text);
    }

    fn emit_macro_literal(&mut self, captured: &str) {
        let literal = format!("{{{{{}}}}}", captured);
        self.emit(&literal);
    }

    fn in_pure_mode(&self) -> bool {
        self.frames.iter().any(|frame| frame.pure)
    }

    fn pop_frame(&mut self) -> Frame {
        match self.frames.pop() {
            Some(frame) => frame,
            None => Frame::new(FrameKind::Root),
        }
    }

    /// Handles `#}` for a frame opened by `{#`.
    fn close_legacy_block(&mut self) {
        let frame = self.pop_frame();
        if self.in_pure_mode() {
            let literal = format!("{{#{}#}}", frame.buffer);
            self.emit(&literal);
            return;
        }
        match legacy_block(&frame.buffer) {
            Some(result) => self.emit(&result),
            None => {
                let literal = format!("{{#{}#}}", frame.buffer);
                self.emit(&literal);
            }
        }
    }

    /// Handles `}}` for a frame opened by `{{`. Returns the payload of a
    /// `return` macro, which ends the scan.
    fn close_macro(&mut self) -> Option<String> {
        let captured = self.pop_frame().buffer;

        if captured.starts_with('#') {
            self.open_block(&captured);
            return None;
        }
        if captured.starts_with('/') && !captured.starts_with("//") {
            self.close_block(&captured);
            return None;
        }
        if captured.trim() == ":else" && self.try_else() {
            return None;
        }
        if self.in_pure_mode() {
            self.emit_macro_literal(&captured);
            return None;
        }
        if let Some(call) = captured.strip_prefix("call::") {
            self.call_function(&captured, call);
            return None;
        }
        self.dispatch(&captured)
    }

    fn open_block(&mut self, header: &str) {
        if self.in_pure_mode() {
            trace!("Ignoring nested block '{}' inside pure region", header);
            let mut frame = Frame::new(FrameKind::Ignored);
            frame.buffer = format!("{{{{{}}}}}", header);
            self.frames.push(frame);
            return;
        }

        match classify(header, self.engine.conditions(), self.bridge) {
            Some(kind) => {
                trace!("Opening block {:?}", kind);
                let pure = kind.enters_pure_mode();
                let mut frame = Frame::new(FrameKind::Block(BlockFrame::new(kind, header)));
                frame.pure = pure;
                self.frames.push(frame);
            }
            None => self.emit_macro_literal(header),
        }
    }

    fn close_block(&mut self, closer: &str) {
        if matches!(self.top().kind, FrameKind::Ignored) {
            let frame = self.pop_frame();
            self.emit(&frame.buffer);
            self.emit_macro_literal(closer);
            return;
        }
        if !matches!(self.top().kind, FrameKind::Block(_)) {
            self.emit_macro_literal(closer);
            return;
        }

        let frame = self.pop_frame();
        let FrameKind::Block(block) = frame.kind else {
            return;
        };
        trace!("Closing block {:?}", block.kind);
        match finalize(block, frame.buffer) {
            Finalized::Append(text) => self.emit(&text),
            Finalized::Splice(text) => {
                self.input.splice(self.pos..self.pos, text.chars());
            }
            Finalized::Define { name, definition } => {
                self.functions.define(name, definition);
            }
        }
    }

    /// Splits the innermost conditional at `{{:else}}`. Returns false when the
    /// marker is not directly inside a conditional block.
    fn try_else(&mut self) -> bool {
        let frame = self.top_mut();
        let FrameKind::Block(block) = &mut frame.kind else {
            return false;
        };
        if !block.is_conditional() || block.else_at.is_some() {
            return false;
        }
        block.else_at = Some(frame.buffer.len());
        frame.buffer.push_str(ELSE_MARKER);
        frame.pure = !frame.pure;
        true
    }

    fn call_function(&mut self, captured: &str, call: &str) {
        let mut parts = call.split("::");
        let name = parts.next().unwrap_or_default().trim();
        let args: Vec<&str> = parts.collect();

        let Some(definition) = self.functions.get(name).cloned() else {
            trace!("call:: to undefined function '{}'", name);
            self.emit_macro_literal(captured);
            return;
        };
        if self.depth >= self.engine.config().call_depth_limit {
            warn!("Call stack limit reached calling '{}' at depth {}", name, self.depth);
            self.emit(CALL_STACK_LIMIT_ERROR);
            return;
        }

        let body = definition.bind(&args);
        let context = EvaluationContext::new(self.bridge)
            .visualize(self.visualize)
            .tokenize_accurate(self.tokenize_accurate)
            .with_vars(mem::take(&mut self.vars))
            .with_functions(mem::take(&mut self.functions))
            .at_depth(self.depth + 1);
        let result = Session::new(self.engine, &body, context).run();

        self.vars = result.vars;
        self.functions = result.functions;
        self.emit(&result.output);
    }

    fn dispatch(&mut self, captured: &str) -> Option<String> {
        let output = {
            let ctx = MacroContext {
                engine: self.engine,
                bridge: self.bridge,
                functions: &self.functions,
                visualize: self.visualize,
                tokenize_accurate: self.tokenize_accurate,
                depth: self.depth,
            };
            self.engine.registry().dispatch(captured, &ctx, &self.vars)
        };

        match output {
            MacroOutput::Text(text) => self.emit(&text),
            MacroOutput::WithVars { text, vars } => {
                self.emit(&text);
                self.vars = vars;
            }
            MacroOutput::Unrecognized => self.emit_macro_literal(captured),
            MacroOutput::Return(value) => {
                return Some(value.unwrap_or_else(|| RETURN_NULL.to_string()));
            }
        }
        None
    }
}

/// `{#if <cond>\n<content>#}`: the trimmed content, or nothing when the
/// condition is empty, `0` or `-1`. `None` when the text is not this form.
fn legacy_block(text: &str) -> Option<String> {
    let (logic, content) = text.split_once('\n')?;
    let (keyword, condition) = logic.split_once(' ').unwrap_or((logic, ""));
    match keyword {
        "if" => {
            if matches!(condition.trim(), "" | "0" | "-1") {
                Some(String::new())
            } else {
                Some(content.trim().to_string())
            }
        }
        _ => None,
    }
}
