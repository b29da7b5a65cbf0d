//! Suspension points and the resumption dispatch.
//!
//! Only context-allocated variables survive a suspension. The stack-only
//! handler state (the contexts saved on try entry and the raw exception
//! pair) is rebuilt in each dispatch arm from the restored context.

use flint_ir::{ConstValue, Cursor, TokenPos};
use flint_scope::{names, PerDepth, Storage};
use tracing::debug;

use super::{BuildResult, FlowBuilder, ResumePoint, TryFrame};
use crate::ir::{InstrId, Op};
use crate::{Fragment, NodeId};

impl FlowBuilder<'_, '_> {
    /// `yield value`: record the resumption index and context, return the
    /// value, and continue at a fresh continuation on resumption.
    pub(super) fn yield_statement(
        &mut self,
        body: Fragment,
        c: &mut Cursor<'_>,
    ) -> BuildResult<Fragment> {
        let pos = c.read_position()?;
        c.read_byte()?;
        let (body, value) = self.visit_value(body, c)?;
        let jump = self.synthetic(self.scopes.synthetic.await_jump, names::AWAIT_JUMP)?;
        let saved = self.synthetic(self.scopes.synthetic.await_context, names::AWAIT_CONTEXT)?;

        let resume = self.graph.target();
        let index = self.graph.add_continuation(resume);
        let point = ResumePoint {
            context_level: self.context_level,
            tries: self.enclosing_tries(),
            catches: self.depth.catches,
        };
        self.resume_points.push(point);
        let id = self.unit.pool().intern(ConstValue::Int(i64::from(index)));
        let (body, index_value) = self.constant(body, id, pos)?;
        let body = self.store(body, jump, index_value, pos)?;
        let (body, context) = self.emit(body, Op::CurrentContext, pos)?;
        let body = self.store(body, saved, context, pos)?;
        let suspended = self.graph.ret(body, value)?;

        let resumed = self.check_resumed_with_error(Fragment::at(resume), pos)?;
        Ok(Fragment {
            entry: suspended.entry,
            current: resumed.current,
        })
    }

    /// A yielding closure resumed with an exception rethrows it at the
    /// suspension point.
    fn check_resumed_with_error(&mut self, body: Fragment, pos: TokenPos) -> BuildResult<Fragment> {
        let Some(exception) = self.scopes.synthetic.async_exception else {
            return Ok(body);
        };
        let (body, value) = self.load(body, exception, pos)?;
        let (body, is_null) = self.emit(body, Op::IsNull(value), pos)?;
        let (resumed, failed) = (self.graph.target(), self.graph.target());
        let head = self.graph.branch(body, is_null, resumed, failed)?;

        let (failed, value) = self.load(Fragment::at(failed), exception, pos)?;
        let (failed, stack_trace) = match self.scopes.synthetic.async_stack_trace {
            Some(var) => self.load(failed, var, pos)?,
            None => self.null(failed, pos)?,
        };
        self.graph.rethrow(failed, value, stack_trace)?;
        Ok(Fragment {
            entry: head.entry,
            current: Some(resumed),
        })
    }

    /// Tries whose bodies enclose the current node, innermost first.
    fn enclosing_tries(&self) -> Vec<TryFrame> {
        let mut tries = Vec::new();
        let mut handler = self.graph.try_index();
        while let Some(index) = handler {
            if let Some(frame) = self.try_frames.get(index as usize) {
                tries.push(*frame);
            }
            handler = self.graph.handler_outer(index);
        }
        tries
    }

    /// Close the prologue: resumption `n` jumps to the `n`th continuation
    /// after restoring its context; anything else starts the body.
    pub(super) fn dispatch(&mut self, prologue: Fragment, start: NodeId) -> BuildResult<()> {
        let continuations: Vec<NodeId> = self.graph.continuations().collect();
        if continuations.is_empty() {
            self.graph.goto(prologue, start)?;
            return Ok(());
        }
        debug!(count = continuations.len(), "resumption dispatch");

        let pos = TokenPos::NO_SOURCE;
        let jump = self.synthetic(self.scopes.synthetic.await_jump, names::AWAIT_JUMP)?;
        let saved = self.synthetic(self.scopes.synthetic.await_context, names::AWAIT_CONTEXT)?;
        let points = std::mem::take(&mut self.resume_points);
        let (mut test, state) = self.load(prologue, jump, pos)?;
        for ((index, resume), point) in (1u32..).zip(continuations).zip(points) {
            let id = self.unit.pool().intern(ConstValue::Int(i64::from(index)));
            let (next, expected) = self.constant(test, id, pos)?;
            let op = Op::Equals {
                left: state,
                right: expected,
            };
            let (next, hit) = self.emit(next, op, pos)?;
            let (then_node, else_node) = (self.graph.target(), self.graph.target());
            self.graph.branch(next, hit, then_node, else_node)?;

            let (restore, context) = self.load(Fragment::at(then_node), saved, pos)?;
            let (restore, _) = self.emit(restore, Op::SetContext(context), pos)?;
            let level = self.context_level;
            self.context_level = point.context_level;
            let restore = self.restore_handler_state(restore, context, &point);
            self.context_level = level;
            self.graph.goto(restore?, resume)?;
            test = Fragment::at(else_node);
        }
        self.graph.goto(test, start)?;
        Ok(())
    }

    /// Rebuild the handler state of `point` once `context` is current again.
    fn restore_handler_state(
        &mut self,
        mut body: Fragment,
        context: InstrId,
        point: &ResumePoint,
    ) -> BuildResult<Fragment> {
        let pos = TokenPos::NO_SOURCE;
        let scopes = self.scopes;
        for depth in 1..=point.catches {
            for (alias, raw) in [
                (PerDepth::Exception, PerDepth::RawException),
                (PerDepth::StackTrace, PerDepth::RawStackTrace),
            ] {
                let alias = scopes.synthetic.at_depth(alias, depth);
                let raw = scopes.synthetic.at_depth(raw, depth);
                let (Some(alias), Some(raw)) = (alias, raw) else {
                    continue;
                };
                // A stack-only alias was lost with the raw value.
                if !matches!(scopes.variable(alias).storage, Storage::Context { .. }) {
                    continue;
                }
                let (next, value) = self.load(body, alias, pos)?;
                body = self.store(next, raw, value, pos)?;
            }
        }

        let mut level = point.context_level;
        for frame in &point.tries {
            while level > frame.context_level {
                body = self.emit(body, Op::ExitContext, pos)?.0;
                level -= 1;
            }
            let (next, current) = self.emit(body, Op::CurrentContext, pos)?;
            body = self.store(next, frame.saved, current, pos)?;
        }
        if level != point.context_level {
            body = self.emit(body, Op::SetContext(context), pos)?.0;
        }
        Ok(body)
    }
}
