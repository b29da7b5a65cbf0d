//! `try`/`catch` and `try`/`finally`.
//!
//! A try body runs under a handler index; its catch entry restores the
//! context saved before the body and parks the exception pair in the
//! per-depth variables. Finalizers are inlined on every exit: once on the
//! normal path, once in the catch-all handler, and once per `return`,
//! `break` or `continue` leaving the body.

use flint_ir::{Cursor, ResolvedType, SourceError, SourceErrorKind, TokenPos};
use flint_scope::PerDepth;
use tracing::debug;

use super::{BuildResult, FinallyEntry, FlowBuilder, TryFrame};
use crate::ir::Op;
use crate::{Fragment, NodeId};

impl FlowBuilder<'_, '_> {
    /// Save the current context for the handler at try depth `tries`, and
    /// register that handler.
    fn open_try(&mut self, body: Fragment, tries: u32) -> BuildResult<(Fragment, u32)> {
        let saved = self.at_depth(PerDepth::SavedTryContext, tries)?;
        let (body, context) = self.emit(body, Op::CurrentContext, TokenPos::NO_SOURCE)?;
        let body = self.store(body, saved, context, TokenPos::NO_SOURCE)?;
        let handler = self.graph.add_handler(self.graph.try_index());
        self.try_frames.push(TryFrame {
            saved,
            context_level: self.context_level,
        });
        Ok((body, handler))
    }

    /// Start of a handler: restore the context of the try at `tries` and
    /// store the caught pair for catch depth `catches`.
    fn enter_handler(&mut self, body: Fragment, tries: u32, catches: u32) -> BuildResult<Fragment> {
        let pos = TokenPos::NO_SOURCE;
        let saved = self.at_depth(PerDepth::SavedTryContext, tries)?;
        let (body, context) = self.load(body, saved, pos)?;
        let (body, _) = self.emit(body, Op::SetContext(context), pos)?;

        let (mut body, exception) = self.emit(body, Op::LoadException, pos)?;
        for kind in [PerDepth::RawException, PerDepth::Exception] {
            let var = self.at_depth(kind, catches)?;
            body = self.store(body, var, exception, pos)?;
        }
        let (mut body, stack_trace) = self.emit(body, Op::LoadStackTrace, pos)?;
        for kind in [PerDepth::RawStackTrace, PerDepth::StackTrace] {
            let var = self.at_depth(kind, catches)?;
            body = self.store(body, var, stack_trace, pos)?;
        }
        Ok(body)
    }

    /// Run `body` of the try statement under `handler`, returning what it
    /// leaves open. Restores the enclosing try index.
    fn guarded<F>(
        &mut self,
        body: Fragment,
        handler: u32,
        visit: F,
    ) -> BuildResult<(Fragment, Fragment)>
    where
        F: FnOnce(&mut Self, Fragment) -> BuildResult<Fragment>,
    {
        let outer = self.graph.try_index();
        let start = self.graph.target_in(Some(handler));
        let head = self.graph.goto(body, start)?;
        self.graph.set_try_index(Some(handler));
        let inner = visit(self, Fragment::at(start));
        self.graph.set_try_index(outer);
        Ok((head, inner?))
    }

    pub(super) fn try_catch(&mut self, body: Fragment, c: &mut Cursor<'_>) -> BuildResult<Fragment> {
        let level = self.context_level;
        self.depth.tries += 1;
        let tries = self.depth.tries;
        let guarded = self.open_try(body, tries).and_then(|(body, handler)| {
            let (head, inner) =
                self.guarded(body, handler, |this, start| this.visit_statement(start, c))?;
            Ok((head, inner, handler))
        });
        self.depth.tries -= 1;
        let (head, inner, handler) = guarded?;
        self.context_level = level;

        let mut after = None;
        if inner.is_open() {
            let join = *after.get_or_insert_with(|| self.graph.target());
            self.graph.goto(inner, join)?;
        }
        c.read_byte()?;

        let catch_entry = self.graph.target();
        self.graph.set_handler_entry(handler, catch_entry)?;
        self.depth.catches += 1;
        let result = self
            .enter_handler(Fragment::at(catch_entry), tries, self.depth.catches)
            .and_then(|handling| self.catch_clauses(handling, c, &mut after));
        self.depth.catches -= 1;
        self.context_level = level;
        result?;

        Ok(Fragment {
            entry: head.entry,
            current: after,
        })
    }

    /// Test the clauses in order; an exception no clause matches is
    /// rethrown.
    fn catch_clauses(
        &mut self,
        mut test: Fragment,
        c: &mut Cursor<'_>,
        after: &mut Option<NodeId>,
    ) -> BuildResult<()> {
        let depth = self.depth.catches;
        let exception = self.at_depth(PerDepth::Exception, depth)?;
        let stack_trace = self.at_depth(PerDepth::StackTrace, depth)?;

        let len = c.read_list_length()?;
        let mut catch_all = false;
        for _ in 0..len {
            if catch_all {
                c.skip_catch()?;
                continue;
            }
            let node = c.node_ref();
            let pos = c.read_position()?;
            let guard = self.translator.translate(c)?;
            let (clause, next) = match guard {
                ResolvedType::Malformed(message) => {
                    // Nothing gets past a guard that cannot be tested.
                    let error = SourceError::new(pos, SourceErrorKind::MalformedType(message));
                    self.throw_error(test, error)?;
                    c.skip_option_variable_declaration()?;
                    c.skip_option_variable_declaration()?;
                    c.skip_statement()?;
                    catch_all = true;
                    continue;
                }
                guard if guard.is_top() => {
                    catch_all = true;
                    (test, None)
                }
                guard => {
                    let (body, value) = self.load(test, exception, pos)?;
                    let op = Op::InstanceOf { value, ty: guard };
                    let (body, matches) = self.emit(body, op, pos)?;
                    let (yes, no) = (self.graph.target(), self.graph.target());
                    self.graph.branch(body, matches, yes, no)?;
                    (Fragment::at(yes), Some(Fragment::at(no)))
                }
            };

            let level = self.context_level;
            let (mut clause, saved) = self.enter_scope(clause, node, pos)?;
            for var in [exception, stack_trace] {
                if c.read_option()? {
                    let (body, value) = self.load(clause, var, pos)?;
                    clause = self.bind_variable(body, c, value)?;
                }
            }
            let clause = self.visit_statement(clause, c)?;
            let clause = self.exit_scope(clause, saved)?;
            self.context_level = level;
            if clause.is_open() {
                let join = *after.get_or_insert_with(|| self.graph.target());
                self.graph.goto(clause, join)?;
            }
            if let Some(next) = next {
                test = next;
            }
        }

        if !catch_all {
            let raw_exception = self.at_depth(PerDepth::RawException, depth)?;
            let raw_stack_trace = self.at_depth(PerDepth::RawStackTrace, depth)?;
            self.rethrow_vars(test, raw_exception, raw_stack_trace, TokenPos::NO_SOURCE)?;
        }
        Ok(())
    }

    pub(super) fn try_finally(&mut self, body: Fragment, c: &mut Cursor<'_>) -> BuildResult<Fragment> {
        let depth = self.depth;
        let level = self.context_level;
        let outer = self.graph.try_index();

        let try_body = c.node_ref();
        c.skip_statement()?;
        let entry = FinallyEntry {
            finalizer: c.node_ref(),
            outer_try: outer,
            context_level: level,
            depth,
            labels: self.labels.len(),
            switch_cases: self.switch_cases.len(),
        };
        c.skip_statement()?;

        self.depth.tries += 1;
        self.finally_stack.push(entry);
        let guarded = self.open_try(body, depth.tries + 1).and_then(|(body, handler)| {
            let (head, inner) = self.guarded(body, handler, |this, start| {
                c.with_alternate_position(try_body, |c| this.visit_statement(start, c))
            })?;
            Ok((head, inner, handler))
        });
        self.finally_stack.pop();
        self.depth.tries -= 1;
        let (head, inner, handler) = guarded?;
        self.context_level = level;

        let index = self.finally_stack.len();
        let normal = if inner.is_open() {
            let normal = self.inline_finalizer(inner, entry, index)?;
            self.graph.set_try_index(outer);
            normal
        } else {
            inner
        };
        self.context_level = level;

        let catch_entry = self.graph.target();
        self.graph.set_handler_entry(handler, catch_entry)?;
        let catches = depth.catches + 1;
        let handling = self.enter_handler(Fragment::at(catch_entry), depth.tries + 1, catches)?;
        let handling = self.inline_finalizer(handling, entry, index)?;
        self.graph.set_try_index(outer);
        self.context_level = level;
        if handling.is_open() {
            let exception = self.at_depth(PerDepth::RawException, catches)?;
            let stack_trace = self.at_depth(PerDepth::RawStackTrace, catches)?;
            self.rethrow_vars(handling, exception, stack_trace, TokenPos::NO_SOURCE)?;
        } else {
            debug!(handler, "finalizer never completes normally");
        }

        Ok(Fragment {
            entry: head.entry,
            current: normal.current,
        })
    }
}
