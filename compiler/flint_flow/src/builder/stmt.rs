//! Statement arms. Statements leave the value stack as they found it.

use flint_ir::tag::Tag;
use flint_ir::{Cursor, IrError, NodeRef, SourceError, SourceErrorKind, TokenPos};
use flint_scope::{names, PerDepth, VarId};
use flint_stack::ensure_sufficient_stack;
use tracing::trace;

use super::{BuildResult, FlowBuilder};
use crate::ir::{InstrId, Op};
use crate::{BuildError, Fragment, NodeId};

/// A switch case, located but not yet visited.
struct SwitchCase {
    /// Position and offset of each case expression.
    expressions: Vec<(TokenPos, NodeRef)>,
    is_default: bool,
    body: NodeRef,
}

impl FlowBuilder<'_, '_> {
    pub(super) fn visit_statement(
        &mut self,
        body: Fragment,
        c: &mut Cursor<'_>,
    ) -> BuildResult<Fragment> {
        ensure_sufficient_stack(|| self.visit_statement_inner(body, c))
    }

    fn visit_statement_inner(&mut self, body: Fragment, c: &mut Cursor<'_>) -> BuildResult<Fragment> {
        let node = c.node_ref();
        let offset = c.offset();
        let tag = c.read_tag()?;
        match tag {
            Tag::InvalidStatement => {
                let kind = SourceErrorKind::InvalidExpression("invalid statement".to_owned());
                self.throw_error(body, SourceError::new(TokenPos::NO_SOURCE, kind))
            }
            Tag::EmptyStatement => Ok(body),
            Tag::ExpressionStatement => Ok(self.visit_value(body, c)?.0),
            Tag::Block => {
                let begin = c.read_position()?;
                c.skip_position()?;
                let (mut body, saved) = self.enter_scope(body, node, begin)?;
                let len = c.read_list_length()?;
                for _ in 0..len {
                    if body.is_closed() {
                        c.skip_statement()?;
                    } else {
                        body = self.visit_statement(body, c)?;
                    }
                }
                self.exit_scope(body, saved)
            }
            Tag::AssertStatement => self.assert_statement(body, c),
            Tag::LabeledStatement => {
                let target = self.jump_target();
                self.labels.push(target);
                let inner = self.visit_statement(body, c);
                let label = self.labels.pop();
                let inner = inner?;
                match label.and_then(|label| label.node) {
                    Some(node) => {
                        let inner = if inner.is_open() {
                            self.graph.goto(inner, node)?
                        } else {
                            inner
                        };
                        Ok(Fragment {
                            entry: inner.entry,
                            current: Some(node),
                        })
                    }
                    None => Ok(inner),
                }
            }
            Tag::BreakStatement => {
                c.skip_position()?;
                let index = c.read_uint()?;
                let slot = self
                    .labels
                    .get_mut(index as usize)
                    .ok_or(BuildError::UnknownLabel(index))?;
                let node = Self::resolve_target(&mut self.graph, slot);
                let target = *slot;
                self.jump(body, target, node)
            }
            Tag::ContinueSwitchStatement => {
                c.skip_position()?;
                let index = c.read_uint()?;
                let slot = self
                    .switch_cases
                    .get_mut(index as usize)
                    .ok_or(BuildError::UnknownCase(index))?;
                let node = Self::resolve_target(&mut self.graph, slot);
                let target = *slot;
                self.jump(body, target, node)
            }
            Tag::WhileStatement => {
                let pos = c.read_position()?;
                self.depth.loops += 1;
                let result = self.while_loop(body, c, pos);
                self.depth.loops -= 1;
                result
            }
            Tag::DoStatement => {
                let pos = c.read_position()?;
                self.depth.loops += 1;
                let result = self.do_loop(body, c, pos);
                self.depth.loops -= 1;
                result
            }
            Tag::ForStatement => {
                let pos = c.read_position()?;
                self.depth.loops += 1;
                let result = self.for_loop(body, c, node, pos);
                self.depth.loops -= 1;
                result
            }
            Tag::ForInStatement => self.for_in_loop(body, c, node),
            Tag::SwitchStatement => self.switch_statement(body, c, node),
            Tag::IfStatement => {
                c.skip_position()?;
                let (body, cond) = self.visit_value(body, c)?;
                let (then_node, else_node) = (self.graph.target(), self.graph.target());
                let head = self.graph.branch(body, cond, then_node, else_node)?;
                let then_arm = self.visit_statement(Fragment::at(then_node), c)?;
                let else_arm = self.visit_statement(Fragment::at(else_node), c)?;
                Ok(Fragment {
                    entry: head.entry,
                    current: self.graph.converge(&[then_arm, else_arm])?,
                })
            }
            Tag::ReturnStatement => {
                let pos = c.read_position()?;
                let (body, value) = if c.read_option()? {
                    self.visit_value(body, c)?
                } else {
                    self.null(body, pos)?
                };
                self.return_value(body, value, pos)
            }
            Tag::TryCatch => self.try_catch(body, c),
            Tag::TryFinally => self.try_finally(body, c),
            Tag::YieldStatement => self.yield_statement(body, c),
            Tag::VariableDeclaration => self.visit_variable_declaration(body, c),
            Tag::FunctionDeclaration => {
                let pos = c.read_position()?;
                let head = c.read_variable_head()?;
                let var = self.lookup(head.offset)?;
                c.skip_variable_tail()?;
                let function = c.node_ref();
                c.skip_function_node()?;
                let (body, closure) = self.emit(body, Op::AllocateClosure { function }, pos)?;
                self.store(body, var, closure, pos)
            }
            other => Err(IrError::unexpected(offset, other, "statement").into()),
        }
    }

    fn assert_statement(&mut self, body: Fragment, c: &mut Cursor<'_>) -> BuildResult<Fragment> {
        if !self.options.enable_asserts {
            c.skip_expression()?;
            c.skip_position()?;
            c.skip_position()?;
            c.skip_option_expression()?;
            return Ok(body);
        }
        let (body, cond) = self.visit_value(body, c)?;
        let start = c.read_position()?;
        let end = c.read_position()?;
        let (ok, fail) = (self.graph.target(), self.graph.target());
        let head = self.graph.branch(body, cond, ok, fail)?;
        let (failing, message) = if c.read_option()? {
            let (failing, message) = self.visit_value(Fragment::at(fail), c)?;
            (failing, Some(message))
        } else {
            (Fragment::at(fail), None)
        };
        let op = Op::AssertionError {
            message,
            start,
            end,
        };
        let (failing, error) = self.emit(failing, op, start)?;
        self.graph.throw(failing, error)?;
        Ok(Fragment {
            entry: head.entry,
            current: Some(ok),
        })
    }

    pub(super) fn return_value(
        &mut self,
        body: Fragment,
        value: InstrId,
        pos: TokenPos,
    ) -> BuildResult<Fragment> {
        if self.finally_stack.is_empty() {
            return Ok(self.graph.ret(body, value)?);
        }
        // The finalizers may overwrite anything but this slot.
        let var = self.synthetic(self.scopes.synthetic.finally_return, names::FINALLY_RETURN)?;
        let body = self.store(body, var, value, pos)?;
        let (level, try_index) = (self.context_level, self.graph.try_index());
        let result = self.run_finalizers(body, 0).and_then(|body| {
            if body.is_closed() {
                return Ok(body);
            }
            let (body, value) = self.load(body, var, pos)?;
            Ok(self.graph.ret(body, value)?)
        });
        self.context_level = level;
        self.graph.set_try_index(try_index);
        result
    }

    // ── Declarations ────────────────────────────────────────────

    /// Initialize the untagged variable declaration at the cursor.
    ///
    /// Const locals take the value the scope walk folded.
    pub(super) fn visit_variable_declaration(
        &mut self,
        body: Fragment,
        c: &mut Cursor<'_>,
    ) -> BuildResult<Fragment> {
        let head = c.read_variable_head()?;
        let var = self.lookup(head.offset)?;
        c.skip_type()?;
        let folded = if head.is_const() {
            self.scopes.variable(var).const_value
        } else {
            None
        };
        let (body, value) = match folded {
            Some(id) => {
                c.skip_option_expression()?;
                self.constant(body, id, head.pos)?
            }
            None if c.read_option()? => self.visit_value(body, c)?,
            None => self.null(body, head.pos)?,
        };
        self.store(body, var, value, head.pos)
    }

    /// Bind the declaration at the cursor to `value`, ignoring its
    /// initializer.
    pub(super) fn bind_variable(
        &mut self,
        body: Fragment,
        c: &mut Cursor<'_>,
        value: InstrId,
    ) -> BuildResult<Fragment> {
        let head = c.read_variable_head()?;
        let var = self.lookup(head.offset)?;
        c.skip_variable_tail()?;
        self.store(body, var, value, head.pos)
    }

    // ── Loops ───────────────────────────────────────────────────

    /// A loop header: a block entry starting with the stack check.
    fn loop_header(&mut self, pos: TokenPos) -> BuildResult<(NodeId, Fragment)> {
        let header = self.graph.target();
        let top = self.stack_check(Fragment::at(header), pos)?;
        Ok((header, top))
    }

    fn while_loop(
        &mut self,
        body: Fragment,
        c: &mut Cursor<'_>,
        pos: TokenPos,
    ) -> BuildResult<Fragment> {
        let (header, top) = self.loop_header(pos)?;
        let entry = self.graph.goto(body, header)?;
        let (top, cond) = self.visit_value(top, c)?;
        let (inner, exit) = (self.graph.target(), self.graph.target());
        self.graph.branch(top, cond, inner, exit)?;
        let inner = self.visit_statement(Fragment::at(inner), c)?;
        if inner.is_open() {
            self.graph.goto(inner, header)?;
        }
        Ok(Fragment {
            entry: entry.entry,
            current: Some(exit),
        })
    }

    fn do_loop(
        &mut self,
        body: Fragment,
        c: &mut Cursor<'_>,
        pos: TokenPos,
    ) -> BuildResult<Fragment> {
        let (header, top) = self.loop_header(pos)?;
        let entry = self.graph.goto(body, header)?;
        let inner = self.visit_statement(top, c)?;
        if inner.is_closed() {
            c.skip_expression()?;
            return Ok(entry);
        }
        let (inner, cond) = self.visit_value(inner, c)?;
        let exit = self.graph.target();
        self.graph.branch(inner, cond, header, exit)?;
        Ok(Fragment {
            entry: entry.entry,
            current: Some(exit),
        })
    }

    fn for_loop(
        &mut self,
        body: Fragment,
        c: &mut Cursor<'_>,
        node: NodeRef,
        pos: TokenPos,
    ) -> BuildResult<Fragment> {
        let (mut body, saved) = self.enter_scope(body, node, pos)?;
        let len = c.read_list_length()?;
        for _ in 0..len {
            body = self.visit_variable_declaration(body, c)?;
        }

        let (header, top) = self.loop_header(pos)?;
        let entry = self.graph.goto(body, header)?;
        let (top, exit) = if c.read_option()? {
            let (top, cond) = self.visit_value(top, c)?;
            let (inner, exit) = (self.graph.target(), self.graph.target());
            self.graph.branch(top, cond, inner, exit)?;
            (Fragment::at(inner), Some(exit))
        } else {
            (top, None)
        };
        let updates = c.node_ref();
        c.skip_list_of_expressions()?;

        let inner = self.visit_statement(top, c)?;
        if inner.is_open() {
            // Closures of this iteration keep their own copy of the loop
            // variables.
            let inner = if self.scopes.allocates_context(node) {
                trace!(%node, "loop context cloned per iteration");
                self.emit(inner, Op::CloneContext, pos)?.0
            } else {
                inner
            };
            let inner =
                c.with_alternate_position(updates, |c| self.visit_effects(inner, c))?;
            self.graph.goto(inner, header)?;
        }
        let result = Fragment {
            entry: entry.entry,
            current: exit,
        };
        self.exit_scope(result, saved)
    }

    /// Evaluate a list of expressions for their effects.
    fn visit_effects(&mut self, mut body: Fragment, c: &mut Cursor<'_>) -> BuildResult<Fragment> {
        let len = c.read_list_length()?;
        for _ in 0..len {
            body = self.visit_value(body, c)?.0;
        }
        Ok(body)
    }

    /// `for (v in iterable)` over the iterator protocol.
    fn for_in_loop(
        &mut self,
        body: Fragment,
        c: &mut Cursor<'_>,
        node: NodeRef,
    ) -> BuildResult<Fragment> {
        let pos = c.read_position()?;
        let body_pos = c.read_position()?;
        let decl = c.node_ref();
        c.skip_variable_declaration()?;
        let (body, iterable) = self.visit_value(body, c)?;

        self.depth.for_ins += 1;
        self.depth.loops += 1;
        let result = self.for_in_body(body, c, node, decl, iterable, (pos, body_pos));
        self.depth.loops -= 1;
        self.depth.for_ins -= 1;
        result
    }

    fn for_in_body(
        &mut self,
        body: Fragment,
        c: &mut Cursor<'_>,
        node: NodeRef,
        decl: NodeRef,
        iterable: InstrId,
        (pos, body_pos): (TokenPos, TokenPos),
    ) -> BuildResult<Fragment> {
        let iterator = self.at_depth(PerDepth::Iterator, self.depth.for_ins)?;
        let (body, it) = self.call_instance(body, "get:iterator", vec![iterable], pos)?;
        let body = self.store(body, iterator, it, pos)?;

        let (header, top) = self.loop_header(pos)?;
        let entry = self.graph.goto(body, header)?;
        let (top, it) = self.load(top, iterator, pos)?;
        let (top, more) = self.call_instance(top, "moveNext", vec![it], pos)?;
        let (inner, exit) = (self.graph.target(), self.graph.target());
        self.graph.branch(top, more, inner, exit)?;

        let (inner, saved) = self.enter_scope(Fragment::at(inner), node, body_pos)?;
        let (inner, it) = self.load(inner, iterator, body_pos)?;
        let (inner, current) = self.call_instance(inner, "get:current", vec![it], body_pos)?;
        let inner = c.with_alternate_position(decl, |c| self.bind_variable(inner, c, current))?;
        let inner = self.visit_statement(inner, c)?;
        let inner = self.exit_scope(inner, saved)?;
        if inner.is_open() {
            self.graph.goto(inner, header)?;
        }
        Ok(Fragment {
            entry: entry.entry,
            current: Some(exit),
        })
    }

    // ── Switch ──────────────────────────────────────────────────

    fn switch_statement(
        &mut self,
        body: Fragment,
        c: &mut Cursor<'_>,
        node: NodeRef,
    ) -> BuildResult<Fragment> {
        let pos = c.read_position()?;
        let (body, scrutinee) = self.visit_value(body, c)?;
        let var = self.synthetic(self.scopes.synthetic.switch_variable, names::SWITCH)?;
        let body = self.store(body, var, scrutinee, pos)?;
        let (body, saved) = self.enter_scope(body, node, pos)?;

        let len = c.read_list_length()?;
        let mut cases = Vec::with_capacity(len);
        for _ in 0..len {
            let count = c.read_list_length()?;
            let mut expressions = Vec::with_capacity(count);
            for _ in 0..count {
                expressions.push((c.read_position()?, c.node_ref()));
                c.skip_expression()?;
            }
            let is_default = c.read_bool()?;
            cases.push(SwitchCase {
                expressions,
                is_default,
                body: c.node_ref(),
            });
            c.skip_statement()?;
        }
        if cases.is_empty() {
            return self.exit_scope(body, saved);
        }

        let base = self.switch_cases.len();
        let mut bodies = Vec::with_capacity(cases.len());
        for _ in &cases {
            let mut target = self.jump_target();
            bodies.push(Self::resolve_target(&mut self.graph, &mut target));
            self.switch_cases.push(target);
        }
        let result = self.switch_cases_flow(body, c, var, &cases, &bodies, pos);
        self.switch_cases.truncate(base);
        let after = result?;
        self.exit_scope(
            Fragment {
                entry: body.entry,
                current: after,
            },
            saved,
        )
    }

    /// Tests in case order, then the bodies. Returns the node after the
    /// switch, if control reaches it.
    fn switch_cases_flow(
        &mut self,
        body: Fragment,
        c: &mut Cursor<'_>,
        var: VarId,
        cases: &[SwitchCase],
        bodies: &[NodeId],
        pos: TokenPos,
    ) -> BuildResult<Option<NodeId>> {
        let mut after = None;
        let mut chain = Some(body);
        for (i, case) in cases.iter().enumerate() {
            let Some(mut test) = chain.take() else {
                break;
            };
            if case.is_default {
                // Evaluated for their effects; the default matches anyway.
                for (_, expression) in &case.expressions {
                    test = self.value_at(test, c, *expression)?.0;
                }
                self.graph.goto(test, bodies[i])?;
                break;
            }
            let falls_to_default = cases
                .get(i + 1)
                .is_some_and(|next| next.is_default && next.expressions.is_empty());
            let last = case.expressions.len().saturating_sub(1);
            let mut ended = false;
            for (j, (expr_pos, expression)) in case.expressions.iter().enumerate() {
                let (next, value) = self.value_at(test, c, *expression)?;
                let (next, scrutinee) = self.load(next, var, *expr_pos)?;
                let (next, equal) = self.emit(
                    next,
                    Op::Equals {
                        left: value,
                        right: scrutinee,
                    },
                    *expr_pos,
                )?;
                let else_node = if j == last && falls_to_default {
                    ended = true;
                    bodies[i + 1]
                } else {
                    self.graph.target()
                };
                self.graph.branch(next, equal, bodies[i], else_node)?;
                test = Fragment::at(else_node);
            }
            if !ended {
                chain = Some(test);
            }
        }
        if let Some(open) = chain {
            let join = *after.get_or_insert_with(|| self.graph.target());
            self.graph.goto(open, join)?;
        }

        let last = cases.len() - 1;
        for (i, case) in cases.iter().enumerate() {
            let arm = c.with_alternate_position(case.body, |c| {
                self.visit_statement(Fragment::at(bodies[i]), c)
            })?;
            if arm.is_closed() {
                continue;
            }
            if i == last {
                let join = *after.get_or_insert_with(|| self.graph.target());
                self.graph.goto(arm, join)?;
            } else {
                let error = SourceError::new(pos, SourceErrorKind::SwitchFallThrough);
                self.throw_error(arm, error)?;
            }
        }
        Ok(after)
    }
}
