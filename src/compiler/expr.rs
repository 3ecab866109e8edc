//! Expression code generation: operator emission, list/map construction,
//! dispatch forms, catch expressions, index-marker contexts, and the
//! rebuild-from-the-root lowering of assignment targets.

use crate::ast::{
    Arg, BinaryOp, ExceptCodes, Expr, ExprKind, PropName, ScatterItem,
    ScatterKind, UnaryOp,
};
use crate::compiler::{CompileError, Compiler};
use crate::global::limits::JUMP_PLACEHOLDER;
use crate::global::opcodes::Opcode;
use crate::values::{objid, Var};

/// One level of an assignment target chain, outermost first.
enum Access<'a> {
    Prop(&'a PropName),
    Index(&'a Expr),
    Range(&'a Expr, &'a Expr),
}

/// Temporaries recorded while descending an assignment chain, consumed in
/// reverse while rebuilding.
enum Level {
    Index { coll: u8, index: u8 },
    Prop { coll: u8, old: u8, name: PropSpec },
}

enum PropSpec {
    Static(u8),
    /// Slot holding the evaluated dynamic name.
    Dynamic(u8),
}

impl<'a> Compiler<'a> {
    pub(crate) fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        self.note_line(expr.line);
        match &expr.kind {
            ExprKind::Literal(Var::Int(i)) => {
                self.emit_int(*i, expr.line);
                Ok(())
            }
            ExprKind::Literal(value) => {
                self.emit_push_const(value, expr.line);
                Ok(())
            }
            ExprKind::Id(name) => {
                let slot = self.slot(name, expr.line);
                self.emit_op(Opcode::PUSH_VAR);
                self.emit_u8(slot);
                Ok(())
            }
            ExprKind::SysProp(name) => {
                self.emit_push_const(&Var::Obj(objid::SYSTEM), expr.line);
                let index = self.const_ref(&Var::str(name), expr.line);
                self.emit_op(Opcode::GET_PROP);
                self.emit_u8(index);
                Ok(())
            }
            ExprKind::Prop { base, name } => {
                self.compile_expr(base)?;
                self.emit_prop_read(name, expr.line)
            }
            ExprKind::Verb { base, name, args } => {
                self.compile_expr(base)?;
                let name_operand = match name {
                    PropName::Static(n) => {
                        self.const_ref(&Var::str(n), expr.line)
                    }
                    PropName::Dynamic(e) => {
                        self.compile_expr(e)?;
                        0xFF
                    }
                };
                self.compile_list(args)?;
                self.emit_op(Opcode::CALL_VERB);
                self.emit_u8(name_operand);
                Ok(())
            }
            ExprKind::Call { func, args } => self.compile_call(expr.line, func, args),
            ExprKind::Pass { args } => {
                self.compile_list(args)?;
                self.emit_op(Opcode::PASS);
                Ok(())
            }
            ExprKind::Index { base, index } => {
                self.compile_expr(base)?;
                self.compile_index_expr(index)?;
                self.emit_op(Opcode::INDEX_GET);
                Ok(())
            }
            ExprKind::RangeIndex { base, from, to } => {
                self.compile_expr(base)?;
                self.compile_range_exprs(from, to)?;
                self.emit_op(Opcode::RANGE_GET);
                Ok(())
            }
            ExprKind::FirstMarker => {
                self.emit_marker(Opcode::MARK_FIRST);
                Ok(())
            }
            ExprKind::LastMarker => {
                self.emit_marker(Opcode::MARK_LAST);
                Ok(())
            }
            ExprKind::Assign { target, value } => {
                self.compile_assign(target, value)
            }
            ExprKind::Scatter { items, value } => {
                self.compile_scatter(expr.line, items, value)
            }
            ExprKind::Cond { cond, yes, no } => {
                self.compile_expr(cond)?;
                let other = self.emit_jump(Opcode::IF_FALSE_JUMP);
                self.compile_expr(yes)?;
                let done = self.emit_jump(Opcode::JUMP);
                self.patch_to_here(other);
                self.compile_expr(no)?;
                self.patch_to_here(done);
                Ok(())
            }
            ExprKind::And(left, right) => {
                self.compile_expr(left)?;
                let decided = self.emit_jump(Opcode::AND);
                self.compile_expr(right)?;
                self.patch_to_here(decided);
                Ok(())
            }
            ExprKind::Or(left, right) => {
                self.compile_expr(left)?;
                let decided = self.emit_jump(Opcode::OR);
                self.compile_expr(right)?;
                self.patch_to_here(decided);
                Ok(())
            }
            ExprKind::Binary { op, left, right } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit_op(binary_opcode(*op));
                Ok(())
            }
            ExprKind::Unary { op, operand } => {
                self.compile_expr(operand)?;
                self.emit_op(match op {
                    UnaryOp::Neg => Opcode::NEG,
                    UnaryOp::Not => Opcode::NOT,
                    UnaryOp::BitNot => Opcode::BIT_NOT,
                });
                Ok(())
            }
            ExprKind::Catch {
                expr: protected,
                codes,
                default,
            } => self.compile_catch(expr.line, protected, codes, default.as_deref()),
            ExprKind::List(args) => self.compile_list(args),
            ExprKind::RangeList { from, to } => {
                self.compile_expr(from)?;
                self.compile_expr(to)?;
                self.emit_op(Opcode::LIST_RANGE);
                Ok(())
            }
            ExprKind::Map(pairs) => {
                for (key, value) in pairs {
                    self.compile_expr(key)?;
                    self.compile_expr(value)?;
                }
                self.emit_op(Opcode::MAKE_MAP);
                self.emit_u16(pairs.len() as u16);
                Ok(())
            }
        }
    }

    fn emit_marker(&mut self, op: Opcode) {
        let slot = self.index_ctx.last().copied().unwrap_or(0);
        self.emit_op(op);
        self.emit_u8(slot);
    }

    fn emit_prop_read(
        &mut self,
        name: &PropName,
        line: usize,
    ) -> Result<(), CompileError> {
        match name {
            PropName::Static(n) => {
                let index = self.const_ref(&Var::str(n), line);
                self.emit_op(Opcode::GET_PROP);
                self.emit_u8(index);
            }
            PropName::Dynamic(e) => {
                self.compile_expr(e)?;
                self.emit_op(Opcode::GET_PROP);
                self.emit_u8(0xFF);
            }
        }
        Ok(())
    }

    /// Compile an index expression over the collection currently on the
    /// stack, arranging a marker context temp when `^`/`$` appear.
    fn compile_index_expr(&mut self, index: &Expr) -> Result<(), CompileError> {
        if uses_markers(index) {
            let ctx = self.temp(index.line);
            self.emit_op(Opcode::DUP);
            self.emit_op(Opcode::PUT_VAR);
            self.emit_u8(ctx);
            self.emit_op(Opcode::POP);
            self.index_ctx.push(ctx);
            let result = self.compile_expr(index);
            self.index_ctx.pop();
            result
        } else {
            self.compile_expr(index)
        }
    }

    fn compile_range_exprs(
        &mut self,
        from: &Expr,
        to: &Expr,
    ) -> Result<(), CompileError> {
        if uses_markers(from) || uses_markers(to) {
            let ctx = self.temp(from.line);
            self.emit_op(Opcode::DUP);
            self.emit_op(Opcode::PUT_VAR);
            self.emit_u8(ctx);
            self.emit_op(Opcode::POP);
            self.index_ctx.push(ctx);
            let result = self
                .compile_expr(from)
                .and_then(|()| self.compile_expr(to));
            self.index_ctx.pop();
            result
        } else {
            self.compile_expr(from)?;
            self.compile_expr(to)
        }
    }

    fn compile_call(
        &mut self,
        line: usize,
        func: &str,
        args: &[Arg],
    ) -> Result<(), CompileError> {
        let id = self.registry.id_of(func).ok_or_else(|| {
            CompileError::UnknownBuiltin {
                line,
                name: func.to_string(),
            }
        })?;
        let spliced = args.iter().any(|a| matches!(a, Arg::Splice(_)));
        if spliced || args.len() >= 0xFF {
            self.compile_list(args)?;
            self.emit_op(Opcode::CALL_BUILTIN);
            self.emit_u8(id);
            self.emit_u8(0xFF);
        } else {
            for arg in args {
                let Arg::Normal(e) = arg else { unreachable!() };
                self.compile_expr(e)?;
            }
            self.emit_op(Opcode::CALL_BUILTIN);
            self.emit_u8(id);
            self.emit_u8(args.len() as u8);
        }
        Ok(())
    }

    /// Build a list value from an argument vector, splicing `@` items.
    pub(crate) fn compile_list(&mut self, args: &[Arg]) -> Result<(), CompileError> {
        let plain_prefix = args
            .iter()
            .take_while(|a| matches!(a, Arg::Normal(_)))
            .count();
        for arg in &args[..plain_prefix] {
            let Arg::Normal(e) = arg else { unreachable!() };
            self.compile_expr(e)?;
        }
        self.emit_op(Opcode::MAKE_LIST);
        self.emit_u16(plain_prefix as u16);
        for arg in &args[plain_prefix..] {
            match arg {
                Arg::Normal(e) => {
                    self.compile_expr(e)?;
                    self.emit_op(Opcode::LIST_APPEND);
                }
                Arg::Splice(e) => {
                    self.compile_expr(e)?;
                    self.emit_op(Opcode::SPLICE);
                    self.emit_op(Opcode::LIST_EXTEND);
                }
            }
        }
        Ok(())
    }

    fn compile_catch(
        &mut self,
        line: usize,
        protected: &Expr,
        codes: &ExceptCodes,
        default: Option<&Expr>,
    ) -> Result<(), CompileError> {
        self.emit_op(Opcode::TRY_EXCEPT);
        self.emit_u8(1);
        self.emit_except_clause(line, codes, None)?;
        let handler_at = self.here();
        self.emit_u16(JUMP_PLACEHOLDER);
        self.compile_expr(protected)?;
        let done = self.emit_jump(Opcode::END_EXCEPT);
        self.patch_to_here(handler_at);
        match default {
            Some(default) => {
                // drop the exception list, produce the default
                self.emit_op(Opcode::POP);
                self.compile_expr(default)?;
            }
            None => {
                // no default: the caught error code itself
                self.emit_int(1, line);
                self.emit_op(Opcode::INDEX_GET);
            }
        }
        self.patch_to_here(done);
        Ok(())
    }

    // ---- assignment ----

    fn compile_assign(
        &mut self,
        target: &Expr,
        value: &Expr,
    ) -> Result<(), CompileError> {
        let line = target.line;
        // `$name` roots are property slots on the system object
        let desugared;
        let target = if has_sysprop_root(target) {
            desugared = desugar_sysprop_root(target.clone());
            &desugared
        } else {
            target
        };
        let (root, accessors) = unroll_target(target);

        // plain variable assignment needs no rebuild chain
        if accessors.is_empty() {
            let Root::Var(name) = root else {
                // the parser only lets lvalue shapes through
                unreachable!("assignment to a non-lvalue");
            };
            self.compile_expr(value)?;
            let slot = self.slot(name, line);
            self.emit_op(Opcode::PUT_VAR);
            self.emit_u8(slot);
            return Ok(());
        }

        // evaluate the assigned value once, into a temp
        self.compile_expr(value)?;
        let assigned = self.temp(line);
        self.emit_op(Opcode::PUT_VAR);
        self.emit_u8(assigned);
        self.emit_op(Opcode::POP);

        // root container
        let root_slot = match root {
            Root::Var(name) => {
                let slot = self.slot(name, line);
                self.emit_op(Opcode::PUSH_VAR);
                self.emit_u8(slot);
                Some(slot)
            }
            Root::Expr(e) => {
                self.compile_expr(e)?;
                None
            }
        };

        // descend through intermediate levels, saving rebuild state
        let mut levels = Vec::new();
        let (leaf, inner) = accessors.split_last().unwrap();
        for access in inner {
            match access {
                Access::Index(index) => {
                    let coll = self.temp(line);
                    self.emit_op(Opcode::DUP);
                    self.emit_op(Opcode::PUT_VAR);
                    self.emit_u8(coll);
                    self.emit_op(Opcode::POP);
                    self.index_ctx.push(coll);
                    let compiled = self.compile_expr(index);
                    self.index_ctx.pop();
                    compiled?;
                    let index_slot = self.temp(line);
                    self.emit_op(Opcode::PUT_VAR);
                    self.emit_u8(index_slot);
                    self.emit_op(Opcode::INDEX_GET);
                    levels.push(Level::Index {
                        coll,
                        index: index_slot,
                    });
                }
                Access::Prop(name) => {
                    let coll = self.temp(line);
                    self.emit_op(Opcode::DUP);
                    self.emit_op(Opcode::PUT_VAR);
                    self.emit_u8(coll);
                    self.emit_op(Opcode::POP);
                    let spec = match name {
                        PropName::Static(n) => {
                            let index =
                                self.const_ref(&Var::str(n), line);
                            self.emit_op(Opcode::GET_PROP);
                            self.emit_u8(index);
                            PropSpec::Static(index)
                        }
                        PropName::Dynamic(e) => {
                            self.compile_expr(e)?;
                            let name_slot = self.temp(line);
                            self.emit_op(Opcode::PUT_VAR);
                            self.emit_u8(name_slot);
                            self.emit_op(Opcode::GET_PROP);
                            self.emit_u8(0xFF);
                            PropSpec::Dynamic(name_slot)
                        }
                    };
                    let old = self.temp(line);
                    self.emit_op(Opcode::DUP);
                    self.emit_op(Opcode::PUT_VAR);
                    self.emit_u8(old);
                    self.emit_op(Opcode::POP);
                    levels.push(Level::Prop { coll, old, name: spec });
                }
                Access::Range(..) => {
                    return Err(CompileError::RangeNotLast { line });
                }
            }
        }

        // leaf update
        match leaf {
            Access::Index(index) => {
                self.compile_index_expr(index)?;
                self.emit_op(Opcode::PUSH_VAR);
                self.emit_u8(assigned);
                self.emit_op(Opcode::INDEX_SET);
            }
            Access::Range(from, to) => {
                self.compile_range_exprs(from, to)?;
                self.emit_op(Opcode::PUSH_VAR);
                self.emit_u8(assigned);
                self.emit_op(Opcode::RANGE_SET);
            }
            Access::Prop(name) => {
                let holder = root_slot.is_some() || !levels.is_empty();
                let operand = match name {
                    PropName::Static(n) => {
                        self.const_ref(&Var::str(n), line)
                    }
                    PropName::Dynamic(e) => {
                        self.compile_expr(e)?;
                        0xFF
                    }
                };
                self.emit_op(Opcode::PUSH_VAR);
                self.emit_u8(assigned);
                self.emit_op(Opcode::SET_PROP_YIELD);
                self.emit_u8(operand);
                self.emit_u8(holder as u8);
            }
        }

        // rebuild outward
        if !levels.is_empty() {
            let updated = self.temp(line);
            for level in levels.into_iter().rev() {
                match level {
                    Level::Index { coll, index } => {
                        self.emit_op(Opcode::PUT_VAR);
                        self.emit_u8(updated);
                        self.emit_op(Opcode::POP);
                        self.emit_op(Opcode::PUSH_VAR);
                        self.emit_u8(coll);
                        self.emit_op(Opcode::PUSH_VAR);
                        self.emit_u8(index);
                        self.emit_op(Opcode::PUSH_VAR);
                        self.emit_u8(updated);
                        self.emit_op(Opcode::INDEX_SET);
                    }
                    Level::Prop { coll, old, name } => {
                        self.emit_op(Opcode::PUT_VAR);
                        self.emit_u8(updated);
                        self.emit_op(Opcode::POP);
                        self.emit_op(Opcode::PUSH_VAR);
                        self.emit_u8(coll);
                        let operand = match name {
                            PropSpec::Static(index) => index,
                            PropSpec::Dynamic(name_slot) => {
                                self.emit_op(Opcode::PUSH_VAR);
                                self.emit_u8(name_slot);
                                0xFF
                            }
                        };
                        self.emit_op(Opcode::PUSH_VAR);
                        self.emit_u8(old);
                        self.emit_op(Opcode::PUSH_VAR);
                        self.emit_u8(updated);
                        self.emit_op(Opcode::WRITE_BACK_PROP);
                        self.emit_u8(operand);
                    }
                }
            }
        }

        // store the rebuilt root and leave the assigned value
        match root_slot {
            Some(slot) => {
                self.emit_op(Opcode::PUT_VAR);
                self.emit_u8(slot);
                self.emit_op(Opcode::POP);
            }
            None => self.emit_op(Opcode::POP),
        }
        self.emit_op(Opcode::PUSH_VAR);
        self.emit_u8(assigned);
        Ok(())
    }

    // ---- scatter ----

    fn compile_scatter(
        &mut self,
        line: usize,
        items: &[ScatterItem],
        value: &Expr,
    ) -> Result<(), CompileError> {
        let required = items
            .iter()
            .filter(|i| matches!(i.kind, ScatterKind::Required))
            .count();
        let optional = items
            .iter()
            .filter(|i| matches!(i.kind, ScatterKind::Optional(_)))
            .count();
        let rest_at = items
            .iter()
            .position(|i| matches!(i.kind, ScatterKind::Rest));

        self.compile_expr(value)?;
        self.emit_op(Opcode::SCATTER);
        self.emit_u8(required as u8);
        self.emit_u8(optional as u8);
        self.emit_u8(rest_at.is_some() as u8);

        let avail = self.temp(line);
        self.emit_op(Opcode::PUT_VAR);
        self.emit_u8(avail);
        self.emit_op(Opcode::POP);
        let list = self.temp(line);
        self.emit_op(Opcode::DUP);
        self.emit_op(Opcode::PUT_VAR);
        self.emit_u8(list);
        self.emit_op(Opcode::POP);
        let cursor = self.temp(line);
        self.emit_int(1, line);
        self.emit_op(Opcode::PUT_VAR);
        self.emit_u8(cursor);
        self.emit_op(Opcode::POP);

        for (position, item) in items.iter().enumerate() {
            let target = self.slot(&item.name, line);
            match &item.kind {
                ScatterKind::Required => {
                    self.emit_scatter_take(list, cursor, target, line);
                }
                ScatterKind::Optional(default) => {
                    self.emit_op(Opcode::PUSH_VAR);
                    self.emit_u8(avail);
                    let no_material = self.emit_jump(Opcode::IF_FALSE_JUMP);
                    self.emit_scatter_take(list, cursor, target, line);
                    self.emit_op(Opcode::PUSH_VAR);
                    self.emit_u8(avail);
                    self.emit_int(1, line);
                    self.emit_op(Opcode::SUB);
                    self.emit_op(Opcode::PUT_VAR);
                    self.emit_u8(avail);
                    self.emit_op(Opcode::POP);
                    match default {
                        Some(default) => {
                            let done = self.emit_jump(Opcode::JUMP);
                            self.patch_to_here(no_material);
                            self.compile_expr(default)?;
                            self.emit_op(Opcode::PUT_VAR);
                            self.emit_u8(target);
                            self.emit_op(Opcode::POP);
                            self.patch_to_here(done);
                        }
                        // no material, no default: binding unchanged
                        None => self.patch_to_here(no_material),
                    }
                }
                ScatterKind::Rest => {
                    let required_after = items[position + 1..]
                        .iter()
                        .filter(|i| matches!(i.kind, ScatterKind::Required))
                        .count();
                    // rest = list[cursor .. length - required_after - avail]
                    let stop = self.temp(line);
                    self.emit_op(Opcode::PUSH_VAR);
                    self.emit_u8(list);
                    self.emit_op(Opcode::PUSH_VAR);
                    self.emit_u8(cursor);
                    self.emit_op(Opcode::PUSH_VAR);
                    self.emit_u8(list);
                    self.emit_op(Opcode::LENGTH);
                    self.emit_int(required_after as i64, line);
                    self.emit_op(Opcode::SUB);
                    self.emit_op(Opcode::PUSH_VAR);
                    self.emit_u8(avail);
                    self.emit_op(Opcode::SUB);
                    self.emit_op(Opcode::PUT_VAR);
                    self.emit_u8(stop);
                    self.emit_op(Opcode::RANGE_GET);
                    self.emit_op(Opcode::PUT_VAR);
                    self.emit_u8(target);
                    self.emit_op(Opcode::POP);
                    self.emit_op(Opcode::PUSH_VAR);
                    self.emit_u8(stop);
                    self.emit_int(1, line);
                    self.emit_op(Opcode::ADD);
                    self.emit_op(Opcode::PUT_VAR);
                    self.emit_u8(cursor);
                    self.emit_op(Opcode::POP);
                }
            }
        }
        // the scattered list itself is the expression value, still on the
        // stack under everything we popped
        Ok(())
    }

    fn emit_scatter_take(&mut self, list: u8, cursor: u8, target: u8, line: usize) {
        self.emit_op(Opcode::PUSH_VAR);
        self.emit_u8(list);
        self.emit_op(Opcode::PUSH_VAR);
        self.emit_u8(cursor);
        self.emit_op(Opcode::INDEX_GET);
        self.emit_op(Opcode::PUT_VAR);
        self.emit_u8(target);
        self.emit_op(Opcode::POP);
        self.emit_op(Opcode::PUSH_VAR);
        self.emit_u8(cursor);
        self.emit_int(1, line);
        self.emit_op(Opcode::ADD);
        self.emit_op(Opcode::PUT_VAR);
        self.emit_u8(cursor);
        self.emit_op(Opcode::POP);
    }
}

enum Root<'a> {
    Var(&'a str),
    Expr(&'a Expr),
}

/// Peel accessor layers off an assignment target, outermost-last, down to
/// a variable or expression root. `$name` roots become a property access
/// on the system object.
fn unroll_target(target: &Expr) -> (Root<'_>, Vec<Access<'_>>) {
    let mut accessors = Vec::new();
    let mut current = target;
    loop {
        match &current.kind {
            ExprKind::Prop { base, name } => {
                accessors.push(Access::Prop(name));
                current = base;
            }
            ExprKind::Index { base, index } => {
                accessors.push(Access::Index(index));
                current = base;
            }
            ExprKind::RangeIndex { base, from, to } => {
                accessors.push(Access::Range(from, to));
                current = base;
            }
            ExprKind::Id(name) => {
                accessors.reverse();
                return (Root::Var(name), accessors);
            }
            _ => {
                accessors.reverse();
                return (Root::Expr(current), accessors);
            }
        }
    }
}

fn has_sysprop_root(target: &Expr) -> bool {
    match &target.kind {
        ExprKind::SysProp(_) => true,
        ExprKind::Prop { base, .. }
        | ExprKind::Index { base, .. }
        | ExprKind::RangeIndex { base, .. } => has_sysprop_root(base),
        _ => false,
    }
}

fn desugar_sysprop_root(target: Expr) -> Expr {
    let line = target.line;
    match target.kind {
        ExprKind::SysProp(name) => Expr {
            line,
            kind: ExprKind::Prop {
                base: Box::new(Expr {
                    line,
                    kind: ExprKind::Literal(Var::Obj(objid::SYSTEM)),
                }),
                name: PropName::Static(name),
            },
        },
        ExprKind::Prop { base, name } => Expr {
            line,
            kind: ExprKind::Prop {
                base: Box::new(desugar_sysprop_root(*base)),
                name,
            },
        },
        ExprKind::Index { base, index } => Expr {
            line,
            kind: ExprKind::Index {
                base: Box::new(desugar_sysprop_root(*base)),
                index,
            },
        },
        ExprKind::RangeIndex { base, from, to } => Expr {
            line,
            kind: ExprKind::RangeIndex {
                base: Box::new(desugar_sysprop_root(*base)),
                from,
                to,
            },
        },
        kind => Expr { line, kind },
    }
}

/// Whether `^`/`$` markers occur at this index nesting level. Inner
/// bracketed indices establish their own context and are not descended
/// into on their index side.
fn uses_markers(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::FirstMarker | ExprKind::LastMarker => true,
        ExprKind::Literal(_) | ExprKind::Id(_) | ExprKind::SysProp(_) => false,
        ExprKind::Prop { base, name } => {
            uses_markers(base)
                || matches!(name, PropName::Dynamic(e) if uses_markers(e))
        }
        ExprKind::Verb { base, name, args } => {
            uses_markers(base)
                || matches!(name, PropName::Dynamic(e) if uses_markers(e))
                || args_use_markers(args)
        }
        ExprKind::Call { args, .. } | ExprKind::Pass { args } => {
            args_use_markers(args)
        }
        ExprKind::Index { base, .. } => uses_markers(base),
        ExprKind::RangeIndex { base, .. } => uses_markers(base),
        ExprKind::Assign { target, value } => {
            uses_markers(target) || uses_markers(value)
        }
        ExprKind::Scatter { value, .. } => uses_markers(value),
        ExprKind::Cond { cond, yes, no } => {
            uses_markers(cond) || uses_markers(yes) || uses_markers(no)
        }
        ExprKind::And(a, b) | ExprKind::Or(a, b) => {
            uses_markers(a) || uses_markers(b)
        }
        ExprKind::Binary { left, right, .. } => {
            uses_markers(left) || uses_markers(right)
        }
        ExprKind::Unary { operand, .. } => uses_markers(operand),
        ExprKind::Catch { expr, default, .. } => {
            uses_markers(expr)
                || default.as_deref().is_some_and(uses_markers)
        }
        ExprKind::List(args) => args_use_markers(args),
        ExprKind::RangeList { from, to } => {
            uses_markers(from) || uses_markers(to)
        }
        ExprKind::Map(pairs) => pairs
            .iter()
            .any(|(k, v)| uses_markers(k) || uses_markers(v)),
    }
}

fn args_use_markers(args: &[Arg]) -> bool {
    args.iter().any(|arg| match arg {
        Arg::Normal(e) | Arg::Splice(e) => uses_markers(e),
    })
}

fn binary_opcode(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Add => Opcode::ADD,
        BinaryOp::Sub => Opcode::SUB,
        BinaryOp::Mul => Opcode::MUL,
        BinaryOp::Div => Opcode::DIV,
        BinaryOp::Mod => Opcode::MOD,
        BinaryOp::Pow => Opcode::POW,
        BinaryOp::Eq => Opcode::EQ,
        BinaryOp::Ne => Opcode::NE,
        BinaryOp::Lt => Opcode::LT,
        BinaryOp::Le => Opcode::LE,
        BinaryOp::Gt => Opcode::GT,
        BinaryOp::Ge => Opcode::GE,
        BinaryOp::In => Opcode::IN,
        BinaryOp::BitOr => Opcode::BIT_OR,
        BinaryOp::BitAnd => Opcode::BIT_AND,
        BinaryOp::BitXor => Opcode::BIT_XOR,
        BinaryOp::Shl => Opcode::SHL,
        BinaryOp::Shr => Opcode::SHR,
    }
}
