//! Quasiquotation, compiled into calls to `list`, `append` and `list->vector`

use crate::error::{Position, ScriptError};
use crate::reader::{Datum, DatumKind};
use crate::vm::{stdlib, Value};

use super::keywords::{QUASIQUOTE, UNQUOTE, UNQUOTE_SPLICING};
use super::{error, Bytecode, Compiler, Context, Op};

// `(keyword operand)`
fn abbreviation(datum: &Datum) -> Option<(&Datum, &str, &Datum)> {
    match datum.list() {
        Some([head, operand]) => head.symbol().map(|keyword| (head, keyword, operand)),
        _ => None,
    }
}

fn is_splice(datum: &Datum) -> bool {
    match abbreviation(datum) {
        Some((_, keyword, _)) => keyword == UNQUOTE_SPLICING,
        None => false,
    }
}

// `(a b unquote c)` is how `(a b . ,c)` reads
fn unquoted_tail(items: &[Datum]) -> Option<usize> {
    let n = items.len();
    if n >= 3 && items[n - 2].is_symbol(UNQUOTE) {
        Some(n - 2)
    } else {
        None
    }
}

/// Whether the quasiquoted datum has nothing to evaluate at `depth`
fn is_constant(datum: &Datum, depth: usize) -> bool {
    if let Some((_, keyword, operand)) = abbreviation(datum) {
        match keyword {
            UNQUOTE | UNQUOTE_SPLICING if depth == 0 => return false,
            UNQUOTE | UNQUOTE_SPLICING => return is_constant(operand, depth - 1),
            QUASIQUOTE => return is_constant(operand, depth + 1),
            _ => {}
        }
    }
    match datum.kind {
        DatumKind::List(ref items) => {
            if depth == 0 && unquoted_tail(items).is_some() {
                return false;
            }
            items.iter().all(|d| is_constant(d, depth))
        }
        DatumKind::Pair { ref car, ref cdr } => car.iter().all(|d| is_constant(d, depth)) && is_constant(cdr, depth),
        DatumKind::Vector(ref items) => items.iter().all(|d| is_constant(d, depth)),
        _ => true,
    }
}

impl<'a> Compiler<'a> {
    pub(super) fn compile_quasiquote(
        &mut self,
        form: &Datum,
        items: &[Datum],
        ctx: Context,
        out: &mut Bytecode,
    ) -> Result<bool, ScriptError> {
        check!(items.len() == 2, ScriptError::compile("Invalid expression.", &form.position));
        self.flush(ctx.scope, out)?;
        self.quasi(&items[1], 0, ctx, out)?;
        Ok(true)
    }

    fn quasi(&mut self, datum: &Datum, depth: usize, ctx: Context, out: &mut Bytecode) -> Result<(), ScriptError> {
        if is_constant(datum, depth) {
            self.emit_quoted(datum, ctx.scope, out);
            return Ok(());
        }

        if let Some((head, keyword, operand)) = abbreviation(datum) {
            match keyword {
                UNQUOTE if depth == 0 => {
                    self.compile(operand, ctx.operand(), out)?;
                    return Ok(());
                }
                // Only valid as a list element
                UNQUOTE_SPLICING if depth == 0 => return error("Invalid expression.", datum),
                UNQUOTE | UNQUOTE_SPLICING => {
                    return self.quasi_abbreviation(datum, head, operand, depth - 1, ctx, out);
                }
                QUASIQUOTE => return self.quasi_abbreviation(datum, head, operand, depth + 1, ctx, out),
                _ => {}
            }
        }

        match datum.kind {
            DatumKind::List(ref items) => match unquoted_tail(items) {
                Some(at) => {
                    let tail = Datum::new(DatumKind::List(items[at..].to_vec()), items[at].position.clone());
                    self.quasi_sequence(&datum.position, &items[..at], Some(&tail), depth, ctx, out)
                }
                None => self.quasi_sequence(&datum.position, items, None, depth, ctx, out),
            },
            DatumKind::Pair { ref car, ref cdr } => self.quasi_sequence(&datum.position, car, Some(cdr), depth, ctx, out),
            DatumKind::Vector(ref items) => {
                self.begin_native_call("list->vector", &datum.position, ctx, out)?;
                self.quasi_sequence(&datum.position, items, None, depth, ctx, out)?;
                out.emit_at(Op::Call, &datum.position);
                Ok(())
            }
            _ => {
                self.emit_quoted(datum, ctx.scope, out);
                Ok(())
            }
        }
    }

    // (list 'keyword operand)
    fn quasi_abbreviation(
        &mut self,
        datum: &Datum,
        head: &Datum,
        operand: &Datum,
        depth: usize,
        ctx: Context,
        out: &mut Bytecode,
    ) -> Result<(), ScriptError> {
        self.begin_native_call("list", &datum.position, ctx, out)?;
        self.emit_quoted(head, ctx.scope, out);
        self.quasi(operand, depth, ctx, out)?;
        out.emit_at(Op::Call, &datum.position);
        Ok(())
    }

    // Runs of plain elements become `(list ...)`; splices and the tail are
    // joined with `append`, so the result never shares a spliced list
    fn quasi_sequence(
        &mut self,
        position: &Position,
        elements: &[Datum],
        tail: Option<&Datum>,
        depth: usize,
        ctx: Context,
        out: &mut Bytecode,
    ) -> Result<(), ScriptError> {
        let splices = depth == 0 && elements.iter().any(is_splice);
        if !splices && tail.is_none() {
            return self.quasi_list(position, elements, depth, ctx, out);
        }

        self.begin_native_call("append", position, ctx, out)?;
        let mut run = 0;
        for (i, element) in elements.iter().enumerate() {
            if depth == 0 && is_splice(element) {
                if run < i {
                    self.quasi_list(position, &elements[run..i], depth, ctx, out)?;
                }
                if let Some((_, _, operand)) = abbreviation(element) {
                    self.compile(operand, ctx.operand(), out)?;
                }
                run = i + 1;
            }
        }
        if run < elements.len() {
            self.quasi_list(position, &elements[run..], depth, ctx, out)?;
        }
        match tail {
            Some(tail) => self.quasi(tail, depth, ctx, out)?,
            // `append` shares its last argument; ending on '() copies every splice
            None => self.emit_constant(Value::EmptyList, ctx.scope, out),
        }
        out.emit_at(Op::Call, position);
        Ok(())
    }

    fn quasi_list(
        &mut self,
        position: &Position,
        elements: &[Datum],
        depth: usize,
        ctx: Context,
        out: &mut Bytecode,
    ) -> Result<(), ScriptError> {
        self.begin_native_call("list", position, ctx, out)?;
        for element in elements {
            self.quasi(element, depth, ctx, out)?;
        }
        out.emit_at(Op::Call, position);
        Ok(())
    }

    fn begin_native_call(
        &mut self,
        name: &str,
        position: &Position,
        ctx: Context,
        out: &mut Bytecode,
    ) -> Result<(), ScriptError> {
        let native = stdlib::procedure(name)
            .ok_or_else(|| ScriptError::compile(format!("Internal error: no native {}.", name), position))?;
        out.emit(Op::ResetOperandCount);
        self.emit_constant(native, ctx.scope, out);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::reader::read;

    fn constant(text: &str) -> bool {
        let datum = read(text, None).unwrap().remove(0);
        is_constant(&datum, 0)
    }

    #[test]
    fn constant_templates() {
        assert!(constant("(a b c)"));
        assert!(constant("#(1 (2 3))"));
        assert!(constant("(a `(b ,c))"));
        assert!(!constant("(a ,b)"));
        assert!(!constant("(a . ,b)"));
        assert!(!constant("#(a ,@b)"));
        assert!(!constant("(a `(b ,,c))"));
    }
}
