use std::collections::HashSet;
use std::rc::Rc;

use crate::error::ScriptError;
use crate::helpers::ImmutableString;
use crate::reader::{Datum, DatumKind};
use crate::vm::Value;

use super::{error, Bytecode, Compiler, Constant, Context, Lambda, Op};

// Fixed arguments and the rest argument, if any
type Formals<'d> = (Vec<&'d str>, Option<&'d str>);

fn parse_formals(formals: &Datum) -> Result<Formals, ScriptError> {
    let (fixed, rest) = match formals.kind {
        DatumKind::Symbol(ref rest) => return Ok((vec![], Some(&rest[..]))),
        DatumKind::List(ref fixed) => (fixed, None),
        DatumKind::Pair { ref car, ref cdr } => match cdr.symbol() {
            Some(rest) => (car, Some(rest)),
            None => return error("Invalid formals.", formals),
        },
        _ => return error("Invalid formals.", formals),
    };

    let mut names = Vec::with_capacity(fixed.len());
    for argument in fixed {
        match argument.symbol() {
            Some(name) => names.push(name),
            None => return error("Invalid argument.", argument),
        }
    }

    let mut seen = HashSet::new();
    for name in names.iter().chain(rest.iter()) {
        check!(seen.insert(*name), ScriptError::compile("Duplicate argument.", &formals.position));
    }
    Ok((names, rest))
}

impl<'a> Compiler<'a> {
    /// `(lambda formals body ...)`. The body gets a value scope of its own; the
    /// finished procedure becomes a constant of the enclosing one.
    pub(super) fn compile_lambda(
        &mut self,
        form: &Datum,
        items: &[Datum],
        ctx: Context,
        out: &mut Bytecode,
        name: Option<ImmutableString>,
    ) -> Result<bool, ScriptError> {
        check!(items.len() >= 2, ScriptError::compile("Invalid lambda.", &form.position));
        let (arguments, rest) = parse_formals(&items[1])?;

        self.flush(ctx.scope, out)?;

        let scope = self.scopes.push_value_scope(ctx.scope);
        for argument in arguments.iter().chain(rest.iter()) {
            self.scopes.add_variable(scope, argument, None, None, self.heap);
        }

        let body_ctx = Context {
            scope,
            top_level: false,
            definitions: true,
            tail: true,
        };
        let mut body = Bytecode::new();
        let pushed = match self.compile_sequence(&items[2..], body_ctx, &mut body) {
            Ok(pushed) => pushed,
            Err(e) => {
                self.scopes.pop(scope);
                return Err(e);
            }
        };
        if !pushed {
            self.scopes.pop(scope);
            return error("Function has no body.", form);
        }
        body.emit(Op::Return);

        let (slot_count, constants) = self.scopes.finish(scope);
        let lambda = Lambda {
            name,
            argument_count: arguments.len(),
            rest: rest.is_some(),
            slot_count,
            constants,
            body,
        };
        trace!("lambda {:?} with {} slots", lambda.name, lambda.slot_count);

        let index = self.scopes.add_constant(ctx.scope, Constant::Lambda(Rc::new(lambda)));
        out.emit_with(Op::Lambda, index as i32);
        Ok(true)
    }

    pub(super) fn compile_begin(&mut self, items: &[Datum], ctx: Context, out: &mut Bytecode) -> Result<bool, ScriptError> {
        if items.len() == 1 {
            self.flush(ctx.scope, out)?;
            self.emit_constant(Value::Unspecified, ctx.scope, out);
            return Ok(true);
        }
        self.compile_sequence(&items[1..], ctx, out)
    }

    /// Compiles forms one after the other, dropping every value but the last.
    /// Only the last form is in tail position.
    pub(super) fn compile_sequence(
        &mut self,
        forms: &[Datum],
        ctx: Context,
        out: &mut Bytecode,
    ) -> Result<bool, ScriptError> {
        let mut pushed = false;
        for (i, form) in forms.iter().enumerate() {
            if pushed {
                out.emit(Op::Pop);
            }
            let last = i + 1 == forms.len();
            pushed = self.compile(form, Context { tail: ctx.tail && last, ..ctx }, out)?;
        }
        Ok(pushed)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::reader::read;

    fn formals(text: &str) -> Result<(Vec<String>, Option<String>), String> {
        let datum = read(text, None).unwrap().remove(0);
        parse_formals(&datum)
            .map(|(fixed, rest)| (fixed.iter().map(|s| s.to_string()).collect(), rest.map(String::from)))
            .map_err(|e| e.message().to_string())
    }

    #[test]
    fn formals_shapes() {
        assert_eq!(formals("args"), Ok((vec![], Some("args".into()))));
        assert_eq!(formals("(a b)"), Ok((vec!["a".into(), "b".into()], None)));
        assert_eq!(formals("(a . b)"), Ok((vec!["a".into()], Some("b".into()))));
        assert_eq!(formals("()"), Ok((vec![], None)));
    }

    #[test]
    fn invalid_formals() {
        assert_eq!(formals("(a 1)"), Err("Invalid argument.".into()));
        assert_eq!(formals("(a . 1)"), Err("Invalid formals.".into()));
        assert_eq!(formals("(a b a)"), Err("Duplicate argument.".into()));
        assert_eq!(formals("(a . a)"), Err("Duplicate argument.".into()));
        assert_eq!(formals("1"), Err("Invalid formals.".into()));
    }
}
