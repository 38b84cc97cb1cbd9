//! Convert data into bytecode

use crate::error::ScriptError;
use crate::reader::{Datum, DatumKind};
use crate::vm::{Heap, Value};

mod body;
pub mod bytecode;
mod keywords;
pub mod macros;
mod quotations;
pub mod scope;

#[cfg(test)]
mod test;

pub use self::bytecode::{Bytecode, Constant, Lambda, Op};
pub use self::keywords::AUXILIARY;
pub use self::macros::Transformer;
pub use self::scope::{Binding, ScopeRef, Scopes, GLOBAL_SCOPE, TOP_LEVEL_SCOPE};

use self::scope::Pending;

// Nesting of forms and macro expansions before giving up
const MAX_DEPTH: usize = 256;

/// Where a form sits, which decides what it may contain and how it returns
#[derive(Debug, Clone, Copy)]
pub struct Context {
    pub scope: ScopeRef,
    /// Definitions may appear anywhere in a top-level `begin`
    pub top_level: bool,
    pub definitions: bool,
    pub tail: bool,
}

impl Context {
    pub fn top_level(scope: ScopeRef) -> Context {
        Context {
            scope,
            top_level: true,
            definitions: true,
            tail: false,
        }
    }

    /// A subexpression whose value is used by the enclosing form
    fn operand(self) -> Context {
        Context {
            top_level: false,
            definitions: false,
            tail: false,
            ..self
        }
    }

    fn in_scope(self, scope: ScopeRef) -> Context {
        Context { scope, ..self }
    }
}

/// Compiles data against the scope chain, allocating quoted constants in the heap
pub struct Compiler<'a> {
    scopes: &'a mut Scopes,
    heap: &'a mut Heap,
    depth: usize,
}

fn error<T>(message: &str, datum: &Datum) -> Result<T, ScriptError> {
    Err(ScriptError::compile(message, &datum.position))
}

impl<'a> Compiler<'a> {
    pub fn new(scopes: &'a mut Scopes, heap: &'a mut Heap) -> Compiler<'a> {
        Compiler { scopes, heap, depth: 0 }
    }

    /// Compiles a top-level datum. The code ends in `Exit` if the datum yields a
    /// value and in `LambdaExit` if it only defined something.
    pub fn compile_top_level(&mut self, datum: &Datum, scope: ScopeRef) -> Result<Bytecode, ScriptError> {
        let mut out = Bytecode::new();
        let pushed = self.compile(datum, Context::top_level(scope), &mut out)?;
        self.flush(scope, &mut out)?;
        out.emit(if pushed { Op::Exit } else { Op::LambdaExit });
        debug!("compiled {}:\n{}", datum, out.disassemble());
        Ok(out)
    }

    /// Compiles `form` into `out`, returning whether it leaves a value on the
    /// stack (definitions do not).
    pub fn compile(&mut self, form: &Datum, ctx: Context, out: &mut Bytecode) -> Result<bool, ScriptError> {
        self.depth += 1;
        let result = if self.depth > MAX_DEPTH {
            error("Expression too deeply nested.", form)
        } else {
            self.compile_form(form, ctx, out)
        };
        self.depth -= 1;
        result
    }

    fn compile_form(&mut self, form: &Datum, ctx: Context, out: &mut Bytecode) -> Result<bool, ScriptError> {
        match form.kind {
            DatumKind::Symbol(ref name) => self.compile_symbol(form, name, ctx, out),
            DatumKind::List(ref items) if !items.is_empty() => self.compile_list(form, items, ctx, out),
            DatumKind::List(_) | DatumKind::Pair { .. } => error("Invalid expression.", form),
            _ => {
                self.flush(ctx.scope, out)?;
                self.emit_quoted(form, ctx.scope, out);
                Ok(true)
            }
        }
    }

    fn compile_symbol(&mut self, form: &Datum, name: &str, ctx: Context, out: &mut Bytecode) -> Result<bool, ScriptError> {
        match self.scopes.resolve(ctx.scope, name) {
            Some(Binding::Variable(variable)) => {
                self.flush(ctx.scope, out)?;
                out.emit_with2(Op::Variable, variable.depth as i32, variable.index as i32);
                Ok(true)
            }
            Some(Binding::Macro(transformer)) => {
                let expansion = transformer.transform(form, ctx.scope, self.scopes)?;
                self.compile(&expansion, ctx, out)
            }
            Some(Binding::Literal(_)) => error("Invalid expression.", form),
            None => error("Unresolved symbol.", form),
        }
    }

    fn compile_list(&mut self, form: &Datum, items: &[Datum], ctx: Context, out: &mut Bytecode) -> Result<bool, ScriptError> {
        if let Some(name) = items[0].symbol() {
            if keywords::is_special_form(name) {
                return self.compile_special_form(name, form, items, ctx, out);
            }
            if let Some(Binding::Macro(transformer)) = self.scopes.resolve(ctx.scope, name) {
                let expansion = transformer.transform(form, ctx.scope, self.scopes)?;
                trace!("expanded {} into {}", form, expansion);
                return self.compile(&expansion, ctx, out);
            }
        }

        self.flush(ctx.scope, out)?;
        out.emit(Op::ResetOperandCount);
        for item in items {
            self.compile(item, ctx.operand(), out)?;
        }
        out.emit_at(if ctx.tail { Op::TailCall } else { Op::Call }, &form.position);
        Ok(true)
    }

    fn compile_special_form(
        &mut self,
        name: &str,
        form: &Datum,
        items: &[Datum],
        ctx: Context,
        out: &mut Bytecode,
    ) -> Result<bool, ScriptError> {
        match name {
            keywords::QUOTE => {
                check!(items.len() == 2, ScriptError::compile("Invalid expression.", &form.position));
                self.flush(ctx.scope, out)?;
                self.emit_quoted(&items[1], ctx.scope, out);
                Ok(true)
            }
            keywords::QUASIQUOTE => self.compile_quasiquote(form, items, ctx, out),
            keywords::IF => self.compile_if(form, items, ctx, out),
            keywords::BEGIN => self.compile_begin(items, ctx, out),
            keywords::LAMBDA => self.compile_lambda(form, items, ctx, out, None),
            keywords::SET_BANG => self.compile_set(form, items, ctx, out),
            keywords::DEFINE => self.compile_define(form, items, ctx, out),
            keywords::DEFINE_SYNTAX => self.compile_define_syntax(form, items, ctx, out),
            keywords::LET_SYNTAX => self.compile_let_syntax(form, items, ctx, out, false),
            keywords::LETREC_SYNTAX => self.compile_let_syntax(form, items, ctx, out, true),
            _ => error("Invalid expression.", form),
        }
    }

    fn compile_if(&mut self, form: &Datum, items: &[Datum], ctx: Context, out: &mut Bytecode) -> Result<bool, ScriptError> {
        check!(
            items.len() == 3 || items.len() == 4,
            ScriptError::compile("Invalid expression.", &form.position)
        );

        self.compile(&items[1], ctx.operand(), out)?;

        let branch = Context {
            definitions: false,
            top_level: false,
            ..ctx
        };
        let mut consequent = Bytecode::new();
        self.compile(&items[2], branch, &mut consequent)?;
        let mut alternate = Bytecode::new();
        match items.get(3) {
            Some(datum) => {
                self.compile(datum, branch, &mut alternate)?;
            }
            None => self.emit_constant(Value::Unspecified, ctx.scope, &mut alternate),
        }

        out.emit_with(Op::ConditionalJump, (consequent.len() + Op::Jump.size()) as i32);
        out.append(consequent);
        out.emit_with(Op::Jump, alternate.len() as i32);
        out.append(alternate);
        Ok(true)
    }

    fn compile_set(&mut self, form: &Datum, items: &[Datum], ctx: Context, out: &mut Bytecode) -> Result<bool, ScriptError> {
        check!(items.len() == 3, ScriptError::compile("Invalid expression.", &form.position));
        let name = match items[1].symbol() {
            Some(name) => name,
            None => return error("Not a variable.", &items[1]),
        };

        match self.scopes.resolve(ctx.scope, name) {
            Some(Binding::Variable(variable)) => {
                self.compile(&items[2], ctx.operand(), out)?;
                out.emit_with2(Op::SetVariable, variable.depth as i32, variable.index as i32);
                self.emit_constant(Value::Unspecified, ctx.scope, out);
                Ok(true)
            }
            Some(Binding::Macro(transformer)) => {
                let expansion = transformer.transform_set(form, ctx.scope, self.scopes)?;
                self.compile(&expansion, ctx, out)
            }
            Some(Binding::Literal(_)) => error("Not a variable.", &items[1]),
            None => error("Unresolved symbol.", &items[1]),
        }
    }

    fn check_definition(&self, form: &Datum, ctx: Context, out: &Bytecode) -> Result<(), ScriptError> {
        check!(
            ctx.definitions && (ctx.top_level || out.is_empty()),
            ScriptError::compile("Definitions not allowed here.", &form.position)
        );
        Ok(())
    }

    fn compile_define(&mut self, form: &Datum, items: &[Datum], ctx: Context, out: &mut Bytecode) -> Result<bool, ScriptError> {
        self.check_definition(form, ctx, out)?;
        check!(items.len() >= 2, ScriptError::compile("Invalid definition.", &form.position));

        let (name, init) = match items[1].kind {
            DatumKind::Symbol(ref name) => match items.len() {
                2 => (&name[..], None),
                3 => (&name[..], Some(items[2].clone())),
                _ => return error("Invalid definition.", form),
            },
            // (define (name . formals) body ...)
            DatumKind::List(ref signature) if items.len() > 2 => {
                let (name, formals) = split_signature(signature, form)?;
                let formals = Datum::new(DatumKind::List(formals.to_vec()), items[1].position.clone());
                (name, Some(lambda_form(form, formals, &items[2..])))
            }
            DatumKind::Pair { ref car, ref cdr } if items.len() > 2 => {
                let (name, formals) = split_signature(car, form)?;
                let formals = Datum::pair(formals.to_vec(), (**cdr).clone(), items[1].position.clone());
                (name, Some(lambda_form(form, formals, &items[2..])))
            }
            _ => return error("Invalid definition.", form),
        };

        self.scopes.add_variable(ctx.scope, name, init, None, self.heap);
        Ok(false)
    }

    fn compile_define_syntax(
        &mut self,
        form: &Datum,
        items: &[Datum],
        ctx: Context,
        out: &mut Bytecode,
    ) -> Result<bool, ScriptError> {
        self.check_definition(form, ctx, out)?;
        let name = match items {
            [_, name, _] => match name.symbol() {
                Some(name) => name,
                None => return error("Invalid definition.", form),
            },
            _ => return error("Invalid definition.", form),
        };
        let transformer = macros::create_transformer(&items[2], ctx.scope, self.scopes)?;
        self.scopes.define_macro(ctx.scope, name, transformer);
        Ok(false)
    }

    fn compile_let_syntax(
        &mut self,
        form: &Datum,
        items: &[Datum],
        ctx: Context,
        out: &mut Bytecode,
        recursive: bool,
    ) -> Result<bool, ScriptError> {
        check!(items.len() >= 3, ScriptError::compile("Invalid expression.", &form.position));
        let bindings = match items[1].list() {
            Some(bindings) => bindings,
            None => return error("Invalid expression.", &items[1]),
        };

        let scope = self.scopes.push_syntactic_scope(ctx.scope);
        for binding in bindings {
            let (name, spec) = match binding.list() {
                Some([name, spec]) => match name.symbol() {
                    Some(name) => (name, spec),
                    None => return error("Invalid expression.", binding),
                },
                _ => return error("Invalid expression.", binding),
            };
            let definition_scope = if recursive { scope } else { ctx.scope };
            let transformer = macros::create_transformer(spec, definition_scope, self.scopes)?;
            self.scopes.define_macro(scope, name, transformer);
        }

        let pushed = self.compile_sequence(&items[2..], ctx.in_scope(scope), out)?;
        self.scopes.pop(scope);
        Ok(pushed)
    }

    /// Compiles the initializers of definitions made so far in the nearest
    /// value scope, storing each into its slot
    fn flush(&mut self, scope: ScopeRef, out: &mut Bytecode) -> Result<(), ScriptError> {
        if !self.scopes.has_deferred(scope) {
            return Ok(());
        }
        for pending in self.scopes.take_deferred(scope) {
            self.compile_initializer(&pending, out)?;
            out.emit_with2(Op::SetVariable, 0, pending.index as i32);
        }
        Ok(())
    }

    fn compile_initializer(&mut self, pending: &Pending, out: &mut Bytecode) -> Result<(), ScriptError> {
        let ctx = Context {
            scope: pending.scope,
            top_level: false,
            definitions: false,
            tail: false,
        };
        match pending.form.list() {
            Some(items) if !items.is_empty() && items[0].is_symbol(keywords::LAMBDA) => {
                self.compile_lambda(&pending.form, items, ctx, out, Some(pending.name.clone()))?;
            }
            _ => {
                self.compile(&pending.form, ctx, out)?;
            }
        }
        Ok(())
    }

    fn emit_constant(&mut self, value: Value, scope: ScopeRef, out: &mut Bytecode) {
        let index = self.scopes.add_constant(scope, Constant::Value(value));
        out.emit_with(Op::Constant, index as i32);
    }

    fn emit_quoted(&mut self, datum: &Datum, scope: ScopeRef, out: &mut Bytecode) {
        let value = Value::from_datum(datum, self.heap);
        self.emit_constant(value, scope, out);
    }
}

// (lambda formals body ...) at the position of `form`
fn lambda_form(form: &Datum, formals: Datum, body: &[Datum]) -> Datum {
    let mut items = vec![
        Datum::new(DatumKind::Symbol(keywords::LAMBDA.to_string()), form.position.clone()),
        formals,
    ];
    items.extend(body.iter().cloned());
    Datum::new(DatumKind::List(items), form.position.clone())
}

// `(name . formals)` of a procedure definition
fn split_signature<'d>(signature: &'d [Datum], form: &Datum) -> Result<(&'d str, &'d [Datum]), ScriptError> {
    match signature.split_first() {
        Some((head, formals)) => match head.symbol() {
            Some(name) => Ok((name, formals)),
            None => error("Invalid definition.", form),
        },
        None => error("Invalid definition.", form),
    }
}
