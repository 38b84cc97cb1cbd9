//! The embedding surface: read, compile and run script text

use std::collections::VecDeque;
use std::rc::Rc;

use crate::compiler::{Compiler, Lambda, Scopes, AUXILIARY, GLOBAL_SCOPE, TOP_LEVEL_SCOPE};
use crate::error::{ErrorKind, Position, ScriptError};
use crate::helpers::ImmutableString;
use crate::reader::{read, Datum, ReaderError};
use crate::vm::{stdlib, CollectStats, Heap, NativeProcedure, Profiler, Value, Vm};


static PRELUDE: &str = include_str!("prelude.scm");

pub struct EvaluatorOptions {
    /// Name attached to every position, e.g. a file name
    pub source: Option<String>,
    /// Ceiling on stack values plus pending calls
    pub max_stack_depth: usize,
}

impl Default for EvaluatorOptions {
    fn default() -> EvaluatorOptions {
        EvaluatorOptions {
            source: None,
            max_stack_depth: 100_000,
        }
    }
}

/// Owns one machine and the scopes its code was compiled against. Definitions
/// accumulate across calls to `evaluate`.
pub struct Evaluator {
    vm: Vm,
    scopes: Scopes,
    source: Option<ImmutableString>,
    /// Data read but not compiled yet; each one is compiled once the
    /// previous one has finished, so it sees the definitions made before it
    pending: VecDeque<Datum>,
    running: bool,
    last: Value,
}

fn syntax_error(error: &ReaderError, text: &str, source: &Option<ImmutableString>) -> ScriptError {
    let location = error.location();
    let position = Position::new(
        text.into(),
        source.clone(),
        location.index,
        location.line,
        location.line_start,
    );
    ScriptError::new(ErrorKind::Syntax, error.to_string(), position)
}

impl Evaluator {
    pub fn new(source: Option<&str>) -> Evaluator {
        Evaluator::with_options(EvaluatorOptions {
            source: source.map(String::from),
            ..EvaluatorOptions::default()
        })
    }

    pub fn with_options(options: EvaluatorOptions) -> Evaluator {
        let mut vm = Vm::new(options.max_stack_depth);
        let mut scopes = Scopes::new(vm.global(), vm.top_level());

        for name in stdlib::names() {
            scopes.add_variable(GLOBAL_SCOPE, name, None, stdlib::procedure(name), vm.heap_mut());
        }
        for name in AUXILIARY.iter() {
            scopes.add_literal(GLOBAL_SCOPE, name);
        }

        let mut evaluator = Evaluator {
            vm,
            scopes,
            source: options.source.map(|s| s.as_str().into()),
            pending: VecDeque::new(),
            running: false,
            last: Value::Unspecified,
        };
        evaluator.load_prelude();
        evaluator
    }

    // The prelude only defines syntax, so nothing needs to run
    fn load_prelude(&mut self) {
        let datums = match read(PRELUDE, Some("prelude".into())) {
            Ok(datums) => datums,
            Err(e) => {
                error!("prelude: {}", e);
                return;
            }
        };
        for datum in datums {
            let mut compiler = Compiler::new(&mut self.scopes, self.vm.heap_mut());
            if let Err(e) = compiler.compile_top_level(&datum, GLOBAL_SCOPE) {
                error!("prelude: {}", e);
            }
        }
    }

    /// Reads, compiles and runs `text` to completion, returning the value of
    /// its last datum. A native call that defers its result yields a
    /// `Suspended` error; the state is kept for `wake_up` and `execute`.
    pub fn evaluate(&mut self, text: &str) -> Result<Value, ScriptError> {
        self.start(text)?;
        match self.execute(0)? {
            Some(value) => Ok(value),
            None => Err(ScriptError::new(ErrorKind::Suspended, "Suspended.", Position::default())),
        }
    }

    /// Evaluates `text` with positions attributed to `source`
    pub fn load(&mut self, source: &str, text: &str) -> Result<Value, ScriptError> {
        let previous = self.source.replace(source.into());
        let result = self.evaluate(text);
        self.source = previous;
        result
    }

    /// Reads `text` and queues its data without running anything. Whatever
    /// was running before is abandoned.
    pub fn start(&mut self, text: &str) -> Result<(), ScriptError> {
        self.cancel();
        let datums = read(text, self.source.clone()).map_err(|e| syntax_error(&e, text, &self.source))?;
        self.pending.extend(datums);
        Ok(())
    }

    /// Runs queued code for at most `max_cycles` instructions per datum (0
    /// for no limit). `Ok(None)` means there is more to do: call again, or
    /// `wake_up` first if the evaluator is suspended.
    pub fn execute(&mut self, max_cycles: usize) -> Result<Option<Value>, ScriptError> {
        self.execute_with_profiler(max_cycles, &mut crate::vm::NoopProfiler)
    }

    pub fn execute_with_profiler<P: Profiler>(
        &mut self,
        max_cycles: usize,
        profiler: &mut P,
    ) -> Result<Option<Value>, ScriptError> {
        loop {
            if !self.running {
                let datum = match self.pending.pop_front() {
                    Some(datum) => datum,
                    None => return Ok(Some(std::mem::replace(&mut self.last, Value::Unspecified))),
                };
                if let Err(e) = self.compile(&datum) {
                    self.pending.clear();
                    return Err(e);
                }
                self.running = true;
            }

            match self.vm.execute_with_profiler(max_cycles, profiler) {
                Ok(Some(value)) => {
                    self.running = false;
                    self.last = value;
                }
                Ok(None) => return Ok(None),
                Err(e) => {
                    self.running = false;
                    self.pending.clear();
                    return Err(e);
                }
            }
        }
    }

    // Compiles one datum onto the end of the top-level code. A datum that
    // fails to compile leaves no trace.
    fn compile(&mut self, datum: &Datum) -> Result<(), ScriptError> {
        let checkpoint = self.scopes.checkpoint();
        let compiled = Compiler::new(&mut self.scopes, self.vm.heap_mut()).compile_top_level(datum, TOP_LEVEL_SCOPE);
        let code = match compiled {
            Ok(code) => code,
            Err(e) => {
                self.scopes.rollback(checkpoint, self.vm.heap_mut());
                return Err(e);
            }
        };
        self.vm
            .append_top_level(self.scopes.constants(TOP_LEVEL_SCOPE), code)
            .map_err(|message| ScriptError::new(ErrorKind::Runtime, message, datum.position.clone()))
    }

    /// Supplies the result of the native call the evaluator is waiting on.
    /// Returns false if it was not waiting.
    pub fn wake_up(&mut self, value: Value) -> bool {
        self.vm.wake_up(value)
    }

    pub fn is_suspended(&self) -> bool {
        self.vm.is_suspended()
    }

    /// Abandons the current computation and any queued data; definitions
    /// made so far are kept
    pub fn cancel(&mut self) {
        if self.running || !self.pending.is_empty() {
            debug!("cancelling with {} data queued", self.pending.len());
        }
        self.vm.reset();
        self.pending.clear();
        self.running = false;
        self.last = Value::Unspecified;
    }

    /// Frees every heap object scripts can no longer reach
    pub fn collect_garbage(&mut self) -> CollectStats {
        let stats = self.vm.collect();
        debug!("collected: {:?}", stats);
        stats
    }

    /// Binds `name` in the global scope, where every script can see it unless
    /// it defines the name itself
    pub fn define(&mut self, name: &str, value: Value) {
        self.scopes
            .add_variable(GLOBAL_SCOPE, name, None, Some(value), self.vm.heap_mut());
    }

    /// Registers a native procedure. Returning `Ok(None)` suspends the
    /// evaluator until `wake_up` supplies the result.
    pub fn define_native<F>(&mut self, name: &str, arity: (usize, bool), function: F)
    where
        F: Fn(&mut Heap, &[Value]) -> Result<Option<Value>, String> + 'static,
    {
        self.define(name, Value::Native(NativeProcedure::new(name, arity, Rc::new(function))));
    }

    pub fn heap(&self) -> &Heap {
        self.vm.heap()
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        self.vm.heap_mut()
    }

    /// Renders a value the way the REPL prints it
    pub fn to_repl(&self, value: &Value) -> String {
        value.to_repl(self.vm.heap())
    }

    /// Compiles `text` without running it and lists the resulting bytecode.
    /// Definitions are kept, so later data can refer to earlier ones.
    pub fn disassemble(&mut self, text: &str) -> Result<String, ScriptError> {
        let datums = read(text, self.source.clone()).map_err(|e| syntax_error(&e, text, &self.source))?;
        let mut listing = String::new();
        for datum in datums {
            let checkpoint = self.scopes.checkpoint();
            let compiled = Compiler::new(&mut self.scopes, self.vm.heap_mut()).compile_top_level(&datum, TOP_LEVEL_SCOPE);
            let code = match compiled {
                Ok(code) => code,
                Err(e) => {
                    self.scopes.rollback(checkpoint, self.vm.heap_mut());
                    return Err(e);
                }
            };
            let lambda = Lambda {
                name: Some("top-level".into()),
                constants: self.scopes.constants(TOP_LEVEL_SCOPE).to_vec(),
                body: code,
                ..Lambda::default()
            };
            listing += &lambda.disassemble(self.vm.heap());
        }
        Ok(listing)
    }
}

impl Default for Evaluator {
    fn default() -> Evaluator {
        Evaluator::new(None)
    }
}
