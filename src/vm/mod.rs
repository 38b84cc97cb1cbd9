//! The register machine that runs compiled bytecode
//!
//! Values live on a single operand stack. A call's operands are delimited by
//! `ResetOperandCount`, which saves the running count on the stack itself, so
//! nested argument lists need no extra bookkeeping. Closures get a fresh
//! heap-allocated invocation per call; a non-tail call also pushes a
//! `ReturnRecord`, a tail call does not.

use std::rc::Rc;

use crate::compiler::{Bytecode, Constant, Lambda, Op};
use crate::error::{Position, ScriptError};

pub use self::heap::{Closure, CollectStats, GcId, Heap, Invocation, Marker, Object, Trace};
pub use self::host::{HostObject, Variant};
pub use self::profiler::{NoopProfiler, Profiler, TimeProfiler};
pub use self::value::{NativeFunction, NativeProcedure, Value};

use self::stack::Stack;

mod heap;
mod host;
mod profiler;
mod stack;
pub mod stdlib;
mod value;

#[cfg(test)]
mod test;

/// Where the machine is within the current procedure
#[derive(Debug, Clone)]
struct Registers {
    pc: usize,
    invocation: GcId,
    /// Values pushed since the last `ResetOperandCount`
    operand_count: usize,
    lambda: Rc<Lambda>,
}

/// The caller's registers, saved by a non-tail call
#[derive(Debug, Clone)]
struct ReturnRecord {
    address: usize,
    invocation: GcId,
    operand_count: usize,
    lambda: Rc<Lambda>,
}

impl ReturnRecord {
    fn into_registers(self) -> Registers {
        Registers {
            pc: self.address,
            invocation: self.invocation,
            operand_count: self.operand_count,
            lambda: self.lambda,
        }
    }
}

/// The whole machine state, as captured by `call/cc`
#[derive(Debug, Clone)]
pub struct Snapshot {
    stack: Stack<Value>,
    call_stack: Stack<ReturnRecord>,
    registers: Registers,
}

impl Trace for Registers {
    fn trace(&self, marker: &mut Marker) {
        marker.mark(self.invocation);
        marker.mark_lambda(&self.lambda);
    }
}

impl Trace for Stack<ReturnRecord> {
    fn trace(&self, marker: &mut Marker) {
        for record in self.iter() {
            marker.mark(record.invocation);
            marker.mark_lambda(&record.lambda);
        }
    }
}

impl Trace for Snapshot {
    fn trace(&self, marker: &mut Marker) {
        self.stack.trace(marker);
        self.call_stack.trace(marker);
        self.registers.trace(marker);
    }
}

// Everything the running machine can reach
struct Roots<'a> {
    stack: &'a Stack<Value>,
    call_stack: &'a Stack<ReturnRecord>,
    registers: &'a Registers,
    fixed: [GcId; 3],
}

impl<'a> Trace for Roots<'a> {
    fn trace(&self, marker: &mut Marker) {
        self.stack.trace(marker);
        self.call_stack.trace(marker);
        self.registers.trace(marker);
        for &id in self.fixed.iter() {
            marker.mark(id);
        }
    }
}

enum Flow {
    Continue,
    Exit(Value),
    Suspend,
}

fn arity_error(expected: usize, rest: bool) -> String {
    match (expected, rest) {
        (1, false) => "Requires exactly one argument.".to_string(),
        (n, false) => format!("Requires exactly {} arguments.", n),
        (1, true) => "Requires at least one argument.".to_string(),
        (n, true) => format!("Requires at least {} arguments.", n),
    }
}

fn internal(what: &str) -> String {
    format!("Internal error: {}.", what)
}

pub struct Vm {
    heap: Heap,
    stack: Stack<Value>,
    call_stack: Stack<ReturnRecord>,
    registers: Registers,
    /// Holds the slots of the global scope
    global: GcId,
    /// Holds the slots of the top-level scope
    top_level: GcId,
    /// The closure whose body grows with every evaluated datum
    top_closure: GcId,
    /// Set while a native call waits for its result; true if it was a tail call
    suspended: Option<bool>,
    max_stack_depth: usize,
}

impl Vm {
    pub fn new(max_stack_depth: usize) -> Vm {
        let mut heap = Heap::new();
        let global = heap.alloc(Object::Invocation(Invocation {
            procedure: None,
            slots: vec![],
        }));
        let lambda = Rc::new(Lambda::default());
        let top_closure = heap.alloc(Object::Closure(Closure {
            lambda: lambda.clone(),
            parent: Some(global),
        }));
        let top_level = heap.alloc(Object::Invocation(Invocation {
            procedure: Some(top_closure),
            slots: vec![],
        }));

        Vm {
            heap,
            stack: Stack::default(),
            call_stack: Stack::default(),
            registers: Registers {
                pc: 0,
                invocation: top_level,
                operand_count: 0,
                lambda,
            },
            global,
            top_level,
            top_closure,
            suspended: None,
            max_stack_depth,
        }
    }

    pub fn global(&self) -> GcId {
        self.global
    }

    pub fn top_level(&self) -> GcId {
        self.top_level
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.is_some()
    }

    /// Appends freshly compiled top-level code and points the machine at it.
    /// `constants` is the full constant pool of the top-level scope.
    pub fn append_top_level(&mut self, constants: &[Constant], code: Bytecode) -> Result<(), String> {
        // Drop our reference so the shared lambda is usually updated in place
        self.registers.lambda = Rc::default();

        let closure = self
            .heap
            .closure_mut(self.top_closure)
            .ok_or_else(|| internal("no top-level closure"))?;
        let lambda = Rc::make_mut(&mut closure.lambda);
        let known = lambda.constants.len();
        lambda.constants.extend(constants.iter().skip(known).cloned());
        let start = lambda.body.len();
        lambda.body.append(code);
        let lambda = closure.lambda.clone();

        self.stack.clear();
        self.call_stack.clear();
        self.suspended = None;
        self.registers = Registers {
            pc: start,
            invocation: self.top_level,
            operand_count: 0,
            lambda,
        };
        Ok(())
    }

    /// Runs until the code exits, a native call suspends or `max_cycles`
    /// instructions have run (0 for no limit). `Ok(None)` means the code is
    /// still running.
    pub fn execute(&mut self, max_cycles: usize) -> Result<Option<Value>, ScriptError> {
        self.execute_with_profiler(max_cycles, &mut NoopProfiler)
    }

    pub fn execute_with_profiler<P: Profiler>(
        &mut self,
        max_cycles: usize,
        profiler: &mut P,
    ) -> Result<Option<Value>, ScriptError> {
        if self.suspended.is_some() {
            return Ok(None);
        }

        let mut cycles = 0;
        loop {
            if max_cycles > 0 && cycles >= max_cycles {
                return Ok(None);
            }
            cycles += 1;

            let pc = self.registers.pc;
            let op = match self.registers.lambda.body.op(pc) {
                Some(op) => op,
                // Nothing left to run
                None if pc == self.registers.lambda.body.len() && self.call_stack.is_empty() => {
                    return Ok(Some(Value::Unspecified));
                }
                None => return Err(self.fail(internal("invalid instruction"))),
            };
            self.registers.pc += op.size();

            trace!(
                "pc {:04} {} count {} depth {}",
                pc,
                op,
                self.registers.operand_count,
                self.call_stack.len()
            );

            profiler.on_instruction_start(op);
            let flow = self.step(op, pc);
            profiler.on_instruction_end(op);

            match flow {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit(value)) => return Ok(Some(value)),
                Ok(Flow::Suspend) => return Ok(None),
                Err(message) => return Err(self.fail(message)),
            }
        }
    }

    /// Supplies the result of the suspended native call
    pub fn wake_up(&mut self, value: Value) -> bool {
        match self.suspended.take() {
            Some(tail) => {
                self.complete(value, tail);
                true
            }
            None => false,
        }
    }

    /// Abandons the running computation, keeping all definitions
    pub fn reset(&mut self) {
        self.stack.clear();
        self.call_stack.clear();
        self.suspended = None;
        let lambda = match self.heap.closure(self.top_closure) {
            Some(closure) => closure.lambda.clone(),
            None => self.registers.lambda.clone(),
        };
        self.registers = Registers {
            pc: lambda.body.len(),
            invocation: self.top_level,
            operand_count: 0,
            lambda,
        };
    }

    /// Frees every heap object the machine can no longer reach
    pub fn collect(&mut self) -> CollectStats {
        let roots = Roots {
            stack: &self.stack,
            call_stack: &self.call_stack,
            registers: &self.registers,
            fixed: [self.global, self.top_level, self.top_closure],
        };
        self.heap.collect(&roots)
    }

    fn operand(&self, at: usize) -> Result<i32, String> {
        self.registers
            .lambda
            .body
            .operand(at)
            .ok_or_else(|| internal("missing operand"))
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
        self.registers.operand_count += 1;
    }

    fn pop(&mut self) -> Result<Value, String> {
        let value = self.stack.pop().ok_or_else(|| internal("empty stack"))?;
        self.registers.operand_count = self.registers.operand_count.saturating_sub(1);
        Ok(value)
    }

    // The invocation `depth` closures out from the current one
    fn frame(&self, depth: i32) -> Result<GcId, String> {
        let mut invocation = self.registers.invocation;
        for _ in 0..depth {
            invocation = self
                .heap
                .invocation(invocation)
                .and_then(|i| i.procedure)
                .and_then(|p| self.heap.closure(p))
                .and_then(|c| c.parent)
                .ok_or_else(|| internal("no enclosing frame"))?;
        }
        Ok(invocation)
    }

    fn step(&mut self, op: Op, pc: usize) -> Result<Flow, String> {
        match op {
            Op::Constant => {
                let index = self.operand(pc + 1)? as usize;
                let value = match self.registers.lambda.constants.get(index) {
                    Some(Constant::Value(value)) => value.clone(),
                    _ => return Err(internal("bad constant")),
                };
                self.push(value);
            }
            Op::Variable => {
                let frame = self.frame(self.operand(pc + 1)?)?;
                let index = self.operand(pc + 5)? as usize;
                let value = self
                    .heap
                    .invocation(frame)
                    .and_then(|i| i.slots.get(index))
                    .cloned()
                    .ok_or_else(|| internal("bad variable"))?;
                self.push(value);
            }
            Op::SetVariable => {
                let frame = self.frame(self.operand(pc + 1)?)?;
                let index = self.operand(pc + 5)? as usize;
                let value = self.pop()?;
                let slot = self
                    .heap
                    .invocation_mut(frame)
                    .and_then(|i| i.slots.get_mut(index))
                    .ok_or_else(|| internal("bad variable"))?;
                *slot = value;
            }
            Op::ResetOperandCount => {
                let count = self.registers.operand_count;
                self.stack.push(Value::Integer(count as i64));
                self.registers.operand_count = 0;
            }
            Op::Call | Op::TailCall => {
                let count = self.registers.operand_count;
                let mut window = self.stack.split_top(count).ok_or_else(|| internal("short stack"))?;
                let saved = match self.stack.pop() {
                    Some(Value::Integer(n)) => n as usize,
                    _ => return Err(internal("no operand count")),
                };
                if window.is_empty() {
                    return Err(internal("empty call"));
                }
                let callee = window.remove(0);
                self.registers.operand_count = saved;
                return self.call(callee, window, op == Op::TailCall);
            }
            Op::Return => {
                let value = self.pop()?;
                let record = self.call_stack.pop().ok_or_else(|| internal("return without caller"))?;
                debug!("return to {:04}", record.address);
                self.registers = record.into_registers();
                self.push(value);
            }
            Op::Lambda => {
                let index = self.operand(pc + 1)? as usize;
                let lambda = match self.registers.lambda.constants.get(index) {
                    Some(Constant::Lambda(lambda)) => lambda.clone(),
                    _ => return Err(internal("bad lambda")),
                };
                let closure = self.heap.alloc(Object::Closure(Closure {
                    lambda,
                    parent: Some(self.registers.invocation),
                }));
                self.push(Value::Closure(closure));
            }
            Op::Pop => {
                self.pop()?;
            }
            Op::Jump => {
                let offset = self.operand(pc + 1)?;
                self.jump(offset)?;
            }
            Op::ConditionalJump => {
                let offset = self.operand(pc + 1)?;
                if !self.pop()?.is_true() {
                    self.jump(offset)?;
                }
            }
            Op::Exit => {
                let value = self.pop()?;
                return Ok(Flow::Exit(value));
            }
            Op::LambdaExit => return Ok(Flow::Exit(Value::Unspecified)),
        }
        Ok(Flow::Continue)
    }

    fn jump(&mut self, offset: i32) -> Result<(), String> {
        let target = self.registers.pc as i64 + i64::from(offset);
        if target < 0 || target as usize > self.registers.lambda.body.len() {
            return Err(internal("jump out of bounds"));
        }
        self.registers.pc = target as usize;
        Ok(())
    }

    // Pushes a call's result, first leaving the current procedure for a tail call
    fn complete(&mut self, value: Value, tail: bool) {
        if tail {
            if let Some(record) = self.call_stack.pop() {
                self.registers = record.into_registers();
            }
        }
        self.push(value);
    }

    fn check_depth(&self) -> Result<(), String> {
        if self.stack.len() + self.call_stack.len() >= self.max_stack_depth {
            return Err("Stack overflow.".to_string());
        }
        Ok(())
    }

    fn call(&mut self, mut callee: Value, mut arguments: Vec<Value>, tail: bool) -> Result<Flow, String> {
        loop {
            match callee {
                Value::Closure(id) => {
                    let lambda = self
                        .heap
                        .closure(id)
                        .map(|c| c.lambda.clone())
                        .ok_or_else(|| internal("dangling closure"))?;
                    if !lambda.accepts(arguments.len()) {
                        return Err(arity_error(lambda.argument_count, lambda.rest));
                    }

                    if lambda.rest {
                        let rest = arguments.split_off(lambda.argument_count);
                        let rest = self.heap.list(rest);
                        arguments.push(rest);
                    }
                    arguments.resize(lambda.slot_count.max(arguments.len()), Value::Unspecified);
                    let invocation = self.heap.alloc(Object::Invocation(Invocation {
                        procedure: Some(id),
                        slots: arguments,
                    }));

                    if !tail {
                        self.check_depth()?;
                        self.call_stack.push(ReturnRecord {
                            address: self.registers.pc,
                            invocation: self.registers.invocation,
                            operand_count: self.registers.operand_count,
                            lambda: self.registers.lambda.clone(),
                        });
                    }
                    debug!(
                        "{}call {}",
                        if tail { "tail " } else { "" },
                        lambda.name.as_ref().map(|n| &n[..]).unwrap_or("<lambda>")
                    );
                    self.registers = Registers {
                        pc: 0,
                        invocation,
                        operand_count: 0,
                        lambda,
                    };
                    return Ok(Flow::Continue);
                }
                Value::Native(native) => {
                    if !native.accepts(arguments.len()) {
                        return Err(arity_error(native.arity.0, native.arity.1));
                    }
                    return match (native.function)(&mut self.heap, &arguments)? {
                        Some(value) => {
                            self.complete(value, tail);
                            Ok(Flow::Continue)
                        }
                        None => {
                            debug!("suspended in {}", native.name);
                            self.suspended = Some(tail);
                            Ok(Flow::Suspend)
                        }
                    };
                }
                Value::Continuation(id) => {
                    if arguments.len() != 1 {
                        return Err(arity_error(1, false));
                    }
                    let snapshot = self
                        .heap
                        .continuation(id)
                        .ok_or_else(|| internal("dangling continuation"))?;
                    debug!("restoring continuation at {:04}", snapshot.registers.pc);
                    let Snapshot {
                        stack,
                        call_stack,
                        registers,
                    } = (*snapshot).clone();
                    self.stack = stack;
                    self.call_stack = call_stack;
                    self.registers = registers;
                    let value = arguments.pop().unwrap_or(Value::Unspecified);
                    self.push(value);
                    return Ok(Flow::Continue);
                }
                Value::Capture => {
                    if arguments.len() != 1 {
                        return Err(arity_error(1, false));
                    }
                    let snapshot = self.snapshot(tail);
                    debug!("captured continuation at {:04}", snapshot.registers.pc);
                    let continuation = self.heap.alloc(Object::Continuation(Rc::new(snapshot)));
                    callee = arguments.pop().unwrap_or(Value::Unspecified);
                    arguments = vec![Value::Continuation(continuation)];
                }
                Value::Apply => {
                    if arguments.len() < 2 {
                        return Err(arity_error(2, true));
                    }
                    let list = arguments.pop().unwrap_or(Value::EmptyList);
                    let spread = self.heap.list_to_vec(&list).ok_or_else(|| "Invalid argument.".to_string())?;
                    callee = arguments.remove(0);
                    arguments.extend(spread);
                }
                _ => return Err("Not a procedure.".to_string()),
            }
        }
    }

    // The state a call's result would be delivered to
    fn snapshot(&self, tail: bool) -> Snapshot {
        let mut call_stack = self.call_stack.clone();
        let registers = match call_stack.pop() {
            Some(record) if tail => record.into_registers(),
            Some(record) => {
                call_stack.push(record);
                self.registers.clone()
            }
            None => self.registers.clone(),
        };
        Snapshot {
            stack: self.stack.clone(),
            call_stack,
            registers,
        }
    }

    // Converts a failure into a script error carrying one position per active
    // frame, innermost first, then returns to the base frame
    fn fail(&mut self, message: String) -> ScriptError {
        let mut frames = vec![position(&self.registers.lambda, self.registers.pc)];
        for record in self.call_stack.iter().rev() {
            frames.push(position(&record.lambda, record.address));
        }
        debug!("runtime error: {}", message);
        self.reset();
        ScriptError::runtime(message, frames)
    }
}

// Position of the instruction that ends right before `address`
fn position(lambda: &Lambda, address: usize) -> Position {
    lambda
        .body
        .position(address.saturating_sub(1))
        .cloned()
        .unwrap_or_default()
}
