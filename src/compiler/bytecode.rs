//! The instruction set and the containers compiled code lives in

use std::collections::BTreeMap;
use std::fmt::{self, Display, Write};
use std::rc::Rc;

use crate::error::Position;
use crate::helpers::ImmutableString;
use crate::vm::{Heap, Value};

/// The "ISA" of the interpreter. Operands are 4-byte big-endian integers.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Push constant #n of the current procedure
    Constant = 0,
    /// Push slot `index` of the invocation `depth` levels up
    Variable,
    /// Pop into slot `index` of the invocation `depth` levels up
    SetVariable,
    /// Save the operand count on the stack and start a new one
    ResetOperandCount,
    /// Call the procedure below the pending operands, saving the return address
    Call,
    /// Call replacing the current frame
    TailCall,
    /// Pop the result and resume the caller
    Return,
    /// Push a closure over lambda constant #n
    Lambda,
    Pop,
    /// Branch by a signed offset, relative to the end of the operand
    Jump,
    /// Pop and branch if the value is #f
    ConditionalJump,
    /// Stop, handing the popped value to the host
    Exit,
    /// Stop with an unspecified result
    LambdaExit,
}

const OPS: [Op; 13] = [
    Op::Constant,
    Op::Variable,
    Op::SetVariable,
    Op::ResetOperandCount,
    Op::Call,
    Op::TailCall,
    Op::Return,
    Op::Lambda,
    Op::Pop,
    Op::Jump,
    Op::ConditionalJump,
    Op::Exit,
    Op::LambdaExit,
];

impl Op {
    pub fn from_byte(byte: u8) -> Option<Op> {
        OPS.get(byte as usize).cloned()
    }

    pub fn operand_count(self) -> usize {
        match self {
            Op::Variable | Op::SetVariable => 2,
            Op::Constant | Op::Lambda | Op::Jump | Op::ConditionalJump => 1,
            _ => 0,
        }
    }

    /// Encoded size, operands included
    pub fn size(self) -> usize {
        1 + 4 * self.operand_count()
    }
}

impl Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A byte-encoded instruction stream, with the source positions of its calls
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    data: Vec<u8>,
    positions: BTreeMap<usize, Position>,
}

impl Bytecode {
    pub fn new() -> Bytecode {
        Bytecode::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn emit(&mut self, op: Op) {
        self.data.push(op as u8);
    }

    pub fn emit_with(&mut self, op: Op, operand: i32) {
        self.emit(op);
        self.data.extend_from_slice(&operand.to_be_bytes());
    }

    pub fn emit_with2(&mut self, op: Op, first: i32, second: i32) {
        self.emit_with(op, first);
        self.data.extend_from_slice(&second.to_be_bytes());
    }

    /// Emits `op` and attributes it to `position` for backtraces
    pub fn emit_at(&mut self, op: Op, position: &Position) {
        self.positions.insert(self.data.len(), position.clone());
        self.emit(op);
    }

    pub fn append(&mut self, other: Bytecode) {
        let offset = self.data.len();
        self.positions
            .extend(other.positions.into_iter().map(|(at, p)| (at + offset, p)));
        self.data.extend(other.data);
    }

    pub fn op(&self, at: usize) -> Option<Op> {
        self.data.get(at).cloned().and_then(Op::from_byte)
    }

    pub fn operand(&self, at: usize) -> Option<i32> {
        let bytes = self.data.get(at..at + 4)?;
        Some(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// The position of the closest recorded instruction at or before `at`
    pub fn position(&self, at: usize) -> Option<&Position> {
        self.positions.range(..=at).next_back().map(|(_, p)| p)
    }

    /// One line per instruction: offset, opcode and operands
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        let mut pc = 0;
        while pc < self.data.len() {
            let op = match self.op(pc) {
                Some(op) => op,
                None => {
                    let _ = writeln!(out, "{:04} <invalid {}>", pc, self.data[pc]);
                    pc += 1;
                    continue;
                }
            };
            let _ = write!(out, "{:04} {}", pc, op);
            for i in 0..op.operand_count() {
                if let Some(operand) = self.operand(pc + 1 + 4 * i) {
                    let _ = write!(out, " {}", operand);
                }
            }
            out.push('\n');
            pc += op.size();
        }
        out
    }
}

/// Compile-time constants of a procedure
#[derive(Debug, Clone)]
pub enum Constant {
    Value(Value),
    Lambda(Rc<Lambda>),
}

/// A compiled procedure body
#[derive(Debug, Clone, Default)]
pub struct Lambda {
    pub name: Option<ImmutableString>,
    pub argument_count: usize,
    /// Whether surplus arguments are collected into a list
    pub rest: bool,
    /// Arguments followed by internal definitions
    pub slot_count: usize,
    pub constants: Vec<Constant>,
    pub body: Bytecode,
}

impl Lambda {
    pub fn accepts(&self, count: usize) -> bool {
        count == self.argument_count || self.rest && count > self.argument_count
    }

    /// Lists the body, its constants and every nested lambda
    pub fn disassemble(&self, heap: &Heap) -> String {
        let mut out = String::new();
        self.disassemble_into(heap, "", &mut out);
        out
    }

    fn disassemble_into(&self, heap: &Heap, indent: &str, out: &mut String) {
        let _ = writeln!(
            out,
            "{}lambda {} (arguments: {}{}, slots: {})",
            indent,
            self.name.as_ref().map(|n| &n[..]).unwrap_or("<anonymous>"),
            self.argument_count,
            if self.rest { " + rest" } else { "" },
            self.slot_count
        );
        for line in self.body.disassemble().lines() {
            let _ = writeln!(out, "{}  {}", indent, line);
        }
        let nested = format!("{}    ", indent);
        for (i, constant) in self.constants.iter().enumerate() {
            match *constant {
                Constant::Value(ref value) => {
                    let _ = writeln!(out, "{}  #{} = {}", indent, i, value.to_repl(heap));
                }
                Constant::Lambda(ref lambda) => {
                    let _ = writeln!(out, "{}  #{} =", indent, i);
                    lambda.disassemble_into(heap, &nested, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn operands_are_big_endian() {
        let mut code = Bytecode::new();
        code.emit_with(Op::Constant, 258);
        code.emit_with2(Op::Variable, 1, -1);
        assert_eq!(code.len(), Op::Constant.size() + Op::Variable.size());
        assert_eq!(code.op(0), Some(Op::Constant));
        assert_eq!(code.operand(1), Some(258));
        assert_eq!(code.operand(6), Some(1));
        assert_eq!(code.operand(10), Some(-1));
    }

    #[test]
    fn append_shifts_positions() {
        let mut first = Bytecode::new();
        first.emit(Op::Pop);
        let mut second = Bytecode::new();
        second.emit(Op::Pop);
        second.emit_at(Op::Call, &Position::default());
        first.append(second);
        assert!(first.position(0).is_none());
        assert!(first.position(2).is_some());
    }

    #[test]
    fn disassembly() {
        let mut code = Bytecode::new();
        code.emit(Op::ResetOperandCount);
        code.emit_with(Op::Jump, -6);
        code.emit(Op::Exit);
        assert_eq!(code.disassemble(), "0000 ResetOperandCount\n0001 Jump -6\n0006 Exit\n");
    }
}
