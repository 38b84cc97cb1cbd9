use std::collections::HashSet;
use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

use crate::helpers::{char_literal, string_literal, ImmutableString};
use crate::reader::{Datum, DatumKind};

use super::heap::{GcId, Heap, Object};
use super::host::HostObject;

/// Signature of natively implemented procedures. `Ok(None)` means the result
/// will be supplied later through `Evaluator::wake_up`.
pub type NativeFunction = Rc<dyn Fn(&mut Heap, &[Value]) -> Result<Option<Value>, String>>;

/// Script values
#[derive(Debug, Clone)]
pub enum Value {
    /// The "unspecified" value returned by some forms (e.g. `(set!)`)
    Unspecified,
    /// The empty list `'()`
    EmptyList,
    Boolean(bool),
    /// A 64-bit integer
    Integer(i64),
    /// A 64-bit float
    Float(f64),
    Character(char),
    /// A symbol (`'a`)
    Symbol(ImmutableString),
    /// An immutable string
    String(ImmutableString),
    ByteVector(Rc<[u8]>),
    Pair(GcId),
    Vector(GcId),
    /// A compiled procedure
    Closure(GcId),
    /// A captured continuation, callable with one argument
    Continuation(GcId),
    /// A natively implemented procedure
    Native(NativeProcedure),
    /// `call-with-current-continuation`
    Capture,
    /// `apply`
    Apply,
    /// An object owned by the embedding application
    Host(Rc<dyn HostObject>),
}

#[derive(Clone)]
pub struct NativeProcedure {
    pub name: ImmutableString,
    /// Required argument count and whether more are accepted
    pub arity: (usize, bool),
    pub function: NativeFunction,
}

impl NativeProcedure {
    pub fn new(name: &str, arity: (usize, bool), function: NativeFunction) -> NativeProcedure {
        NativeProcedure {
            name: name.into(),
            arity,
            function,
        }
    }

    pub fn accepts(&self, count: usize) -> bool {
        let (required, variadic) = self.arity;
        count == required || variadic && count > required
    }
}

impl Debug for NativeProcedure {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "NativeProcedure({}, {:?})", self.name, self.arity)
    }
}

// This PartialEq implementation corresponds to the native eqv? procedure:
// reference types compare by identity
impl PartialEq<Value> for Value {
    fn eq(&self, other: &Value) -> bool {
        use self::Value::*;

        match (self, other) {
            (&Unspecified, &Unspecified) | (&EmptyList, &EmptyList) => true,
            (&Capture, &Capture) | (&Apply, &Apply) => true,
            (&Float(f), &Float(g)) => f == g,
            (&Integer(n), &Integer(m)) => m == n,
            (&Boolean(x), &Boolean(y)) => x == y,
            (&Character(x), &Character(y)) => x == y,
            (&Symbol(ref x), &Symbol(ref y)) => *x == *y,
            (&String(ref x), &String(ref y)) => Rc::ptr_eq(x, y),
            (&ByteVector(ref x), &ByteVector(ref y)) => Rc::ptr_eq(x, y),
            (&Pair(x), &Pair(y))
            | (&Vector(x), &Vector(y))
            | (&Closure(x), &Closure(y))
            | (&Continuation(x), &Continuation(y)) => x == y,
            (&Native(ref x), &Native(ref y)) => Rc::ptr_eq(&x.function, &y.function),
            (&Host(ref x), &Host(ref y)) => {
                Rc::as_ptr(x) as *const u8 == Rc::as_ptr(y) as *const u8
            }
            _ => false,
        }
    }
}

impl<'a> From<&'a Value> for bool {
    fn from(v: &Value) -> bool {
        match *v {
            Value::Boolean(false) => false,
            _ => true,
        }
    }
}

macro_rules! simple_type {
    ($name:ident, $var:pat) => (
        pub fn $name(&self) -> bool {
            match *self {
                $var => true,
                _ => false
            }
        }
    );
    ($name:ident, $var:pat, $($vars:pat),+) => (
        pub fn $name(&self) -> bool {
            match *self {
                $var $(| $vars)+ => true,
                _ => false
            }
        }
    )
}

impl Value {
    simple_type!(is_vector, Value::Vector(..));
    simple_type!(is_symbol, Value::Symbol(..));
    simple_type!(
        is_procedure,
        Value::Closure(..),
        Value::Continuation(..),
        Value::Native(..),
        Value::Capture,
        Value::Apply
    );
    simple_type!(is_string, Value::String(..));
    simple_type!(is_char, Value::Character(..));
    simple_type!(is_boolean, Value::Boolean(..));
    simple_type!(is_null, Value::EmptyList);
    simple_type!(is_pair, Value::Pair(..));
    simple_type!(is_number, Value::Integer(_), Value::Float(_));
    simple_type!(is_bytevector, Value::ByteVector(..));
    simple_type!(is_host, Value::Host(..));

    /// The heap object this value refers to, if any
    pub fn heap_id(&self) -> Option<GcId> {
        match *self {
            Value::Pair(id) | Value::Vector(id) | Value::Closure(id) | Value::Continuation(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_true(&self) -> bool {
        self.into()
    }

    pub fn string(s: &str) -> Value {
        Value::String(s.into())
    }

    pub fn symbol(s: &str) -> Value {
        Value::Symbol(s.into())
    }

    /// `equal?`: structural comparison of pairs, vectors, strings and bytevectors
    pub fn equal(&self, other: &Value, heap: &Heap) -> bool {
        // Pending comparisons; nesting of any depth stays off the native stack
        let mut pending = vec![(self.clone(), other.clone())];
        while let Some((left, right)) = pending.pop() {
            if left == right {
                continue;
            }
            match (&left, &right) {
                (Value::String(s), Value::String(s2)) if s == s2 => {}
                (Value::ByteVector(b), Value::ByteVector(b2)) if b == b2 => {}
                (Value::Vector(v), Value::Vector(v2)) => match (heap.vector(*v), heap.vector(*v2)) {
                    (Some(vec), Some(vec2)) if vec.len() == vec2.len() => {
                        pending.extend(vec.iter().cloned().zip(vec2.iter().cloned()));
                    }
                    _ => return false,
                },
                (Value::Pair(p), Value::Pair(p2)) => match (heap.pair(*p), heap.pair(*p2)) {
                    (Some((car, cdr)), Some((car2, cdr2))) => {
                        pending.push((cdr.clone(), cdr2.clone()));
                        pending.push((car.clone(), car2.clone()));
                    }
                    _ => return false,
                },
                _ => return false,
            }
        }
        true
    }

    /// Pretty-prints the value for the REPL (`write` notation)
    pub fn to_repl(&self, heap: &Heap) -> String {
        let mut printer = Printer {
            heap,
            write: true,
            depth: 0,
            path: HashSet::new(),
            out: String::new(),
        };
        printer.print(self);
        printer.out
    }

    /// Renders the value the way `display` does: strings and characters raw
    pub fn to_display(&self, heap: &Heap) -> String {
        let mut printer = Printer {
            heap,
            write: false,
            depth: 0,
            path: HashSet::new(),
            out: String::new(),
        };
        printer.print(self);
        printer.out
    }

    /// Builds a value from a quoted datum, allocating compound parts in `heap`
    pub fn from_datum(datum: &Datum, heap: &mut Heap) -> Value {
        match datum.kind {
            DatumKind::Boolean(b) => Value::Boolean(b),
            DatumKind::Integer(n) => Value::Integer(n),
            DatumKind::Float(f) => Value::Float(f),
            DatumKind::Character(c) => Value::Character(c),
            DatumKind::String(ref s) => Value::string(s),
            DatumKind::Symbol(ref s) => Value::symbol(s),
            DatumKind::ByteVector(ref bytes) => Value::ByteVector(bytes.as_slice().into()),
            DatumKind::List(ref items) => {
                let values = items.iter().map(|d| Value::from_datum(d, heap)).collect();
                heap.list(values)
            }
            DatumKind::Pair { ref car, ref cdr } => {
                let values = car.iter().map(|d| Value::from_datum(d, heap)).collect();
                let tail = Value::from_datum(cdr, heap);
                heap.list_with_tail(values, tail)
            }
            DatumKind::Vector(ref items) => {
                let values = items.iter().map(|d| Value::from_datum(d, heap)).collect();
                Value::Vector(heap.alloc(Object::Vector(values)))
            }
        }
    }

    pub fn type_name(&self) -> &'static str {
        match *self {
            Value::Unspecified => "unspecified",
            Value::EmptyList => "empty list",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Character(_) => "character",
            Value::Symbol(_) => "symbol",
            Value::String(_) => "string",
            Value::ByteVector(_) => "bytevector",
            Value::Pair(_) => "pair",
            Value::Vector(_) => "vector",
            Value::Host(_) => "host object",
            _ => "procedure",
        }
    }
}

// Nesting printed before eliding the rest
const MAX_PRINT_DEPTH: usize = 256;

struct Printer<'a> {
    heap: &'a Heap,
    write: bool,
    depth: usize,
    // Compound objects being printed, to cut cycles short
    path: HashSet<GcId>,
    out: String,
}

impl<'a> Printer<'a> {
    fn print(&mut self, value: &Value) {
        match *value {
            Value::Vector(_) | Value::Pair(_) if self.depth >= MAX_PRINT_DEPTH => self.out += "...",
            Value::Vector(_) | Value::Pair(_) => {
                self.depth += 1;
                self.print_value(value);
                self.depth -= 1;
            }
            _ => self.print_value(value),
        }
    }

    fn print_value(&mut self, value: &Value) {
        match *value {
            Value::Unspecified => {}
            Value::EmptyList => self.out += "()",
            Value::Boolean(b) => self.out += if b { "#t" } else { "#f" },
            Value::Integer(n) => self.out += &n.to_string(),
            Value::Float(f) => self.out += &format_float(f),
            Value::Character(c) if self.write => self.out += &char_literal(c),
            Value::Character(c) => self.out.push(c),
            Value::Symbol(ref s) => self.out += s,
            Value::String(ref s) if self.write => self.out += &string_literal(s),
            Value::String(ref s) => self.out += s,
            Value::ByteVector(ref bytes) => {
                self.out += "#u8(";
                let bytes: Vec<String> = bytes.iter().map(|b| b.to_string()).collect();
                self.out += &bytes.join(" ");
                self.out += ")";
            }
            Value::Vector(id) => {
                if !self.path.insert(id) {
                    self.out += "...";
                    return;
                }
                self.out += "#(";
                let heap = self.heap;
                if let Some(values) = heap.vector(id) {
                    for (i, v) in values.iter().enumerate() {
                        if i > 0 {
                            self.out += " ";
                        }
                        self.print(v);
                    }
                }
                self.out += ")";
                self.path.remove(&id);
            }
            Value::Pair(id) => self.print_list(id),
            Value::Closure(_) | Value::Native(_) | Value::Capture | Value::Apply => self.out += "<procedure>",
            Value::Continuation(_) => self.out += "<continuation>",
            Value::Host(ref object) => {
                self.out += "<";
                self.out += object.class_name();
                self.out += ">";
            }
        }
    }

    fn print_list(&mut self, start: GcId) {
        let heap = self.heap;
        let mut entered = vec![];
        self.out += "(";
        let mut current = Value::Pair(start);
        let mut first = true;
        loop {
            match current {
                Value::EmptyList => break,
                Value::Pair(id) => {
                    if !self.path.insert(id) {
                        self.out += if first { "..." } else { " ..." };
                        break;
                    }
                    entered.push(id);
                    let (car, cdr) = match heap.pair(id) {
                        Some(pair) => pair,
                        None => break,
                    };
                    if !first {
                        self.out += " ";
                    }
                    first = false;
                    self.print(car);
                    current = cdr.clone();
                }
                ref tail => {
                    self.out += " . ";
                    self.print(tail);
                    break;
                }
            }
        }
        self.out += ")";
        for id in entered {
            self.path.remove(&id);
        }
    }
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "+nan.0".into()
    } else if f.is_infinite() {
        if f > 0.0 { "+inf.0" } else { "-inf.0" }.into()
    } else {
        format!("{:?}", f)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::reader::read;

    fn quoted(text: &str, heap: &mut Heap) -> Value {
        let datums = read(text, None).unwrap();
        Value::from_datum(&datums[0], heap)
    }

    #[test]
    fn print_quoted_data() {
        let mut heap = Heap::new();
        for text in &["(1 2 . 3)", "(a \"b\" #\\c)", "#(1 #(2) ())", "#u8(1 2)", "(1.5 -2)"] {
            let value = quoted(text, &mut heap);
            assert_eq!(&value.to_repl(&heap), text);
        }
    }

    #[test]
    fn display_is_raw() {
        let mut heap = Heap::new();
        let value = quoted("(\"a b\" #\\c)", &mut heap);
        assert_eq!(value.to_display(&heap), "(a b c)");
    }

    #[test]
    fn shared_structure_is_printed_twice() {
        let mut heap = Heap::new();
        let inner = quoted("(1)", &mut heap);
        let outer = heap.list(vec![inner.clone(), inner]);
        assert_eq!(outer.to_repl(&heap), "((1) (1))");
    }

    #[test]
    fn cycles_are_cut() {
        let mut heap = Heap::new();
        let pair = heap.cons(Value::Integer(1), Value::EmptyList);
        let id = pair.heap_id().unwrap();
        *heap.pair_mut(id).unwrap().1 = pair.clone();
        assert_eq!(pair.to_repl(&heap), "(1 ...)");
    }

    #[test]
    fn eqv_and_equal() {
        let mut heap = Heap::new();
        let a = quoted("(1 #(2 \"x\"))", &mut heap);
        let b = quoted("(1 #(2 \"x\"))", &mut heap);
        assert!(a != b);
        assert!(a.equal(&b, &heap));
        assert!(!a.equal(&quoted("(1 #(2 \"y\"))", &mut heap), &heap));
        assert_eq!(Value::symbol("x"), Value::symbol("x"));
    }

    #[test]
    fn deep_nesting_stays_off_the_native_stack() {
        let mut heap = Heap::new();
        let mut left = Value::EmptyList;
        let mut right = Value::EmptyList;
        for _ in 0..100_000 {
            left = heap.list(vec![left]);
            right = heap.list(vec![right]);
        }
        assert!(left.equal(&right, &heap));
        assert!(left.to_repl(&heap).contains("..."));
    }
}
