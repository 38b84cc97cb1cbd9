//! Natively implemented standard procedures

use std::cmp::Ordering;
use std::rc::Rc;

use crate::reader::{read, DatumKind};

use super::heap::{Heap, Object};
use super::host;
use super::value::{NativeProcedure, Value};

type Primitive = fn(&mut Heap, &[Value]) -> Result<Value, String>;

/// Required argument count and whether more are accepted
type Arity = (usize, bool);

// Procedures the machine implements itself
static INTRINSICS: [&str; 3] = ["apply", "call/cc", "call-with-current-continuation"];

pub(super) static STDLIB: &[(&str, Primitive, Arity)] = &[
    ("+", add, (0, true)),
    ("-", subtract, (1, true)),
    ("*", multiply, (0, true)),
    ("/", divide, (1, true)),
    ("=", number_eq, (1, true)),
    ("<", number_lt, (1, true)),
    (">", number_gt, (1, true)),
    ("<=", number_le, (1, true)),
    (">=", number_ge, (1, true)),
    ("zero?", is_zero, (1, false)),
    ("not", not, (1, false)),
    ("boolean=?", boolean_eq, (1, true)),
    ("eq?", eqv, (2, false)),
    ("eqv?", eqv, (2, false)),
    ("equal?", equal, (2, false)),
    ("char->integer", char_to_integer, (1, false)),
    ("integer->char", integer_to_char, (1, false)),
    ("char=?", char_eq, (1, true)),
    ("char<?", char_lt, (1, true)),
    ("char>?", char_gt, (1, true)),
    ("char<=?", char_le, (1, true)),
    ("char>=?", char_ge, (1, true)),
    ("make-string", make_string, (1, true)),
    ("string", string, (0, true)),
    ("string-length", string_length, (1, false)),
    ("string-ref", string_ref, (2, false)),
    ("string=?", string_eq, (1, true)),
    ("string<?", string_lt, (1, true)),
    ("string>?", string_gt, (1, true)),
    ("string<=?", string_le, (1, true)),
    ("string>=?", string_ge, (1, true)),
    ("substring", substring, (3, false)),
    ("string-append", string_append, (0, true)),
    ("string->list", string_to_list, (1, false)),
    ("list->string", list_to_string, (1, false)),
    ("string-copy", string_copy, (1, true)),
    ("number->string", number_to_string, (1, false)),
    ("string->number", string_to_number, (1, false)),
    ("symbol->string", symbol_to_string, (1, false)),
    ("string->symbol", string_to_symbol, (1, false)),
    ("symbol=?", symbol_eq, (1, true)),
    ("cons", cons, (2, false)),
    ("car", car, (1, false)),
    ("cdr", cdr, (1, false)),
    ("set-car!", set_car, (2, false)),
    ("set-cdr!", set_cdr, (2, false)),
    ("list", list, (0, true)),
    ("append", append, (0, true)),
    ("length", length, (1, false)),
    ("reverse", reverse, (1, false)),
    ("list-tail", list_tail, (2, false)),
    ("list-ref", list_ref, (2, false)),
    ("memq", memv, (2, false)),
    ("memv", memv, (2, false)),
    ("member", member, (2, false)),
    ("assq", assv, (2, false)),
    ("assv", assv, (2, false)),
    ("assoc", assoc, (2, false)),
    ("make-vector", make_vector, (1, true)),
    ("vector", vector, (0, true)),
    ("vector-length", vector_length, (1, false)),
    ("vector-ref", vector_ref, (2, false)),
    ("vector-set!", vector_set, (3, false)),
    ("vector->list", vector_to_list, (1, false)),
    ("list->vector", list_to_vector, (1, false)),
    ("vector-fill!", vector_fill, (2, false)),
    ("vector-append", vector_append, (0, true)),
    ("bytevector", bytevector, (0, true)),
    ("bytevector-length", bytevector_length, (1, false)),
    ("bytevector-u8-ref", bytevector_u8_ref, (2, false)),
    ("pair?", is_pair, (1, false)),
    ("null?", is_null, (1, false)),
    ("list?", is_list, (1, false)),
    ("vector?", is_vector, (1, false)),
    ("bytevector?", is_bytevector, (1, false)),
    ("boolean?", is_boolean, (1, false)),
    ("symbol?", is_symbol, (1, false)),
    ("number?", is_number, (1, false)),
    ("integer?", is_integer, (1, false)),
    ("float?", is_float, (1, false)),
    ("char?", is_char, (1, false)),
    ("string?", is_string, (1, false)),
    ("procedure?", is_procedure, (1, false)),
    ("display", display, (1, false)),
    ("newline", newline, (0, false)),
    ("debug", debug, (0, true)),
    ("host-object?", host::is_host_object, (1, false)),
    ("host-parent", host::host_parent, (1, false)),
    ("host-children", host::host_children, (1, false)),
    ("host-property", host::host_property, (2, false)),
    ("host-set-property!", host::host_set_property, (3, false)),
    ("host-invoke", host::host_invoke, (2, true)),
];

/// The standard procedure called `name`
pub fn procedure(name: &str) -> Option<Value> {
    match name {
        "apply" => return Some(Value::Apply),
        "call/cc" | "call-with-current-continuation" => return Some(Value::Capture),
        _ => {}
    }
    STDLIB
        .iter()
        .find(|entry| entry.0 == name)
        .map(|&(name, primitive, arity)| {
            Value::Native(NativeProcedure::new(
                name,
                arity,
                Rc::new(move |heap: &mut Heap, values: &[Value]| primitive(heap, values).map(Some)),
            ))
        })
}

/// Names of every standard procedure
pub fn names() -> impl Iterator<Item = &'static str> {
    INTRINSICS.iter().cloned().chain(STDLIB.iter().map(|entry| entry.0))
}

//
// Argument extraction
//

fn invalid() -> String {
    "Invalid argument.".to_string()
}

fn invalid_index() -> String {
    "Invalid index.".to_string()
}

fn integer(value: &Value) -> Result<i64, String> {
    match *value {
        Value::Integer(n) => Ok(n),
        _ => Err(invalid()),
    }
}

// An index into a sequence of `len` elements; `inclusive` admits `len` itself
fn index(value: &Value, len: usize, inclusive: bool) -> Result<usize, String> {
    let n = integer(value)?;
    check!(n >= 0, invalid_index());
    let n = n as usize;
    check!(n < len || inclusive && n == len, invalid_index());
    Ok(n)
}

fn character(value: &Value) -> Result<char, String> {
    match *value {
        Value::Character(c) => Ok(c),
        _ => Err(invalid()),
    }
}

fn text(value: &Value) -> Result<&str, String> {
    match *value {
        Value::String(ref s) => Ok(s),
        _ => Err(invalid()),
    }
}

fn symbol(value: &Value) -> Result<&str, String> {
    match *value {
        Value::Symbol(ref s) => Ok(s),
        _ => Err(invalid()),
    }
}

fn boolean(value: &Value) -> Result<bool, String> {
    match *value {
        Value::Boolean(b) => Ok(b),
        _ => Err(invalid()),
    }
}

fn elements(heap: &Heap, list: &Value) -> Result<Vec<Value>, String> {
    heap.list_to_vec(list).ok_or_else(invalid)
}

fn pair(heap: &Heap, value: &Value) -> Result<(Value, Value), String> {
    match *value {
        Value::Pair(id) => heap
            .pair(id)
            .map(|(car, cdr)| (car.clone(), cdr.clone()))
            .ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

fn items(heap: &Heap, value: &Value) -> Result<Vec<Value>, String> {
    match *value {
        Value::Vector(id) => heap.vector(id).cloned().ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

fn bytes(value: &Value) -> Result<&[u8], String> {
    match *value {
        Value::ByteVector(ref bytes) => Ok(bytes),
        _ => Err(invalid()),
    }
}

// Applies `extract` to every argument and checks the relation holds between
// neighbours
macro_rules! chain {
    ($name:ident, $extract:ident, $op:tt) => {
        fn $name(_: &mut Heap, values: &[Value]) -> Result<Value, String> {
            let operands = values.iter().map($extract).collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Boolean(operands.windows(2).all(|w| w[0] $op w[1])))
        }
    };
}

macro_rules! predicate {
    ($name:ident, $test:ident) => {
        fn $name(_: &mut Heap, values: &[Value]) -> Result<Value, String> {
            Ok(Value::Boolean(values[0].$test()))
        }
    };
}

//
// Numbers
//

#[derive(Debug, Clone, Copy)]
enum Number {
    Integer(i64),
    Float(f64),
}

impl Number {
    fn to_float(self) -> f64 {
        match self {
            Number::Integer(n) => n as f64,
            Number::Float(f) => f,
        }
    }

    fn is_zero(self) -> bool {
        match self {
            Number::Integer(n) => n == 0,
            Number::Float(f) => f == 0.0,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Number::Integer(n) => Value::Integer(n),
            Number::Float(f) => Value::Float(f),
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Number) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Number) -> Option<Ordering> {
        match (*self, *other) {
            (Number::Integer(a), Number::Integer(b)) => a.partial_cmp(&b),
            (a, b) => a.to_float().partial_cmp(&b.to_float()),
        }
    }
}

fn number(value: &Value) -> Result<Number, String> {
    match *value {
        Value::Integer(n) => Ok(Number::Integer(n)),
        Value::Float(f) => Ok(Number::Float(f)),
        _ => Err(invalid()),
    }
}

// Integers stay integers until a float joins in
fn arithmetic(a: Number, b: Number, checked: fn(i64, i64) -> Option<i64>, float: fn(f64, f64) -> f64) -> Result<Number, String> {
    match (a, b) {
        (Number::Integer(a), Number::Integer(b)) => checked(a, b)
            .map(Number::Integer)
            .ok_or_else(|| "Integer overflow.".to_string()),
        (a, b) => Ok(Number::Float(float(a.to_float(), b.to_float()))),
    }
}

fn quotient(a: Number, b: Number) -> Result<Number, String> {
    check!(!b.is_zero(), "Division by zero.".to_string());
    match (a, b) {
        (Number::Integer(a), Number::Integer(b)) => match a.checked_rem(b) {
            Some(0) => a
                .checked_div(b)
                .map(Number::Integer)
                .ok_or_else(|| "Integer overflow.".to_string()),
            Some(_) => Ok(Number::Float(a as f64 / b as f64)),
            None => Err("Integer overflow.".to_string()),
        },
        (a, b) => Ok(Number::Float(a.to_float() / b.to_float())),
    }
}

fn fold(values: &[Value], start: Number, op: impl Fn(Number, Number) -> Result<Number, String>) -> Result<Value, String> {
    let mut acc = start;
    for value in values {
        acc = op(acc, number(value)?)?;
    }
    Ok(acc.into_value())
}

fn add(_: &mut Heap, values: &[Value]) -> Result<Value, String> {
    fold(values, Number::Integer(0), |a, b| arithmetic(a, b, i64::checked_add, |x, y| x + y))
}

fn multiply(_: &mut Heap, values: &[Value]) -> Result<Value, String> {
    fold(values, Number::Integer(1), |a, b| arithmetic(a, b, i64::checked_mul, |x, y| x * y))
}

fn subtract(_: &mut Heap, values: &[Value]) -> Result<Value, String> {
    let sub = |a, b| arithmetic(a, b, i64::checked_sub, |x, y| x - y);
    match values {
        [only] => sub(Number::Integer(0), number(only)?).map(Number::into_value),
        _ => fold(&values[1..], number(&values[0])?, sub),
    }
}

fn divide(_: &mut Heap, values: &[Value]) -> Result<Value, String> {
    match values {
        [only] => quotient(Number::Integer(1), number(only)?).map(Number::into_value),
        _ => fold(&values[1..], number(&values[0])?, quotient),
    }
}

chain!(number_eq, number, ==);
chain!(number_lt, number, <);
chain!(number_gt, number, >);
chain!(number_le, number, <=);
chain!(number_ge, number, >=);

fn is_zero(_: &mut Heap, values: &[Value]) -> Result<Value, String> {
    Ok(Value::Boolean(number(&values[0])?.is_zero()))
}

fn number_to_string(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    number(&values[0])?;
    Ok(Value::string(&values[0].to_repl(heap)))
}

// Anything that does not read as exactly one number gives #f
fn string_to_number(_: &mut Heap, values: &[Value]) -> Result<Value, String> {
    let datums = match read(text(&values[0])?, None) {
        Ok(datums) => datums,
        Err(_) => return Ok(Value::Boolean(false)),
    };
    Ok(match datums.as_slice() {
        [datum] => match datum.kind {
            DatumKind::Integer(n) => Value::Integer(n),
            DatumKind::Float(f) => Value::Float(f),
            _ => Value::Boolean(false),
        },
        _ => Value::Boolean(false),
    })
}

//
// Booleans and equivalence
//

fn not(_: &mut Heap, values: &[Value]) -> Result<Value, String> {
    Ok(Value::Boolean(!values[0].is_true()))
}

chain!(boolean_eq, boolean, ==);

fn eqv(_: &mut Heap, values: &[Value]) -> Result<Value, String> {
    Ok(Value::Boolean(values[0] == values[1]))
}

fn equal(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    Ok(Value::Boolean(values[0].equal(&values[1], heap)))
}

//
// Characters
//

fn char_to_integer(_: &mut Heap, values: &[Value]) -> Result<Value, String> {
    Ok(Value::Integer(u32::from(character(&values[0])?).into()))
}

fn integer_to_char(_: &mut Heap, values: &[Value]) -> Result<Value, String> {
    let n = integer(&values[0])?;
    check!(n >= 0 && n <= i64::from(u32::max_value()), invalid());
    std::char::from_u32(n as u32).map(Value::Character).ok_or_else(invalid)
}

chain!(char_eq, character, ==);
chain!(char_lt, character, <);
chain!(char_gt, character, >);
chain!(char_le, character, <=);
chain!(char_ge, character, >=);

//
// Strings and symbols
//

fn make_string(_: &mut Heap, values: &[Value]) -> Result<Value, String> {
    check!(values.len() <= 2, invalid());
    let count = integer(&values[0])?;
    check!(count >= 0, invalid());
    let fill = match values.get(1) {
        Some(value) => character(value)?,
        None => ' ',
    };
    Ok(Value::string(&std::iter::repeat(fill).take(count as usize).collect::<String>()))
}

fn string(_: &mut Heap, values: &[Value]) -> Result<Value, String> {
    let s = values.iter().map(character).collect::<Result<String, _>>()?;
    Ok(Value::string(&s))
}

fn string_length(_: &mut Heap, values: &[Value]) -> Result<Value, String> {
    Ok(Value::Integer(text(&values[0])?.chars().count() as i64))
}

fn string_ref(_: &mut Heap, values: &[Value]) -> Result<Value, String> {
    let s = text(&values[0])?;
    let at = index(&values[1], s.chars().count(), false)?;
    s.chars().nth(at).map(Value::Character).ok_or_else(invalid_index)
}

chain!(string_eq, text, ==);
chain!(string_lt, text, <);
chain!(string_gt, text, >);
chain!(string_le, text, <=);
chain!(string_ge, text, >=);

// Characters `start..end` of `s`, both checked against its length
fn slice(s: &str, start: Option<&Value>, end: Option<&Value>) -> Result<String, String> {
    let len = s.chars().count();
    let start = match start {
        Some(value) => index(value, len, true)?,
        None => 0,
    };
    let end = match end {
        Some(value) => index(value, len, true)?,
        None => len,
    };
    check!(start <= end, invalid_index());
    Ok(s.chars().skip(start).take(end - start).collect())
}

fn substring(_: &mut Heap, values: &[Value]) -> Result<Value, String> {
    let s = slice(text(&values[0])?, values.get(1), values.get(2))?;
    Ok(Value::string(&s))
}

fn string_copy(_: &mut Heap, values: &[Value]) -> Result<Value, String> {
    check!(values.len() <= 3, invalid());
    let s = slice(text(&values[0])?, values.get(1), values.get(2))?;
    Ok(Value::string(&s))
}

fn string_append(_: &mut Heap, values: &[Value]) -> Result<Value, String> {
    let parts = values.iter().map(text).collect::<Result<Vec<_>, _>>()?;
    Ok(Value::string(&parts.concat()))
}

fn string_to_list(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    let chars = text(&values[0])?.chars().map(Value::Character).collect();
    Ok(heap.list(chars))
}

fn list_to_string(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    let s = elements(heap, &values[0])?
        .iter()
        .map(character)
        .collect::<Result<String, _>>()?;
    Ok(Value::string(&s))
}

fn symbol_to_string(_: &mut Heap, values: &[Value]) -> Result<Value, String> {
    Ok(Value::string(symbol(&values[0])?))
}

fn string_to_symbol(_: &mut Heap, values: &[Value]) -> Result<Value, String> {
    Ok(Value::symbol(text(&values[0])?))
}

chain!(symbol_eq, symbol, ==);

//
// Pairs and lists
//

fn cons(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    Ok(heap.cons(values[0].clone(), values[1].clone()))
}

fn car(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    pair(heap, &values[0]).map(|(car, _)| car)
}

fn cdr(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    pair(heap, &values[0]).map(|(_, cdr)| cdr)
}

fn set_car(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    let id = match values[0] {
        Value::Pair(id) => id,
        _ => return Err(invalid()),
    };
    let (car, _) = heap.pair_mut(id).ok_or_else(invalid)?;
    *car = values[1].clone();
    Ok(Value::Unspecified)
}

fn set_cdr(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    let id = match values[0] {
        Value::Pair(id) => id,
        _ => return Err(invalid()),
    };
    let (_, cdr) = heap.pair_mut(id).ok_or_else(invalid)?;
    *cdr = values[1].clone();
    Ok(Value::Unspecified)
}

fn list(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    Ok(heap.list(values.to_vec()))
}

// Every list but the last is copied; the last becomes the shared tail
fn append(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    let (last, init) = match values.split_last() {
        Some(split) => split,
        None => return Ok(Value::EmptyList),
    };
    let mut copied = vec![];
    for list in init {
        copied.extend(elements(heap, list)?);
    }
    Ok(heap.list_with_tail(copied, last.clone()))
}

fn length(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    Ok(Value::Integer(elements(heap, &values[0])?.len() as i64))
}

fn reverse(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    let mut reversed = elements(heap, &values[0])?;
    reversed.reverse();
    Ok(heap.list(reversed))
}

fn list_tail(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    let k = integer(&values[1])?;
    check!(k >= 0, invalid_index());
    let mut current = values[0].clone();
    for _ in 0..k {
        current = match current {
            Value::Pair(_) => pair(heap, &current)?.1,
            _ => return Err(invalid_index()),
        };
    }
    Ok(current)
}

fn list_ref(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    match list_tail(heap, values)? {
        Value::Pair(id) => heap.pair(id).map(|(car, _)| car.clone()).ok_or_else(invalid),
        _ => Err(invalid_index()),
    }
}

// The first sublist whose car matches, or #f
fn find_tail(heap: &Heap, values: &[Value], same: fn(&Value, &Value, &Heap) -> bool) -> Result<Value, String> {
    elements(heap, &values[1])?;
    let mut current = values[1].clone();
    while let Value::Pair(_) = current {
        let (car, cdr) = pair(heap, &current)?;
        if same(&values[0], &car, heap) {
            return Ok(current);
        }
        current = cdr;
    }
    Ok(Value::Boolean(false))
}

// The first association whose key matches, or #f
fn find_entry(heap: &Heap, values: &[Value], same: fn(&Value, &Value, &Heap) -> bool) -> Result<Value, String> {
    for entry in elements(heap, &values[1])? {
        let (key, _) = pair(heap, &entry)?;
        if same(&values[0], &key, heap) {
            return Ok(entry);
        }
    }
    Ok(Value::Boolean(false))
}

fn identical(a: &Value, b: &Value, _: &Heap) -> bool {
    a == b
}

fn alike(a: &Value, b: &Value, heap: &Heap) -> bool {
    a.equal(b, heap)
}

fn memv(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    find_tail(heap, values, identical)
}

fn member(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    find_tail(heap, values, alike)
}

fn assv(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    find_entry(heap, values, identical)
}

fn assoc(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    find_entry(heap, values, alike)
}

//
// Vectors and bytevectors
//

fn make_vector(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    check!(values.len() <= 2, invalid());
    let count = integer(&values[0])?;
    check!(count >= 0, invalid());
    let fill = values.get(1).cloned().unwrap_or(Value::Unspecified);
    Ok(Value::Vector(heap.alloc(Object::Vector(vec![fill; count as usize]))))
}

fn vector(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    Ok(Value::Vector(heap.alloc(Object::Vector(values.to_vec()))))
}

fn vector_length(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    Ok(Value::Integer(items(heap, &values[0])?.len() as i64))
}

fn vector_ref(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    let items = items(heap, &values[0])?;
    let at = index(&values[1], items.len(), false)?;
    Ok(items[at].clone())
}

fn vector_set(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    let id = match values[0] {
        Value::Vector(id) => id,
        _ => return Err(invalid()),
    };
    let items = heap.vector_mut(id).ok_or_else(invalid)?;
    let at = index(&values[1], items.len(), false)?;
    items[at] = values[2].clone();
    Ok(Value::Unspecified)
}

fn vector_to_list(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    let items = items(heap, &values[0])?;
    Ok(heap.list(items))
}

fn list_to_vector(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    let items = elements(heap, &values[0])?;
    Ok(Value::Vector(heap.alloc(Object::Vector(items))))
}

fn vector_fill(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    let id = match values[0] {
        Value::Vector(id) => id,
        _ => return Err(invalid()),
    };
    for item in heap.vector_mut(id).ok_or_else(invalid)?.iter_mut() {
        *item = values[1].clone();
    }
    Ok(Value::Unspecified)
}

fn vector_append(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    let mut joined = vec![];
    for value in values {
        joined.extend(items(heap, value)?);
    }
    Ok(Value::Vector(heap.alloc(Object::Vector(joined))))
}

fn bytevector(_: &mut Heap, values: &[Value]) -> Result<Value, String> {
    let mut octets = Vec::with_capacity(values.len());
    for value in values {
        let n = integer(value)?;
        check!(n >= 0 && n <= 255, invalid());
        octets.push(n as u8);
    }
    Ok(Value::ByteVector(octets.into()))
}

fn bytevector_length(_: &mut Heap, values: &[Value]) -> Result<Value, String> {
    Ok(Value::Integer(bytes(&values[0])?.len() as i64))
}

fn bytevector_u8_ref(_: &mut Heap, values: &[Value]) -> Result<Value, String> {
    let octets = bytes(&values[0])?;
    let at = index(&values[1], octets.len(), false)?;
    Ok(Value::Integer(i64::from(octets[at])))
}

//
// Type predicates
//

predicate!(is_pair, is_pair);
predicate!(is_null, is_null);
predicate!(is_vector, is_vector);
predicate!(is_bytevector, is_bytevector);
predicate!(is_boolean, is_boolean);
predicate!(is_symbol, is_symbol);
predicate!(is_number, is_number);
predicate!(is_char, is_char);
predicate!(is_string, is_string);
predicate!(is_procedure, is_procedure);

fn is_list(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    Ok(Value::Boolean(heap.list_to_vec(&values[0]).is_some()))
}

fn is_integer(_: &mut Heap, values: &[Value]) -> Result<Value, String> {
    Ok(Value::Boolean(match values[0] {
        Value::Integer(_) => true,
        Value::Float(f) => f.is_finite() && f.fract() == 0.0,
        _ => false,
    }))
}

fn is_float(_: &mut Heap, values: &[Value]) -> Result<Value, String> {
    Ok(Value::Boolean(match values[0] {
        Value::Float(_) => true,
        _ => false,
    }))
}

//
// Output
//

fn display(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    print!("{}", values[0].to_display(heap));
    Ok(Value::Unspecified)
}

fn newline(_: &mut Heap, _: &[Value]) -> Result<Value, String> {
    println!();
    Ok(Value::Unspecified)
}

fn debug(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    let parts: Vec<String> = values.iter().map(|v| v.to_repl(heap)).collect();
    info!("{}", parts.join(" "));
    Ok(Value::Unspecified)
}

#[cfg(test)]
mod test {
    use super::*;

    fn call(heap: &mut Heap, name: &str, arguments: &[Value]) -> Result<Value, String> {
        match procedure(name) {
            Some(Value::Native(native)) => {
                assert!(native.accepts(arguments.len()), "arity of {}", name);
                (native.function)(heap, arguments).map(|v| v.unwrap())
            }
            other => panic!("{} is {:?}", name, other),
        }
    }

    #[test]
    fn every_name_resolves() {
        for name in names() {
            assert!(procedure(name).is_some(), "{}", name);
        }
        assert!(procedure("no-such-procedure").is_none());
        assert_eq!(procedure("apply"), Some(Value::Apply));
        assert_eq!(procedure("call/cc"), Some(Value::Capture));
    }

    #[test]
    fn numeric_promotion() {
        let mut heap = Heap::new();
        let (one, two) = (Value::Integer(1), Value::Integer(2));
        assert_eq!(call(&mut heap, "+", &[one.clone(), Value::Float(2.0)]), Ok(Value::Float(3.0)));
        assert_eq!(call(&mut heap, "/", &[Value::Integer(4), two.clone()]), Ok(two.clone()));
        assert_eq!(call(&mut heap, "/", &[one.clone(), two.clone()]), Ok(Value::Float(0.5)));
        assert_eq!(call(&mut heap, "/", &[two.clone()]), Ok(Value::Float(0.5)));
        assert_eq!(call(&mut heap, "-", &[two.clone()]), Ok(Value::Integer(-2)));
        assert_eq!(call(&mut heap, "-", &[two, one.clone(), one.clone()]), Ok(Value::Integer(0)));
        assert_eq!(call(&mut heap, "*", &[]), Ok(Value::Integer(1)));
    }

    #[test]
    fn arithmetic_failures() {
        let mut heap = Heap::new();
        assert_eq!(
            call(&mut heap, "/", &[Value::Integer(1), Value::Integer(0)]),
            Err("Division by zero.".to_string())
        );
        assert_eq!(
            call(&mut heap, "+", &[Value::Integer(i64::max_value()), Value::Integer(1)]),
            Err("Integer overflow.".to_string())
        );
        assert_eq!(
            call(&mut heap, "+", &[Value::Integer(1), Value::string("1")]),
            Err("Invalid argument.".to_string())
        );
        assert_eq!(
            call(&mut heap, "/", &[Value::Integer(i64::min_value()), Value::Integer(-1)]),
            Err("Integer overflow.".to_string())
        );
        assert_eq!(
            call(&mut heap, "/", &[Value::Integer(i64::min_value()), Value::Integer(2)]),
            Ok(Value::Integer(i64::min_value() / 2))
        );
    }

    #[test]
    fn comparisons_chain() {
        let mut heap = Heap::new();
        let numbers = [Value::Integer(1), Value::Float(1.5), Value::Integer(2)];
        assert_eq!(call(&mut heap, "<", &numbers), Ok(Value::Boolean(true)));
        assert_eq!(call(&mut heap, ">", &numbers), Ok(Value::Boolean(false)));
        assert_eq!(
            call(&mut heap, "=", &[Value::Integer(1), Value::Float(1.0)]),
            Ok(Value::Boolean(true))
        );
        assert_eq!(
            call(&mut heap, "string<?", &[Value::string("abc"), Value::string("abd")]),
            Ok(Value::Boolean(true))
        );
    }

    #[test]
    fn lists() {
        let mut heap = Heap::new();
        let a = heap.list(vec![Value::Integer(1), Value::Integer(2)]);
        let b = heap.list(vec![Value::Integer(3)]);
        let joined = call(&mut heap, "append", &[a.clone(), b.clone()]).unwrap();
        assert_eq!(joined.to_repl(&heap), "(1 2 3)");
        assert_eq!(call(&mut heap, "length", &[joined.clone()]), Ok(Value::Integer(3)));
        assert_eq!(call(&mut heap, "list-ref", &[joined.clone(), Value::Integer(2)]), Ok(Value::Integer(3)));
        assert_eq!(
            call(&mut heap, "list-ref", &[joined.clone(), Value::Integer(3)]),
            Err("Invalid index.".to_string())
        );
        let tail = call(&mut heap, "memv", &[Value::Integer(2), joined.clone()]).unwrap();
        assert_eq!(tail.to_repl(&heap), "(2 3)");
        assert_eq!(call(&mut heap, "car", &[Value::EmptyList]), Err("Invalid argument.".to_string()));

        let improper = heap.cons(Value::Integer(1), Value::Integer(2));
        assert_eq!(call(&mut heap, "list?", &[improper.clone()]), Ok(Value::Boolean(false)));
        assert!(call(&mut heap, "length", &[improper]).is_err());
    }

    #[test]
    fn strings() {
        let mut heap = Heap::new();
        let s = Value::string("héllo");
        assert_eq!(call(&mut heap, "string-length", &[s.clone()]), Ok(Value::Integer(5)));
        assert_eq!(call(&mut heap, "string-ref", &[s.clone(), Value::Integer(1)]), Ok(Value::Character('é')));
        let sub = call(&mut heap, "substring", &[s, Value::Integer(1), Value::Integer(3)]).unwrap();
        assert_eq!(sub.to_repl(&heap), "\"él\"");
        assert_eq!(call(&mut heap, "string->number", &[Value::string("#x10")]), Ok(Value::Integer(16)));
        assert_eq!(call(&mut heap, "string->number", &[Value::string("abc")]), Ok(Value::Boolean(false)));
    }

    #[test]
    fn vectors() {
        let mut heap = Heap::new();
        let v = call(&mut heap, "make-vector", &[Value::Integer(2), Value::Integer(0)]).unwrap();
        call(&mut heap, "vector-set!", &[v.clone(), Value::Integer(1), Value::Integer(7)]).unwrap();
        assert_eq!(v.to_repl(&heap), "#(0 7)");
        assert_eq!(
            call(&mut heap, "vector-ref", &[v, Value::Integer(-1)]),
            Err("Invalid index.".to_string())
        );
        let b = call(&mut heap, "bytevector", &[Value::Integer(1), Value::Integer(255)]).unwrap();
        assert_eq!(call(&mut heap, "bytevector-u8-ref", &[b, Value::Integer(1)]), Ok(Value::Integer(255)));
    }
}
