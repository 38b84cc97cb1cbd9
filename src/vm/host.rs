//! Reflection over objects owned by the embedding application

use std::fmt::Debug;
use std::rc::Rc;

use super::heap::Heap;
use super::value::Value;

/// An object the host exposes to scripts. Scripts can walk the object tree,
/// read and write named properties and invoke named methods.
pub trait HostObject: Debug {
    fn class_name(&self) -> &str;

    fn parent(&self) -> Option<Rc<dyn HostObject>> {
        None
    }

    fn children(&self) -> Vec<Rc<dyn HostObject>> {
        vec![]
    }

    fn property(&self, name: &str) -> Option<Variant>;

    fn set_property(&self, name: &str, value: Variant) -> Result<(), String>;

    fn invoke(&self, method: &str, arguments: Vec<Variant>) -> Result<Variant, String> {
        let _ = arguments;
        Err(format!("Unknown method {}.", method))
    }
}

/// The host-side representation of a script value
#[derive(Debug, Clone)]
pub enum Variant {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Variant>),
    Bytes(Vec<u8>),
    Object(Rc<dyn HostObject>),
}

impl PartialEq for Variant {
    fn eq(&self, other: &Variant) -> bool {
        use self::Variant::*;

        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (String(a), String(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (Object(a), Object(b)) => Rc::as_ptr(a) as *const u8 == Rc::as_ptr(b) as *const u8,
            _ => false,
        }
    }
}

impl Variant {
    pub fn into_value(self, heap: &mut Heap) -> Value {
        match self {
            Variant::Null => Value::Unspecified,
            Variant::Bool(b) => Value::Boolean(b),
            Variant::Int(n) => Value::Integer(n),
            Variant::Float(f) => Value::Float(f),
            Variant::String(s) => Value::string(&s),
            Variant::List(items) => {
                let values = items.into_iter().map(|v| v.into_value(heap)).collect();
                heap.list(values)
            }
            Variant::Bytes(bytes) => Value::ByteVector(bytes.into()),
            Variant::Object(object) => Value::Host(object),
        }
    }

    /// Converts a script value; procedures and improper lists have no host form
    pub fn from_value(value: &Value, heap: &Heap) -> Result<Variant, String> {
        let variant = match *value {
            Value::Unspecified => Variant::Null,
            Value::Boolean(b) => Variant::Bool(b),
            Value::Integer(n) => Variant::Int(n),
            Value::Float(f) => Variant::Float(f),
            Value::Character(c) => Variant::String(c.to_string()),
            Value::Symbol(ref s) | Value::String(ref s) => Variant::String(s.to_string()),
            Value::ByteVector(ref bytes) => Variant::Bytes(bytes.to_vec()),
            Value::EmptyList | Value::Pair(_) => {
                let values = heap.list_to_vec(value).ok_or_else(|| "Invalid argument.".to_string())?;
                Variant::List(Variant::from_values(&values, heap)?)
            }
            Value::Vector(id) => {
                let values = heap.vector(id).ok_or_else(|| "Invalid argument.".to_string())?;
                Variant::List(Variant::from_values(values, heap)?)
            }
            Value::Host(ref object) => Variant::Object(object.clone()),
            _ => return Err("Invalid argument.".to_string()),
        };
        Ok(variant)
    }

    fn from_values(values: &[Value], heap: &Heap) -> Result<Vec<Variant>, String> {
        values.iter().map(|v| Variant::from_value(v, heap)).collect()
    }
}

fn object(value: &Value) -> Result<&Rc<dyn HostObject>, String> {
    match *value {
        Value::Host(ref object) => Ok(object),
        _ => Err("Invalid argument.".to_string()),
    }
}

fn name(value: &Value) -> Result<&str, String> {
    match *value {
        Value::String(ref s) | Value::Symbol(ref s) => Ok(s),
        _ => Err("Invalid argument.".to_string()),
    }
}

pub(super) fn is_host_object(_: &mut Heap, values: &[Value]) -> Result<Value, String> {
    Ok(Value::Boolean(values.iter().all(Value::is_host)))
}

pub(super) fn host_parent(_: &mut Heap, values: &[Value]) -> Result<Value, String> {
    let parent = object(&values[0])?.parent();
    Ok(parent.map(Value::Host).unwrap_or(Value::Boolean(false)))
}

pub(super) fn host_children(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    let children = object(&values[0])?.children().into_iter().map(Value::Host).collect();
    Ok(heap.list(children))
}

pub(super) fn host_property(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    let property = name(&values[1])?;
    match object(&values[0])?.property(property) {
        Some(variant) => Ok(variant.into_value(heap)),
        None => Err(format!("Unknown property {}.", property)),
    }
}

pub(super) fn host_set_property(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    let value = Variant::from_value(&values[2], heap)?;
    object(&values[0])?.set_property(name(&values[1])?, value)?;
    Ok(Value::Unspecified)
}

pub(super) fn host_invoke(heap: &mut Heap, values: &[Value]) -> Result<Value, String> {
    let arguments = Variant::from_values(&values[2..], heap)?;
    let result = object(&values[0])?.invoke(name(&values[1])?, arguments)?;
    Ok(result.into_value(heap))
}
