//! The evaluator's arena of heap objects and its mark-sweep collector
//!
//! Pairs, vectors, closures, invocations and continuations live in one slot
//! table owned by the VM. Values refer to them by `GcId`, so reference cycles
//! are ordinary and cost nothing until `collect` finds them unreachable.

use std::collections::HashSet;
use std::rc::Rc;

use crate::compiler::{Constant, Lambda};

use super::value::Value;
use super::Snapshot;

/// Handle to a heap object. The generation tells a live object apart from a
/// later occupant of the same slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GcId {
    index: u32,
    generation: u32,
}

/// A closure: a compiled lambda plus the invocation it was created in
#[derive(Debug, Clone)]
pub struct Closure {
    pub lambda: Rc<Lambda>,
    pub parent: Option<GcId>,
}

/// One activation of a closure and its variable slots. The global invocation
/// has no procedure.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub procedure: Option<GcId>,
    pub slots: Vec<Value>,
}

#[derive(Debug)]
pub enum Object {
    Pair(Value, Value),
    Vector(Vec<Value>),
    Closure(Closure),
    Invocation(Invocation),
    Continuation(Rc<Snapshot>),
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    mark: u64,
    object: Option<Object>,
}

/// Outcome of one collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectStats {
    pub marked: usize,
    pub freed: usize,
    pub live: usize,
}

/// Anything that holds references into the heap
pub trait Trace {
    fn trace(&self, marker: &mut Marker);
}

/// Gray set of a running collection
pub struct Marker {
    pending: Vec<GcId>,
    lambdas: HashSet<*const Lambda>,
}

impl Marker {
    pub fn mark(&mut self, id: GcId) {
        self.pending.push(id);
    }

    pub fn mark_value(&mut self, value: &Value) {
        if let Some(id) = value.heap_id() {
            self.pending.push(id);
        }
    }

    // Shared lambdas are walked once per collection
    pub fn mark_lambda(&mut self, lambda: &Rc<Lambda>) {
        if self.lambdas.insert(&**lambda as *const Lambda) {
            lambda.trace(self);
        }
    }
}

impl Trace for Value {
    fn trace(&self, marker: &mut Marker) {
        marker.mark_value(self);
    }
}

impl Trace for Lambda {
    fn trace(&self, marker: &mut Marker) {
        for constant in &self.constants {
            match *constant {
                Constant::Value(ref value) => marker.mark_value(value),
                Constant::Lambda(ref lambda) => marker.mark_lambda(lambda),
            }
        }
    }
}

impl Trace for Object {
    fn trace(&self, marker: &mut Marker) {
        match *self {
            Object::Pair(ref car, ref cdr) => {
                marker.mark_value(car);
                marker.mark_value(cdr);
            }
            Object::Vector(ref values) => values.iter().for_each(|v| marker.mark_value(v)),
            Object::Closure(Closure { ref lambda, parent }) => {
                marker.mark_lambda(lambda);
                if let Some(parent) = parent {
                    marker.mark(parent);
                }
            }
            Object::Invocation(Invocation { procedure, ref slots }) => {
                if let Some(procedure) = procedure {
                    marker.mark(procedure);
                }
                slots.iter().for_each(|v| marker.mark_value(v));
            }
            Object::Continuation(ref snapshot) => snapshot.trace(marker),
        }
    }
}

#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    color: u64,
}

impl Heap {
    pub fn new() -> Heap {
        Heap::default()
    }

    pub fn alloc(&mut self, object: Object) -> GcId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            slot.mark = self.color;
            return GcId {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            mark: self.color,
            object: Some(object),
        });
        GcId {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, id: GcId) -> Option<&Object> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.object.as_ref())
    }

    pub fn get_mut(&mut self, id: GcId) -> Option<&mut Object> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.object.as_mut())
    }

    /// Whether the object behind `id` has not been reclaimed yet
    pub fn is_live(&self, id: GcId) -> bool {
        self.get(id).is_some()
    }

    /// Number of objects currently allocated
    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    //
    // Typed access
    //
    pub fn cons(&mut self, car: Value, cdr: Value) -> Value {
        Value::Pair(self.alloc(Object::Pair(car, cdr)))
    }

    pub fn pair(&self, id: GcId) -> Option<(&Value, &Value)> {
        match self.get(id) {
            Some(Object::Pair(car, cdr)) => Some((car, cdr)),
            _ => None,
        }
    }

    pub fn pair_mut(&mut self, id: GcId) -> Option<(&mut Value, &mut Value)> {
        match self.get_mut(id) {
            Some(Object::Pair(car, cdr)) => Some((car, cdr)),
            _ => None,
        }
    }

    pub fn vector(&self, id: GcId) -> Option<&Vec<Value>> {
        match self.get(id) {
            Some(Object::Vector(values)) => Some(values),
            _ => None,
        }
    }

    pub fn vector_mut(&mut self, id: GcId) -> Option<&mut Vec<Value>> {
        match self.get_mut(id) {
            Some(Object::Vector(values)) => Some(values),
            _ => None,
        }
    }

    pub fn closure(&self, id: GcId) -> Option<&Closure> {
        match self.get(id) {
            Some(Object::Closure(closure)) => Some(closure),
            _ => None,
        }
    }

    pub fn closure_mut(&mut self, id: GcId) -> Option<&mut Closure> {
        match self.get_mut(id) {
            Some(Object::Closure(closure)) => Some(closure),
            _ => None,
        }
    }

    pub fn invocation(&self, id: GcId) -> Option<&Invocation> {
        match self.get(id) {
            Some(Object::Invocation(invocation)) => Some(invocation),
            _ => None,
        }
    }

    pub fn invocation_mut(&mut self, id: GcId) -> Option<&mut Invocation> {
        match self.get_mut(id) {
            Some(Object::Invocation(invocation)) => Some(invocation),
            _ => None,
        }
    }

    pub fn continuation(&self, id: GcId) -> Option<Rc<Snapshot>> {
        match self.get(id) {
            Some(Object::Continuation(snapshot)) => Some(snapshot.clone()),
            _ => None,
        }
    }

    /// Builds a proper list
    pub fn list(&mut self, values: Vec<Value>) -> Value {
        self.list_with_tail(values, Value::EmptyList)
    }

    /// Builds `(v1 v2 ... . tail)`
    pub fn list_with_tail(&mut self, values: Vec<Value>, tail: Value) -> Value {
        values
            .into_iter()
            .rev()
            .fold(tail, |cdr, car| self.cons(car, cdr))
    }

    /// The elements of a proper list, `None` for anything else (cycles included)
    pub fn list_to_vec(&self, value: &Value) -> Option<Vec<Value>> {
        let mut values = vec![];
        let mut current = value.clone();
        // A proper list cannot have more pairs than the heap has slots
        for _ in 0..=self.slots.len() {
            match current {
                Value::EmptyList => return Some(values),
                Value::Pair(id) => {
                    let (car, cdr) = self.pair(id)?;
                    values.push(car.clone());
                    current = cdr.clone();
                }
                _ => return None,
            }
        }
        None
    }

    //
    // Collection
    //

    /// Marks everything reachable from `roots`, then frees every other object
    pub fn collect(&mut self, roots: &dyn Trace) -> CollectStats {
        self.color += 1;
        let color = self.color;

        let mut marker = Marker {
            pending: vec![],
            lambdas: HashSet::new(),
        };
        roots.trace(&mut marker);

        let mut marked = 0;
        while let Some(id) = marker.pending.pop() {
            let slot = match self.slots.get_mut(id.index as usize) {
                Some(slot) if slot.generation == id.generation && slot.object.is_some() => slot,
                _ => continue,
            };
            if slot.mark == color {
                continue;
            }
            slot.mark = color;
            marked += 1;
            if let Some(ref object) = slot.object {
                object.trace(&mut marker);
            }
        }

        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.object.is_some() && slot.mark != color {
                slot.object = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                freed += 1;
            }
        }

        let stats = CollectStats {
            marked,
            freed,
            live: self.live_count(),
        };
        debug!("gc: {:?}", stats);
        stats
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Roots(Vec<Value>);

    impl Trace for Roots {
        fn trace(&self, marker: &mut Marker) {
            self.0.iter().for_each(|v| marker.mark_value(v));
        }
    }

    #[test]
    fn unreachable_cycle_is_freed() {
        let mut heap = Heap::new();
        let pair = heap.cons(Value::Integer(1), Value::EmptyList);
        let id = pair.heap_id().unwrap();
        *heap.pair_mut(id).unwrap().1 = pair.clone();

        let stats = heap.collect(&Roots(vec![pair.clone()]));
        assert_eq!(stats.freed, 0);
        assert!(heap.is_live(id));

        let stats = heap.collect(&Roots(vec![]));
        assert_eq!(stats.freed, 1);
        assert!(!heap.is_live(id));
    }

    #[test]
    fn reused_slot_gets_new_generation() {
        let mut heap = Heap::new();
        let old = heap.cons(Value::Integer(1), Value::EmptyList).heap_id().unwrap();
        heap.collect(&Roots(vec![]));
        let new = heap.cons(Value::Integer(2), Value::EmptyList).heap_id().unwrap();
        assert_eq!(old.index, new.index);
        assert!(!heap.is_live(old));
        assert!(heap.is_live(new));
    }

    #[test]
    fn lists() {
        let mut heap = Heap::new();
        let list = heap.list(vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(
            heap.list_to_vec(&list).map(|v| v.len()),
            Some(2)
        );
        let improper = heap.list_with_tail(vec![Value::Integer(1)], Value::Integer(2));
        assert!(heap.list_to_vec(&improper).is_none());
    }

    #[test]
    fn cyclic_list_is_not_a_list() {
        let mut heap = Heap::new();
        let pair = heap.cons(Value::Integer(1), Value::EmptyList);
        let id = pair.heap_id().unwrap();
        *heap.pair_mut(id).unwrap().1 = pair.clone();
        assert!(heap.list_to_vec(&pair).is_none());
    }
}
