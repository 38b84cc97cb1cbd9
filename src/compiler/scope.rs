//! Compile-time name resolution
//!
//! Scopes form a chain from the innermost form out to the global scope. They
//! are kept in a stack addressed by index; a scope is pushed when the compiler
//! enters a lambda or a `let-syntax` body and popped when it leaves it.
//! Syntactic scopes hold macros only and are transparent to variable depth.

use std::collections::HashMap;
use std::rc::Rc;

use crate::helpers::ImmutableString;
use crate::reader::Datum;
use crate::vm::{GcId, Heap, Value};

use super::bytecode::Constant;
use super::macros::Transformer;

/// Index of a live scope
pub type ScopeRef = usize;

pub const GLOBAL_SCOPE: ScopeRef = 0;
pub const TOP_LEVEL_SCOPE: ScopeRef = 1;

/// Identity of a scope, never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variable {
    /// Value-scope boundaries between the use and the binding
    pub depth: usize,
    pub index: usize,
    scope: ScopeId,
}

#[derive(Debug, Clone)]
pub enum Binding {
    Variable(Variable),
    Macro(Rc<Transformer>),
    /// Auxiliary syntax such as `else`
    Literal(ImmutableString),
}

impl Binding {
    /// Whether both refer to the same definition, wherever they were resolved from
    pub fn same(&self, other: &Binding) -> bool {
        match (self, other) {
            (Binding::Variable(a), Binding::Variable(b)) => a.scope == b.scope && a.index == b.index,
            (Binding::Macro(a), Binding::Macro(b)) => Rc::ptr_eq(a, b),
            (Binding::Literal(a), Binding::Literal(b)) => a == b,
            _ => false,
        }
    }
}

// An initializer waiting to be compiled, with the scope it was written in
#[derive(Debug, Clone)]
struct Deferred {
    name: ImmutableString,
    form: Datum,
    scope: ScopeRef,
    scope_id: ScopeId,
}

/// An initializer due for compilation into slot `index` of its value scope
#[derive(Debug)]
pub struct Pending {
    pub index: usize,
    pub name: ImmutableString,
    pub form: Datum,
    /// Where to compile `form`
    pub scope: ScopeRef,
}

#[derive(Debug)]
struct Scope {
    id: ScopeId,
    parent: Option<ScopeRef>,
    syntactic: bool,
    bindings: HashMap<ImmutableString, Binding>,
    variable_count: usize,
    constants: Vec<Constant>,
    deferred: Vec<Option<Deferred>>,
    /// Where the slots live when they exist before the code runs
    invocation: Option<GcId>,
}

/// Top-level state to restore when a datum fails to compile
pub struct Checkpoint {
    bindings: HashMap<ImmutableString, Binding>,
    variable_count: usize,
    constant_count: usize,
    deferred: Vec<Option<Deferred>>,
}

#[derive(Debug)]
pub struct Scopes {
    stack: Vec<Scope>,
    next_id: u32,
}

impl Scopes {
    /// The global scope and the top-level scope nested in it, with the
    /// invocations holding their slots
    pub fn new(global: GcId, top_level: GcId) -> Scopes {
        let mut scopes = Scopes {
            stack: vec![],
            next_id: 0,
        };
        scopes.push(None, false, Some(global));
        scopes.push(Some(GLOBAL_SCOPE), false, Some(top_level));
        scopes
    }

    fn push(&mut self, parent: Option<ScopeRef>, syntactic: bool, invocation: Option<GcId>) -> ScopeRef {
        let id = ScopeId(self.next_id);
        self.next_id += 1;
        self.stack.push(Scope {
            id,
            parent,
            syntactic,
            bindings: HashMap::new(),
            variable_count: 0,
            constants: vec![],
            deferred: vec![],
            invocation,
        });
        self.stack.len() - 1
    }

    /// A scope with its own slots, for a lambda body
    pub fn push_value_scope(&mut self, parent: ScopeRef) -> ScopeRef {
        self.push(Some(parent), false, None)
    }

    /// A scope for macros only
    pub fn push_syntactic_scope(&mut self, parent: ScopeRef) -> ScopeRef {
        self.push(Some(parent), true, None)
    }

    /// Drops `scope` and everything pushed after it
    pub fn pop(&mut self, scope: ScopeRef) {
        if scope > TOP_LEVEL_SCOPE {
            self.stack.truncate(scope);
        }
    }

    /// Finishes a lambda scope, returning its slot count and constants
    pub fn finish(&mut self, scope: ScopeRef) -> (usize, Vec<Constant>) {
        let constants = std::mem::replace(&mut self.stack[scope].constants, vec![]);
        let count = self.stack[scope].variable_count;
        self.pop(scope);
        (count, constants)
    }

    // Nearest scope that owns slots
    fn value_scope(&self, mut scope: ScopeRef) -> ScopeRef {
        while self.stack[scope].syntactic {
            match self.stack[scope].parent {
                Some(parent) => scope = parent,
                None => break,
            }
        }
        scope
    }

    pub fn resolve(&self, scope: ScopeRef, name: &str) -> Option<Binding> {
        let mut depth = 0;
        let mut current = Some(scope);
        while let Some(s) = current {
            let scope = &self.stack[s];
            if let Some(binding) = scope.bindings.get(name) {
                return Some(match *binding {
                    Binding::Variable(variable) => Binding::Variable(Variable { depth, ..variable }),
                    ref binding => binding.clone(),
                });
            }
            if !scope.syntactic {
                depth += 1;
            }
            current = scope.parent;
        }
        None
    }

    /// Binds `name` to a slot of the nearest value scope. The initializer, if
    /// any, is compiled at the next flush; a value is stored right away when the
    /// slot already exists in an invocation.
    pub fn add_variable(
        &mut self,
        scope: ScopeRef,
        name: &str,
        init: Option<Datum>,
        value: Option<Value>,
        heap: &mut Heap,
    ) -> Variable {
        let owner = self.value_scope(scope);
        let deferred = init.map(|form| Deferred {
            name: name.into(),
            form,
            scope,
            scope_id: self.stack[scope].id,
        });

        let target = &mut self.stack[owner];
        let id = target.id;
        let existing = match target.bindings.get(name) {
            Some(Binding::Variable(variable)) if variable.scope == id => Some(variable.index),
            _ => None,
        };

        let index = match existing {
            Some(index) => {
                if deferred.is_some() {
                    target.deferred[index] = deferred;
                }
                index
            }
            None => {
                let index = target.variable_count;
                target.variable_count += 1;
                target.deferred.push(deferred);
                let variable = Variable { depth: 0, index, scope: id };
                target.bindings.insert(name.into(), Binding::Variable(variable));
                index
            }
        };

        if let Some(invocation) = target.invocation.and_then(|i| heap.invocation_mut(i)) {
            while invocation.slots.len() <= index {
                invocation.slots.push(Value::Unspecified);
            }
            if let Some(value) = value {
                invocation.slots[index] = value;
            }
        }

        Variable { depth: 0, index, scope: id }
    }

    pub fn define_macro(&mut self, scope: ScopeRef, name: &str, transformer: Rc<Transformer>) {
        self.stack[scope].bindings.insert(name.into(), Binding::Macro(transformer));
    }

    pub fn add_literal(&mut self, scope: ScopeRef, name: &str) {
        self.stack[scope]
            .bindings
            .insert(name.into(), Binding::Literal(name.into()));
    }

    /// Adds a constant to the nearest value scope and returns its index
    pub fn add_constant(&mut self, scope: ScopeRef, constant: Constant) -> usize {
        let owner = self.value_scope(scope);
        let constants = &mut self.stack[owner].constants;
        constants.push(constant);
        constants.len() - 1
    }

    pub fn constants(&self, scope: ScopeRef) -> &[Constant] {
        &self.stack[self.value_scope(scope)].constants
    }

    /// Takes the pending initializers of the nearest value scope, in slot order
    pub fn take_deferred(&mut self, scope: ScopeRef) -> Vec<Pending> {
        let owner = self.value_scope(scope);
        let pending: Vec<(usize, Deferred)> = self.stack[owner]
            .deferred
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| slot.take().map(|d| (index, d)))
            .collect();

        pending
            .into_iter()
            .map(|(index, deferred)| {
                // The defining scope may be gone already (a finished let-syntax body)
                let alive = self
                    .stack
                    .get(deferred.scope)
                    .map(|s| s.id == deferred.scope_id)
                    .unwrap_or(false);
                Pending {
                    index,
                    name: deferred.name,
                    form: deferred.form,
                    scope: if alive { deferred.scope } else { owner },
                }
            })
            .collect()
    }

    pub fn has_deferred(&self, scope: ScopeRef) -> bool {
        self.stack[self.value_scope(scope)]
            .deferred
            .iter()
            .any(Option::is_some)
    }

    pub fn checkpoint(&self) -> Checkpoint {
        let top = &self.stack[TOP_LEVEL_SCOPE];
        Checkpoint {
            bindings: top.bindings.clone(),
            variable_count: top.variable_count,
            constant_count: top.constants.len(),
            deferred: top.deferred.clone(),
        }
    }

    /// Forgets everything the failed datum added to the top level
    pub fn rollback(&mut self, checkpoint: Checkpoint, heap: &mut Heap) {
        self.stack.truncate(TOP_LEVEL_SCOPE + 1);
        let top = &mut self.stack[TOP_LEVEL_SCOPE];
        top.bindings = checkpoint.bindings;
        top.variable_count = checkpoint.variable_count;
        top.constants.truncate(checkpoint.constant_count);
        top.deferred = checkpoint.deferred;
        if let Some(invocation) = top.invocation.and_then(|i| heap.invocation_mut(i)) {
            invocation.slots.truncate(checkpoint.variable_count);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vm::{Invocation, Object};

    fn scopes(heap: &mut Heap) -> Scopes {
        let global = heap.alloc(Object::Invocation(Invocation {
            procedure: None,
            slots: vec![],
        }));
        let top = heap.alloc(Object::Invocation(Invocation {
            procedure: None,
            slots: vec![],
        }));
        Scopes::new(global, top)
    }

    fn variable(binding: Option<Binding>) -> (usize, usize) {
        match binding {
            Some(Binding::Variable(v)) => (v.depth, v.index),
            other => panic!("not a variable: {:?}", other),
        }
    }

    #[test]
    fn depth_counts_value_scopes_only() {
        let mut heap = Heap::new();
        let mut scopes = scopes(&mut heap);
        scopes.add_variable(GLOBAL_SCOPE, "car", None, None, &mut heap);
        let lambda = scopes.push_value_scope(TOP_LEVEL_SCOPE);
        scopes.add_variable(lambda, "x", None, None, &mut heap);
        let syntax = scopes.push_syntactic_scope(lambda);
        scopes.add_variable(syntax, "y", None, None, &mut heap);

        assert_eq!(variable(scopes.resolve(syntax, "x")), (0, 0));
        assert_eq!(variable(scopes.resolve(syntax, "y")), (0, 1));
        assert_eq!(variable(scopes.resolve(syntax, "car")), (2, 0));
        assert!(scopes.resolve(syntax, "cdr").is_none());
    }

    #[test]
    fn bindings_compare_by_definition() {
        let mut heap = Heap::new();
        let mut scopes = scopes(&mut heap);
        scopes.add_literal(GLOBAL_SCOPE, "else");
        scopes.add_variable(TOP_LEVEL_SCOPE, "x", None, None, &mut heap);
        let inner = scopes.push_value_scope(TOP_LEVEL_SCOPE);
        let outer_x = scopes.resolve(TOP_LEVEL_SCOPE, "x").unwrap();
        let inner_x = scopes.resolve(inner, "x").unwrap();
        assert!(outer_x.same(&inner_x));
        assert!(scopes.resolve(inner, "else").unwrap().same(&Binding::Literal("else".into())));
        scopes.add_variable(inner, "x", None, None, &mut heap);
        assert!(!outer_x.same(&scopes.resolve(inner, "x").unwrap()));
    }

    #[test]
    fn top_level_slots_live_in_the_invocation() {
        let mut heap = Heap::new();
        let mut scopes = scopes(&mut heap);
        let var = scopes.add_variable(GLOBAL_SCOPE, "one", None, Some(Value::Integer(1)), &mut heap);
        let global = scopes.stack[GLOBAL_SCOPE].invocation.unwrap();
        assert_eq!(heap.invocation(global).unwrap().slots[var.index], Value::Integer(1));
    }

    #[test]
    fn rollback_restores_top_level() {
        let mut heap = Heap::new();
        let mut scopes = scopes(&mut heap);
        scopes.add_variable(TOP_LEVEL_SCOPE, "a", None, None, &mut heap);
        let checkpoint = scopes.checkpoint();
        scopes.add_variable(TOP_LEVEL_SCOPE, "b", None, None, &mut heap);
        scopes.add_constant(TOP_LEVEL_SCOPE, Constant::Value(Value::Integer(3)));
        scopes.push_value_scope(TOP_LEVEL_SCOPE);
        scopes.rollback(checkpoint, &mut heap);

        assert!(scopes.resolve(TOP_LEVEL_SCOPE, "a").is_some());
        assert!(scopes.resolve(TOP_LEVEL_SCOPE, "b").is_none());
        assert!(scopes.constants(TOP_LEVEL_SCOPE).is_empty());
        let top = scopes.stack[TOP_LEVEL_SCOPE].invocation.unwrap();
        assert_eq!(heap.invocation(top).unwrap().slots.len(), 1);
    }

    #[test]
    fn deferred_from_a_popped_scope_falls_back_to_its_owner() {
        let mut heap = Heap::new();
        let mut scopes = scopes(&mut heap);
        let lambda = scopes.push_value_scope(TOP_LEVEL_SCOPE);
        let syntax = scopes.push_syntactic_scope(lambda);
        let form = crate::reader::read("1", None).unwrap().remove(0);
        scopes.add_variable(syntax, "x", Some(form), None, &mut heap);
        scopes.pop(syntax);
        assert!(scopes.has_deferred(lambda));
        let pending = scopes.take_deferred(lambda);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].index, 0);
        assert_eq!(&pending[0].name[..], "x");
        assert_eq!(pending[0].scope, lambda);
        assert!(!scopes.has_deferred(lambda));
    }
}
