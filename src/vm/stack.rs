use std::fmt::{self, Debug};

use super::heap::{Marker, Trace};
use super::value::Value;

/// The machine's operand and call stacks
#[derive(Clone)]
pub(super) struct Stack<T>(Vec<T>);

impl<T> Stack<T> {
    pub fn push(&mut self, it: T) {
        self.0.push(it);
    }

    pub fn pop(&mut self) -> Option<T> {
        self.0.pop()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Removes the top `n` values, returning them bottom first
    pub fn split_top(&mut self, n: usize) -> Option<Vec<T>> {
        if n > self.0.len() {
            return None;
        }
        let at = self.0.len() - n;
        Some(self.0.split_off(at))
    }

    /// Bottom to top
    pub fn iter(&self) -> std::slice::Iter<T> {
        self.0.iter()
    }
}

impl<T: Debug> Debug for Stack<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_list().entries(self.0.iter().rev()).finish()
    }
}

impl<T> Default for Stack<T> {
    fn default() -> Stack<T> {
        Stack(Vec::new())
    }
}

impl Trace for Stack<Value> {
    fn trace(&self, marker: &mut Marker) {
        for value in self.0.iter() {
            marker.mark_value(value);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn debug_lists_the_top_first() {
        let mut stack = Stack::default();
        for i in 0..4 {
            stack.push(i);
        }
        assert_eq!(stack.pop(), Some(3));
        assert_eq!(format!("{:?}", stack), "[2, 1, 0]");
    }

    #[test]
    fn split_top_keeps_order() {
        let mut stack = Stack::default();
        for i in 0..4 {
            stack.push(i);
        }
        assert_eq!(stack.split_top(3), Some(vec![1, 2, 3]));
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.split_top(2), None);
        assert_eq!(stack.split_top(0), Some(vec![]));
    }
}
