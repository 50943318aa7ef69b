use std::slice;
use std::vec;

use crate::alloc;
use crate::error::PushError;

/// Capacity of a buffer after its first growth.
const INITIAL_CAPACITY: usize = 4;

/// A growable list with an explicit, fallible growth policy.
///
/// Capacity starts at zero, becomes 4 on the first push and doubles whenever
/// it is exhausted. A push that cannot grow the buffer leaves it unmodified.
/// This is the storage the parser collects sequence elements, variant
/// alternatives and character ranges in before handing them to a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer<T> {
    items: Vec<T>,
}

impl<T> Buffer<T> {
    pub const fn new() -> Buffer<T> {
        Buffer { items: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of elements the buffer can hold before it has to grow.
    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    /// Append a value to the end of the buffer.
    ///
    /// If the buffer needs to grow and the allocation fails, the buffer is left
    /// as it was and `value` is returned inside the error.
    pub fn push(&mut self, value: T) -> Result<(), PushError<T>> {
        if self.items.len() == self.items.capacity() {
            let target = match self.items.capacity() {
                0 => INITIAL_CAPACITY,
                n => n.saturating_mul(2),
            };
            let additional = target - self.items.len();
            if let Err(error) = alloc::try_reserve_exact(&mut self.items, additional) {
                return Err(PushError { value, error });
            }
        }
        self.items.push(value);
        Ok(())
    }

    /// Remove the last element. Returns `None`, and changes nothing, if the
    /// buffer is empty.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// Drop the last element, reporting whether there was one.
    pub fn pop_discard(&mut self) -> bool {
        self.items.pop().is_some()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.items
    }

    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Move every element out, keeping the allocation.
    pub fn drain(&mut self) -> vec::Drain<'_, T> {
        self.items.drain(..)
    }

    pub fn clear(&mut self) {
        self.items.clear()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T> Default for Buffer<T> {
    fn default() -> Self {
        Buffer::new()
    }
}

impl<T> IntoIterator for Buffer<T> {
    type Item = T;
    type IntoIter = vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Buffer<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
