//! Read/write field pairs
//!
//! A `DoubleBuffer` holds two fields of identical shape. Passes read the read side and
//! write the write side, then the roles exchange. The two sides are handed out as
//! distinct types so a pass cannot bind one buffer as both input and output.

use std::ops::{Deref, DerefMut};

/// Pair of identically shaped fields with exchangeable read/write roles
#[derive(Debug)]
pub struct DoubleBuffer<T> {
    slots: [T; 2],
    read: usize,
}

/// Read-only view of the current read side
#[derive(Debug)]
pub struct ReadSide<'a, T>(&'a T);

/// Exclusive view of the current write side
#[derive(Debug)]
pub struct WriteSide<'a, T>(&'a mut T);

impl<T> Deref for ReadSide<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.0
    }
}

impl<T> Deref for WriteSide<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.0
    }
}

impl<T> DerefMut for WriteSide<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.0
    }
}

impl<T> DoubleBuffer<T> {
    /// Wrap two fields; `first` starts as the read side
    pub fn new(first: T, second: T) -> Self {
        Self {
            slots: [first, second],
            read: 0,
        }
    }

    /// Current read side
    pub fn read(&self) -> &T {
        &self.slots[self.read]
    }

    /// Mutable read side, for uploads between passes
    pub fn read_mut(&mut self) -> &mut T {
        &mut self.slots[self.read]
    }

    /// Index (0 or 1) of the slot currently playing the read role
    pub fn read_index(&self) -> usize {
        self.read
    }

    /// Borrow the read side and the write side at once
    pub fn split(&mut self) -> (ReadSide<'_, T>, WriteSide<'_, T>) {
        let [first, second] = &mut self.slots;
        if self.read == 0 {
            (ReadSide(first), WriteSide(second))
        } else {
            (ReadSide(second), WriteSide(first))
        }
    }

    /// Exchange read and write roles
    pub fn swap(&mut self) {
        self.read ^= 1;
    }

    /// Run one pass that writes this buffer, then swap exactly once
    pub fn write_pass<R>(&mut self, pass: impl FnOnce(ReadSide<'_, T>, WriteSide<'_, T>) -> R) -> R {
        let result = {
            let (read, write) = self.split();
            pass(read, write)
        };
        self.swap();
        result
    }

    /// Both slots, in slot order
    pub fn slots(&self) -> impl Iterator<Item = &T> {
        self.slots.iter()
    }

    /// Both slots, for whole-buffer operations such as clearing
    pub fn slots_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut()
    }
}
