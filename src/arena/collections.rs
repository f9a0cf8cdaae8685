/*!
 * Arena Collections
 * Growable vector and string whose storage lives in an arena
 */

use super::allocator::ArenaAllocator;
use std::fmt;
use std::mem::size_of;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

/// Vector backed by arena memory
///
/// Growing abandons the old buffer inside the arena; it is reclaimed with
/// the arena. Elements are dropped with the vector.
pub struct ArenaVec<'a, T> {
    allocator: &'a ArenaAllocator,
    ptr: NonNull<T>,
    len: usize,
    cap: usize,
}

impl<'a, T> ArenaVec<'a, T> {
    pub fn new_in(allocator: &'a ArenaAllocator) -> Self {
        Self {
            allocator,
            ptr: NonNull::dangling(),
            len: 0,
            cap: if size_of::<T>() == 0 { usize::MAX } else { 0 },
        }
    }

    /// `None` if the arena cannot supply `capacity` elements
    pub fn with_capacity_in(capacity: usize, allocator: &'a ArenaAllocator) -> Option<Self> {
        let mut vec = Self::new_in(allocator);
        vec.reserve(capacity).then_some(vec)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Make room for `additional` more elements; false when the arena is exhausted
    pub fn reserve(&mut self, additional: usize) -> bool {
        let Some(required) = self.len.checked_add(additional) else {
            return false;
        };
        if required <= self.cap {
            return true;
        }
        let new_cap = required.max(self.cap.saturating_mul(2)).max(4);
        let Some(slots) = self.allocator.alloc_array::<T>(new_cap) else {
            return false;
        };
        let new_ptr = slots.as_mut_ptr().cast::<T>();
        // SAFETY: the old buffer holds `len` initialised elements and the new
        // one is a fresh, disjoint range of at least `len` slots.
        unsafe { std::ptr::copy_nonoverlapping(self.ptr.as_ptr(), new_ptr, self.len) };
        self.ptr = NonNull::new(new_ptr).unwrap_or(self.ptr);
        self.cap = new_cap;
        true
    }

    /// Append `value`, handing it back if the arena is exhausted
    pub fn try_push(&mut self, value: T) -> Result<(), T> {
        if self.len == self.cap && !self.reserve(1) {
            return Err(value);
        }
        // SAFETY: len < cap, so the slot is in bounds and uninitialised.
        unsafe { self.ptr.as_ptr().add(self.len).write(value) };
        self.len += 1;
        Ok(())
    }

    /// Append `value`; panics if the arena is exhausted
    pub fn push(&mut self, value: T) {
        if self.try_push(value).is_err() {
            panic!("arena exhausted while growing ArenaVec");
        }
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        // SAFETY: the element at `len` was initialised and is now logically moved out.
        Some(unsafe { self.ptr.as_ptr().add(self.len).read() })
    }

    pub fn clear(&mut self) {
        let elements: *mut [T] = self.as_mut_slice();
        self.len = 0;
        // SAFETY: the slice covered exactly the initialised elements.
        unsafe { std::ptr::drop_in_place(elements) };
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: the first `len` elements are initialised.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: the first `len` elements are initialised.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T> Deref for ArenaVec<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T> DerefMut for ArenaVec<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T: fmt::Debug> fmt::Debug for ArenaVec<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T> Extend<T> for ArenaVec<'_, T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.push(value);
        }
    }
}

impl<T> Drop for ArenaVec<'_, T> {
    fn drop(&mut self) {
        self.clear();
    }
}

/// UTF-8 string backed by arena memory
pub struct ArenaString<'a> {
    bytes: ArenaVec<'a, u8>,
}

impl<'a> ArenaString<'a> {
    pub fn new_in(allocator: &'a ArenaAllocator) -> Self {
        Self {
            bytes: ArenaVec::new_in(allocator),
        }
    }

    /// Copy of `value` in the arena
    pub fn from_str_in(value: &str, allocator: &'a ArenaAllocator) -> Option<Self> {
        let mut string = Self::new_in(allocator);
        string.try_push_str(value).then_some(string)
    }

    /// Append `value`; false when the arena is exhausted
    pub fn try_push_str(&mut self, value: &str) -> bool {
        if !self.bytes.reserve(value.len()) {
            return false;
        }
        for &byte in value.as_bytes() {
            // Capacity was reserved above
            let _ = self.bytes.try_push(byte);
        }
        true
    }

    pub fn push_str(&mut self, value: &str) {
        if !self.try_push_str(value) {
            panic!("arena exhausted while growing ArenaString");
        }
    }

    pub fn push(&mut self, ch: char) {
        let mut buf = [0u8; 4];
        self.push_str(ch.encode_utf8(&mut buf));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_str(&self) -> &str {
        // SAFETY: only whole `str` values are ever appended.
        unsafe { std::str::from_utf8_unchecked(self.bytes.as_slice()) }
    }
}

impl Deref for ArenaString<'_> {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ArenaString<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for ArenaString<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl PartialEq<str> for ArenaString<'_> {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for ArenaString<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}
