//! Fallible allocation helpers.
//!
//! Everything that can fail to allocate while building rules goes through
//! here, so allocation failure surfaces as an [`AllocError`] instead of an
//! abort. Under `cfg(test)` a per-thread countdown can force failures.

use std::alloc::{self, Layout};

use crate::error::AllocError;

fn array_layout<T>(n: usize) -> Layout {
    Layout::array::<T>(n).unwrap_or_else(|_| Layout::new::<T>())
}

/// Moves `value` to the heap. On failure `value` is dropped.
pub(crate) fn try_box<T>(value: T) -> Result<Box<T>, AllocError> {
    let layout = Layout::new::<T>();
    injected_failure(layout)?;
    if layout.size() == 0 {
        return Ok(Box::new(value));
    }

    // SAFETY: `layout` has a non-zero size.
    let ptr = unsafe { alloc::alloc(layout) } as *mut T;
    if ptr.is_null() {
        return Err(AllocError::new(layout));
    }
    // SAFETY: `ptr` is non-null, aligned for `T` and was allocated by the
    // global allocator with `T`'s layout, which is what `Box` expects.
    unsafe {
        ptr.write(value);
        Ok(Box::from_raw(ptr))
    }
}

/// An empty vector with room for exactly `capacity` elements.
pub(crate) fn try_vec<T>(capacity: usize) -> Result<Vec<T>, AllocError> {
    let mut vec = Vec::new();
    try_reserve_exact(&mut vec, capacity)?;
    Ok(vec)
}

/// Makes room for `additional` more elements, amortized.
pub(crate) fn try_reserve<T>(vec: &mut Vec<T>, additional: usize) -> Result<(), AllocError> {
    if vec.capacity() - vec.len() >= additional {
        return Ok(());
    }
    let layout = array_layout::<T>(vec.len().saturating_add(additional));
    injected_failure(layout)?;
    vec.try_reserve(additional)
        .map_err(|_| AllocError::new(layout))
}

/// Makes room for exactly `additional` more elements.
pub(crate) fn try_reserve_exact<T>(vec: &mut Vec<T>, additional: usize) -> Result<(), AllocError> {
    if vec.capacity() - vec.len() >= additional {
        return Ok(());
    }
    let layout = array_layout::<T>(vec.len().saturating_add(additional));
    injected_failure(layout)?;
    vec.try_reserve_exact(additional)
        .map_err(|_| AllocError::new(layout))
}

/// Appends `value`, growing amortized. On failure `value` is dropped and
/// `vec` is untouched.
pub(crate) fn try_push<T>(vec: &mut Vec<T>, value: T) -> Result<(), AllocError> {
    try_reserve(vec, 1)?;
    vec.push(value);
    Ok(())
}

pub(crate) fn try_string(s: &str) -> Result<String, AllocError> {
    let mut out = String::new();
    if !s.is_empty() {
        let layout = array_layout::<u8>(s.len());
        injected_failure(layout)?;
        out.try_reserve_exact(s.len())
            .map_err(|_| AllocError::new(layout))?;
    }
    out.push_str(s);
    Ok(out)
}

pub(crate) fn try_copy<T: Copy>(items: &[T]) -> Result<Vec<T>, AllocError> {
    let mut out = try_vec(items.len())?;
    out.extend_from_slice(items);
    Ok(out)
}

#[cfg(test)]
thread_local! {
    static FAIL_AFTER: std::cell::Cell<Option<usize>> = std::cell::Cell::new(None);
}

/// Lets the next `successes` allocations on this thread through, then fails
/// every one after that. `None` switches injection off.
#[cfg(test)]
pub(crate) fn fail_after(successes: Option<usize>) {
    FAIL_AFTER.with(|c| c.set(successes));
}

#[cfg(test)]
fn injected_failure(layout: Layout) -> Result<(), AllocError> {
    let fail = FAIL_AFTER.with(|c| match c.get() {
        Some(0) => true,
        Some(n) => {
            c.set(Some(n - 1));
            false
        }
        None => false,
    });
    if fail {
        Err(AllocError::new(layout))
    } else {
        Ok(())
    }
}

#[cfg(not(test))]
#[inline(always)]
fn injected_failure(_layout: Layout) -> Result<(), AllocError> {
    Ok(())
}
