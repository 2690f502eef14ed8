//! Temporary-tensor cache.
//!
//! Compiled programs and the GEMM preparation steps allocate scratch
//! tensors at fixed call sites. The cache keeps those allocations alive
//! between invocations, keyed by `(site tag, element type)` with the shape
//! checked on retrieval: a shape mismatch on an otherwise matching key
//! drops the stale entry and allocates fresh.
//!
//! The store is thread-local, so concurrent tasks never share scratch
//! tensors. The enable flag is process-wide; toggling it mid-evaluation is
//! not supported. Retrieved tensors keep their previous contents; every
//! call site overwrites them with a `β = 0` accumulation before use.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::scalar::Scalar;
use crate::tensor::Tensor;

static CACHE_ENABLED: AtomicBool = AtomicBool::new(true);

thread_local! {
    static CACHE: RefCell<HashMap<(u64, TypeId), Box<dyn Any>>> = RefCell::new(HashMap::new());
}

/// Enable the temporary cache (the default).
pub fn enable_cache() {
    CACHE_ENABLED.store(true, Ordering::Relaxed);
}

/// Disable the temporary cache; every request allocates.
pub fn disable_cache() {
    CACHE_ENABLED.store(false, Ordering::Relaxed);
}

/// Whether the temporary cache is enabled.
pub fn cache_enabled() -> bool {
    CACHE_ENABLED.load(Ordering::Relaxed)
}

/// Drop all cached temporaries of the current thread.
pub fn flush_cache() {
    CACHE.with(|c| c.borrow_mut().clear());
}

/// Number of live entries in the current thread's cache.
pub fn cache_len() -> usize {
    CACHE.with(|c| c.borrow().len())
}

/// Take the tensor cached under `site` if its shape matches, otherwise
/// allocate a zero-initialized one.
///
/// The returned tensor's contents are unspecified when it came from the
/// cache; the caller must fully overwrite it.
pub fn take_or_alloc<T: Scalar>(site: u64, shape: &[usize]) -> Tensor<T> {
    if !cache_enabled() {
        return Tensor::zeros(shape);
    }
    let key = (site, TypeId::of::<T>());
    let cached = CACHE.with(|c| c.borrow_mut().remove(&key));
    if let Some(entry) = cached {
        if let Ok(tensor) = entry.downcast::<Tensor<T>>() {
            if tensor.shape() == shape {
                return *tensor;
            }
        }
    }
    Tensor::zeros(shape)
}

/// Return a temporary to the cache under `site`, overwriting any entry.
///
/// A no-op when the cache is disabled.
pub fn give_back<T: Scalar>(site: u64, tensor: Tensor<T>) {
    if !cache_enabled() {
        return;
    }
    let key = (site, TypeId::of::<T>());
    CACHE.with(|c| c.borrow_mut().insert(key, Box::new(tensor)));
}

#[cfg(test)]
mod tests {
    use super::*;

    // A single test keeps the process-wide enable flag from racing with
    // concurrently running tests.
    #[test]
    fn test_cache_behavior() {
        flush_cache();
        enable_cache();

        let mut t: Tensor<f64> = take_or_alloc(1001, &[2, 3]);
        t.fill(7.0);
        give_back(1001, t);
        assert_eq!(cache_len(), 1);

        // Matching shape: same storage comes back, stale contents included.
        let t2: Tensor<f64> = take_or_alloc(1001, &[2, 3]);
        assert_eq!(t2.data(), &[7.0; 6]);
        assert_eq!(cache_len(), 0);
        give_back(1001, t2);

        // Shape mismatch on the same site: fresh allocation.
        let t3: Tensor<f64> = take_or_alloc(1001, &[4]);
        assert_eq!(t3.data(), &[0.0; 4]);

        // Same site, different element type: no hit.
        let mut tf: Tensor<f64> = take_or_alloc(2002, &[2]);
        tf.fill(3.0);
        give_back(2002, tf);
        let ti: Tensor<i64> = take_or_alloc(2002, &[2]);
        assert_eq!(ti.data(), &[0, 0]);

        // Disabled: every request allocates and nothing is stored.
        flush_cache();
        disable_cache();
        let mut t4: Tensor<f64> = take_or_alloc(3003, &[2]);
        t4.fill(9.0);
        give_back(3003, t4);
        assert_eq!(cache_len(), 0);
        let t5: Tensor<f64> = take_or_alloc(3003, &[2]);
        assert_eq!(t5.data(), &[0.0, 0.0]);
        enable_cache();
    }
}
