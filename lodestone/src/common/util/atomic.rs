use std::sync::Arc;

use parking_lot::RwLock;

/// Shared state behind a `parking_lot` read-write lock.
pub type Atomic<T> = Arc<RwLock<T>>;

#[inline]
pub fn atomic<T>(t: T) -> Atomic<T> {
    Arc::new(RwLock::new(t))
}

pub trait ReadExecutor<T: ?Sized> {
    fn read_with<R>(&self, f: impl FnOnce(&T) -> R) -> R;
}

impl<T> ReadExecutor<T> for Atomic<T> {
    #[inline]
    fn read_with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let read_guard = self.read();
        f(&*read_guard)
    }
}

pub trait WriteExecutor<T: ?Sized> {
    fn write_with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R;
}

impl<T> WriteExecutor<T> for Atomic<T> {
    /// Runs `f` under the write lock. The lock is not reentrant, so `f` must
    /// never call back into user code that could touch the same value.
    #[inline]
    fn write_with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut write_guard = self.write();
        f(&mut *write_guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic() {
        let atomic_value = atomic(vec![1, 2]);
        assert_eq!(atomic_value.read().len(), 2);
    }

    #[test]
    fn test_read_with() {
        let atomic_value = atomic(5);
        let result = atomic_value.read_with(|value| *value + 1);
        assert_eq!(result, 6);
    }

    #[test]
    fn test_write_with() {
        let atomic_value = atomic(String::from("a"));
        atomic_value.write_with(|value| value.push('b'));
        assert_eq!(atomic_value.read().as_str(), "ab");
    }

    #[test]
    fn test_clones_share_state() {
        let first = atomic(0);
        let second = first.clone();
        second.write_with(|v| *v = 7);
        assert_eq!(first.read_with(|v| *v), 7);
    }
}
