use parking_lot::Mutex;
use std::sync::Arc;

/// Cheap cloneable handle to kernel-owned mutable state.
pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_shared<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}
