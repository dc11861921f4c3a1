pub mod workdir_lock;

pub use workdir_lock::{WorkdirLock, WorkdirLockGuard};
