pub mod locker;
pub mod sanitize;
pub mod template;

// Re-export commonly used types (used by test crate)
#[allow(unused_imports)]
pub use locker::{FileLock, InstanceLock, LockError, LockGuard, MemoryLock};
#[allow(unused_imports)]
pub use sanitize::{mask_token, sanitize, sanitize_with};
#[allow(unused_imports)]
pub use template::{render, render_json, TemplateVars};
