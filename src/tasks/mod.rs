pub mod store;
pub mod types;

pub use types::{NewTask, Priority, Task, TaskChange, TaskStatus};
