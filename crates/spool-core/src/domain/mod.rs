//! Domain model (ids, task record, status machine, error taxonomy).

pub mod errors;
pub mod ids;
pub mod status;
pub mod task;

pub use self::errors::SpoolError;
pub use self::ids::TaskId;
pub use self::status::{TaskStatus, UnknownStatus};
pub use self::task::Task;
