//! Domain model (ids, task records, statuses, ledger entries, errors, retry decisions).

pub mod decision;
pub mod errors;
pub mod ids;
pub mod ledger;
pub mod retry;
pub mod state;
pub mod task;
pub mod task_type;

pub use self::decision::{Decider, Decision, DefaultDecider};
pub use self::errors::{ErrorKind, HandlerError};
pub use self::ids::{ParseTaskIdError, TaskId};
pub use self::ledger::{LedgerEntry, OperationKind};
pub use self::retry::RetryPolicy;
pub use self::state::TaskStatus;
pub use self::task::{NewTask, TaskRecord};
pub use self::task_type::TaskType;
