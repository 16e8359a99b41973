//! External process handling: the concurrency census and the invoker.

pub mod guard;
pub mod invoke;

pub use guard::{PsCensus, ProcessCensus, check_budget, running_instances};
pub use invoke::{Invoker, RawResult};
