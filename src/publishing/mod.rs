mod publisher;
mod scheduler;

pub use publisher::{PublishOutcome, Publisher};
pub use scheduler::{CycleReport, Scheduler};
