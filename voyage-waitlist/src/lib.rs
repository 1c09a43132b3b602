pub mod promotion;
pub mod queue;
pub mod reminder;
pub mod service;

#[cfg(test)]
mod testing;

pub use promotion::{PromotionEngine, PromotionOutcome, PromotionSettings, SweepReport};
pub use queue::WaitingQueue;
pub use reminder::ReminderSweeper;
pub use service::{WaitingListService, WaitingStatus};
