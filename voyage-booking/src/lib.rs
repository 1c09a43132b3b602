pub mod admin;
pub mod admission;
pub mod finance;
pub mod service;

#[cfg(test)]
mod testing;

pub use admin::InventoryAdmin;
pub use service::{BookingLimits, BookingService, CancellationReceipt, PaymentReceipt};
