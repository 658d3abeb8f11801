pub mod expiry_sweeper;
pub mod payment;

pub use payment::{PaymentError, PaymentService};
