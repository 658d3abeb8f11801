pub mod client;

pub use client::{provider_error_message, MpesaClient};
