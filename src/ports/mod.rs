//! Seams between the payment service and its collaborators.

pub mod gateway;
pub mod repository;

pub use gateway::{
    GatewayError, GatewayInitiation, GatewayMode, GatewayStatusReport, InitiationRequest,
    PaymentGateway,
};
pub use repository::{RepositoryError, RepositoryResult, StatusChange, TransactionRepository};
