pub mod in_memory_transaction_store;
pub mod live_gateway;
pub mod mock_gateway;

pub use in_memory_transaction_store::InMemoryTransactionStore;
pub use live_gateway::LiveGateway;
pub use mock_gateway::{FixedOutcome, MockGateway, OutcomeSource, RandomOutcome};
