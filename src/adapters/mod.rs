pub mod in_memory_transaction_store;
pub mod postgres_transaction_store;

pub use in_memory_transaction_store::InMemoryTransactionStore;
pub use postgres_transaction_store::PostgresTransactionStore;
