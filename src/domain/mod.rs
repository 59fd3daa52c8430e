pub mod response;
pub mod transaction;

pub use response::{GatewayResponse, ResponseState};
pub use transaction::{LocalTransaction, TransactionKind, TransactionStatus};
