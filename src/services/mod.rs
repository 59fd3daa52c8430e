pub mod completion;
pub mod purchase;
pub mod refund;
pub mod webhook;

pub use completion::{CompletionError, CompletionReconciler, PollSettings};
pub use purchase::{OrderLine, PurchaseInitiator, PurchaseOrder, ReturnUrls};
pub use refund::{RefundError, RefundService};
pub use webhook::{ReconcileError, WebhookEntity, WebhookEvent, WebhookReconciler};
