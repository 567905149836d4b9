//! Purchasing domain module (event-sourced).
//!
//! Purchase orders and the receivings posted against them. A receiving moves
//! stock in; infra coordinates the inventory increments with the order's
//! received quantities.

pub mod order;
pub mod receiving;

pub use order::{
    AddLine, Approve, ClosePurchaseOrder, CreatePurchaseOrder, LineAdded, LineItem, PurchaseOrder,
    PurchaseOrderApproved, PurchaseOrderClosed, PurchaseOrderCommand, PurchaseOrderCreated,
    PurchaseOrderEvent, PurchaseOrderId, PurchaseOrderStatus, ReceiptLine, ReceiptRecorded,
    RecordReceipt,
};
pub use receiving::{
    OpenReceiving, PostReceiving, PurchaseReceiving, ReceivingCommand, ReceivingEvent,
    ReceivingId, ReceivingLine, ReceivingOpened, ReceivingPosted, ReceivingStatus,
    ReceivingVoided, VoidReceiving,
};
