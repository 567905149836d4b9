//! Inventory domain module (event-sourced).
//!
//! Business rules for stocked items and inter-branch transfers, implemented
//! purely as deterministic domain logic (no IO, no storage).

pub mod item;
pub mod transfer;

pub use item::{
    AdjustQuantity, AdjustmentReason, CreateItem, DeactivateItem, InventoryCommand,
    InventoryEvent, InventoryItem, InventoryItemId, ItemCreated, ItemDeactivated,
    QuantityAdjusted,
};
pub use transfer::{
    CancelTransfer, CompleteTransfer, DestinationCredited, RecordDestinationCredit,
    RecordSourceDebit, RequestTransfer, SourceDebited, StockTransfer, StockTransferCommand,
    StockTransferEvent, StockTransferId, TransferCancelled, TransferCompleted, TransferRequested,
    TransferStatus,
};
