//! Infrastructure layer: event store, command dispatch, and the services
//! that reconcile quotations, sales, transfers and receivings with the
//! inventory ledger.

pub mod clock;
pub mod command_dispatcher;
pub mod config;
pub mod context;
pub mod event_store;
pub mod ledger;
pub mod notify;
pub mod numbering;
pub mod purchasing;
pub mod quotation_service;
pub mod saga;
pub mod sale_materializer;
pub mod transfer_engine;

pub use command_dispatcher::{CommandDispatcher, Committed, DispatchError};
pub use config::ReconcileConfig;
pub use context::{InMemoryContext, ServiceContext};
pub use ledger::{InventoryLedger, NewItem};
pub use notify::Notifier;
pub use numbering::NumberingService;
pub use purchasing::{NewOrderLine, PurchasingService};
pub use quotation_service::{NewQuotation, QuotationService};
pub use sale_materializer::{DirectSale, Materialized, SaleMaterializer};
pub use transfer_engine::{ResumeReport, TransferEngine};

#[cfg(test)]
mod integration_tests;
