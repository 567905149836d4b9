//! Sales domain module (event-sourced).
//!
//! A sale is the record of goods leaving stock, either materialized from a
//! quotation or recorded directly. Payments move it through
//! `pending -> partial -> paid`; a sale whose materialization was rolled back
//! is `discarded`.

pub mod sale;

pub use sale::{
    DiscardSale, NewSaleItem, PaymentRecorded, RecordPayment, RecordSale, Sale, SaleCommand,
    SaleDiscarded, SaleEvent, SaleId, SaleItem, SaleRecorded, SaleStatus,
};
