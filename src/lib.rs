pub mod api;
pub mod batch;
pub mod config;
pub mod error;
pub mod logging;
pub mod notify;
pub mod report;
pub mod retail;

pub use api::{OnWayInvoice, SaturnClient};
pub use batch::{plan_invoices, BatchLimits, DocNumberSequence, InvoiceLine, InvoiceSpec, StockRow};
pub use config::Config;
pub use error::{Result, ServiceError};
pub use notify::{notify_deliveries, DeliverySummary};
pub use retail::{submit_invoices, SubmissionResult, SubmissionStatus};
