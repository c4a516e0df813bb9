mod client;

pub use client::{OnWayInvoice, SaturnClient};
