use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::SaturnClient;
use crate::batch::InvoiceSpec;
use crate::config::REQUEST_DELAY;
use crate::error::ServiceError;

/// Outcome class for one submitted invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    CreatedAndSent,
    NetworkError,
    Error,
}

/// Audit record for one create-and-send attempt, serialized into the
/// results file at the end of a run.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionResult {
    #[serde(rename = "docNum")]
    pub doc_num: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_count: Option<usize>,
    pub status: SubmissionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SubmissionResult {
    fn sent(spec: &InvoiceSpec, invoice_id: i64) -> Self {
        Self {
            doc_num: spec.doc_num.clone(),
            invoice_id: Some(invoice_id),
            items_count: Some(spec.lines.len()),
            status: SubmissionStatus::CreatedAndSent,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// `invoice_id` is kept when the draft was created but the retail push
    /// failed, so the orphaned draft can be found by hand.
    fn failed(spec: &InvoiceSpec, err: &ServiceError, invoice_id: Option<i64>) -> Self {
        Self {
            doc_num: spec.doc_num.clone(),
            invoice_id,
            items_count: None,
            status: classify(err),
            error: Some(err.to_string()),
            timestamp: Utc::now(),
        }
    }

    pub fn is_sent(&self) -> bool {
        self.status == SubmissionStatus::CreatedAndSent
    }
}

fn classify(err: &ServiceError) -> SubmissionStatus {
    match err {
        ServiceError::Http(_) | ServiceError::UnexpectedStatus { .. } => {
            SubmissionStatus::NetworkError
        }
        _ => SubmissionStatus::Error,
    }
}

/// Create each draft invoice and push it to retail, strictly in order. A
/// failure is recorded and the loop moves on to the next spec. The
/// `interrupted` flag is checked before each invoice so Ctrl-C aborts the
/// remaining loop with everything collected so far intact.
pub fn submit_invoices(
    client: &SaturnClient,
    specs: &[InvoiceSpec],
    interrupted: &AtomicBool,
) -> Vec<SubmissionResult> {
    let total = specs.len();
    let mut results = Vec::with_capacity(total);

    for (index, spec) in specs.iter().enumerate() {
        if interrupted.load(Ordering::SeqCst) {
            tracing::warn!("Interrupted, stopping after {index} of {total} invoices");
            break;
        }
        if index > 0 {
            thread::sleep(REQUEST_DELAY);
        }

        tracing::info!(
            "[{}/{}] Creating invoice {} ({} lines)",
            index + 1,
            total,
            spec.doc_num,
            spec.lines.len()
        );
        results.push(submit_one(client, spec));
    }

    results
}

fn submit_one(client: &SaturnClient, spec: &InvoiceSpec) -> SubmissionResult {
    let invoice_id = match client.create_draft_invoice(spec) {
        Ok(id) => id,
        Err(err) => {
            tracing::error!("Failed to create {}: {err}", spec.doc_num);
            return SubmissionResult::failed(spec, &err, None);
        }
    };
    tracing::info!("Draft created, id {invoice_id}");

    if let Err(err) = client.send_to_retail(invoice_id) {
        tracing::error!("Failed to send {} to retail: {err}", spec.doc_num);
        return SubmissionResult::failed(spec, &err, Some(invoice_id));
    }
    tracing::info!("Invoice {} sent to retail", spec.doc_num);

    SubmissionResult::sent(spec, invoice_id)
}
