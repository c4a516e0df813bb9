use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use chrono::Utc;

use crate::api::SaturnClient;
use crate::config::{Config, REQUEST_DELAY};
use crate::error::Result;

/// Counters for one notifier run, logged at the end and returned for the
/// caller's summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeliverySummary {
    pub total: usize,
    pub success: usize,
    pub errors: usize,
    pub skipped: usize,
}

/// Fetch every invoice on the way to the configured contractor and mark
/// each one delivered. Failures are counted per record, never propagated;
/// only the initial fetch can abort the run.
pub fn notify_deliveries(
    client: &SaturnClient,
    config: &Config,
    interrupted: &AtomicBool,
) -> Result<DeliverySummary> {
    let invoices = client.fetch_on_way_invoices(config.contractor_id, config.page_size)?;
    tracing::info!("Loaded {} on-the-way invoices", invoices.len());

    let total = invoices.len();
    let mut summary = DeliverySummary {
        total,
        ..DeliverySummary::default()
    };

    for (index, invoice) in invoices.iter().enumerate() {
        if interrupted.load(Ordering::SeqCst) {
            tracing::warn!("Interrupted, stopping after {index} of {total} notifications");
            break;
        }
        let n = index + 1;

        let Some(invoice_id) = invoice.id else {
            tracing::warn!("#{n}/{total} Skipping record with no invoice id");
            summary.skipped += 1;
            continue;
        };
        let warehouse_id = match invoice.destination_warehouse_id {
            Some(id) if id != 0 => id,
            _ => {
                tracing::warn!(
                    "#{n}/{total} Invoice {invoice_id} has no destination warehouse, using {}",
                    config.fallback_warehouse_id
                );
                config.fallback_warehouse_id
            }
        };

        match client.notify_delivered(invoice_id, warehouse_id, Utc::now()) {
            Ok((status, body)) => {
                tracing::info!("#{n}/{total} id={invoice_id} warehouse={warehouse_id} => {status}");
                if status == 200 {
                    summary.success += 1;
                } else {
                    summary.errors += 1;
                    tracing::error!("HTTP {status}: {body}");
                }
            }
            Err(err) => {
                summary.errors += 1;
                tracing::error!("Request failed for invoice {invoice_id}: {err}");
            }
        }

        thread::sleep(REQUEST_DELAY);
    }

    tracing::info!("=== Finished ===");
    tracing::info!("Success: {}", summary.success);
    tracing::info!("Errors:  {}", summary.errors);
    tracing::info!("Skipped: {}", summary.skipped);

    Ok(summary)
}
