use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Rows whose note contains this marker (case-insensitively) describe stock
/// that was already written off; they are excluded from batching. The match
/// is a heuristic and is known not to catch every removed batch.
pub const WRITE_OFF_MARKER: &str = "списание со склада";

/// One warehouse stock record as returned by `static/getTotals()`.
///
/// Every field is optional at the wire level: the ERP omits columns freely
/// and serializes numbers as strings in some deployments, so ids and the
/// quantity are coerced leniently instead of failing the whole fetch.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StockRow {
    #[serde(deserialize_with = "de_lenient_f64")]
    pub count_pu: Option<f64>,
    #[serde(deserialize_with = "de_lenient_i64")]
    pub batch_id: Option<i64>,
    #[serde(deserialize_with = "de_lenient_i64")]
    pub pat_id: Option<i64>,
    #[serde(deserialize_with = "de_lenient_i64")]
    pub warehouse_id: Option<i64>,
    #[serde(deserialize_with = "de_lenient_i64")]
    pub contractor_id: Option<i64>,
    pub valid_from: Option<String>,
    pub note: Option<String>,
    pub warehouse_name: Option<String>,
    pub contractor_name: Option<String>,
    pub pat_name: Option<String>,
}

/// Stock rows aggregated per (batch, product, warehouse, contractor):
/// quantities summed, validity kept at the earliest value, descriptive
/// fields taken from the first row in FIFO order that carries them.
#[derive(Debug, Clone)]
pub struct BatchGroup {
    pub batch_id: i64,
    pub pat_id: i64,
    pub warehouse_id: i64,
    pub contractor_id: i64,
    pub count_pu: f64,
    pub valid_from: Option<DateTime<Utc>>,
    pub warehouse_name: Option<String>,
    pub contractor_name: Option<String>,
    pub pat_name: Option<String>,
}

/// A single invoice line: one batch, the full quantity to send.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLine {
    pub batch_id: i64,
    pub count_pu_sent: f64,
}

/// A to-be-created retail write-off invoice. Built by the planner, consumed
/// by the submitter, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceSpec {
    pub doc_num: String,
    pub doc_date: DateTime<Utc>,
    pub doc_note: String,
    pub name: String,
    pub receiver_contractor_id: i64,
    pub source_warehouse_id: i64,
    pub lines: Vec<InvoiceLine>,
}

impl InvoiceSpec {
    fn new(
        lines: Vec<InvoiceLine>,
        header: &BatchGroup,
        doc_num: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            doc_num,
            doc_date: now,
            doc_note: format!("Invoice_to_retail_{}_items", lines.len()),
            name: format!("Подготовка для списания в розницу ({} позиций)", lines.len()),
            receiver_contractor_id: header.contractor_id,
            source_warehouse_id: header.warehouse_id,
            lines,
        }
    }
}

/// Per-run document number counter. Numbers are `YYYYMMDD-NNN`, starting at
/// 001, and must be reset between runs rather than shared across them.
#[derive(Debug)]
pub struct DocNumberSequence {
    next: u32,
}

impl Default for DocNumberSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl DocNumberSequence {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_doc_num(&mut self, date: NaiveDate) -> String {
        let doc_num = format!("{}-{:03}", date.format("%Y%m%d"), self.next);
        self.next += 1;
        doc_num
    }

    pub fn reset(&mut self) {
        self.next = 1;
    }
}

/// Caps applied while planning invoices.
#[derive(Debug, Clone, Copy)]
pub struct BatchLimits {
    /// Maximum line items per invoice (values below 1 are treated as 1).
    pub lines_per_invoice: usize,
    /// Maximum number of invoices per run; `None` means unbounded.
    pub max_invoices: Option<usize>,
}

/// Plan retail write-off invoices from raw stock rows.
///
/// FIFO order: rows (and then groups) are ordered by ascending validity
/// date, with the batch id as tie-breaker; unparseable validity dates sort
/// before every real instant, so undated stock is consumed first.
///
/// A group's full quantity always lands on exactly one line of one invoice.
/// Groups are never split, even when that leaves the final invoice short.
pub fn plan_invoices(
    rows: &[StockRow],
    limits: BatchLimits,
    seq: &mut DocNumberSequence,
    now: DateTime<Utc>,
) -> Vec<InvoiceSpec> {
    let cap = limits.lines_per_invoice.max(1);
    let groups = group_rows(filter_rows(rows));
    tracing::info!("Aggregated into {} batch groups", groups.len());

    let mut specs: Vec<InvoiceSpec> = Vec::new();
    let mut lines: Vec<InvoiceLine> = Vec::new();
    let mut last_placed: Option<&BatchGroup> = None;

    for group in &groups {
        lines.push(InvoiceLine {
            batch_id: group.batch_id,
            count_pu_sent: group.count_pu,
        });
        last_placed = Some(group);

        if lines.len() >= cap {
            let doc_num = seq.next_doc_num(now.date_naive());
            specs.push(InvoiceSpec::new(std::mem::take(&mut lines), group, doc_num, now));
        }
    }

    // Flush the trailing partial invoice; its header comes from the last
    // group placed, same as the capacity-close path.
    if let Some(group) = last_placed {
        if !lines.is_empty() {
            let doc_num = seq.next_doc_num(now.date_naive());
            specs.push(InvoiceSpec::new(lines, group, doc_num, now));
        }
    }

    if let Some(max) = limits.max_invoices {
        specs.truncate(max);
    }

    tracing::info!("Planned {} invoices", specs.len());
    specs
}

/// A stock row that survived filtering, with its key fields materialized.
#[derive(Debug, Clone)]
struct CleanRow {
    batch_id: i64,
    pat_id: i64,
    warehouse_id: i64,
    contractor_id: i64,
    count_pu: f64,
    valid_from: Option<DateTime<Utc>>,
    warehouse_name: Option<String>,
    contractor_name: Option<String>,
    pat_name: Option<String>,
}

fn filter_rows(rows: &[StockRow]) -> Vec<CleanRow> {
    let mut clean = Vec::new();
    for row in rows {
        let Some(count_pu) = row.count_pu else {
            continue;
        };
        // `!(x > 0)` also drops a NaN smuggled in as a string.
        if !(count_pu > 0.0) {
            continue;
        }
        if is_written_off(row.note.as_deref()) {
            continue;
        }
        let (Some(batch_id), Some(pat_id), Some(warehouse_id), Some(contractor_id)) =
            (row.batch_id, row.pat_id, row.warehouse_id, row.contractor_id)
        else {
            tracing::debug!(?row, "dropping stock row with an incomplete grouping key");
            continue;
        };
        clean.push(CleanRow {
            batch_id,
            pat_id,
            warehouse_id,
            contractor_id,
            count_pu,
            valid_from: row.valid_from.as_deref().and_then(parse_valid_from),
            warehouse_name: row.warehouse_name.clone(),
            contractor_name: row.contractor_name.clone(),
            pat_name: row.pat_name.clone(),
        });
    }
    tracing::info!("{} of {} stock rows remain after filtering", clean.len(), rows.len());
    clean
}

fn is_written_off(note: Option<&str>) -> bool {
    note.map(|n| n.to_lowercase().contains(WRITE_OFF_MARKER))
        .unwrap_or(false)
}

fn group_rows(mut rows: Vec<CleanRow>) -> Vec<BatchGroup> {
    // FIFO order also decides which row donates the descriptive fields.
    rows.sort_by_key(|r| (r.valid_from, r.batch_id));

    let mut by_key: HashMap<(i64, i64, i64, i64), BatchGroup> = HashMap::new();
    for row in rows {
        let key = (row.batch_id, row.pat_id, row.warehouse_id, row.contractor_id);
        match by_key.get_mut(&key) {
            Some(group) => {
                group.count_pu += row.count_pu;
                group.valid_from = group.valid_from.min(row.valid_from);
                if group.warehouse_name.is_none() {
                    group.warehouse_name = row.warehouse_name;
                }
                if group.contractor_name.is_none() {
                    group.contractor_name = row.contractor_name;
                }
                if group.pat_name.is_none() {
                    group.pat_name = row.pat_name;
                }
            }
            None => {
                by_key.insert(
                    key,
                    BatchGroup {
                        batch_id: row.batch_id,
                        pat_id: row.pat_id,
                        warehouse_id: row.warehouse_id,
                        contractor_id: row.contractor_id,
                        count_pu: row.count_pu,
                        valid_from: row.valid_from,
                        warehouse_name: row.warehouse_name,
                        contractor_name: row.contractor_name,
                        pat_name: row.pat_name,
                    },
                );
            }
        }
    }

    let mut groups: Vec<BatchGroup> = by_key.into_values().collect();
    groups.sort_by_key(|g| {
        (g.valid_from, g.batch_id, g.pat_id, g.warehouse_id, g.contractor_id)
    });
    groups
}

/// Parse a validity timestamp into UTC. The ERP is not consistent about the
/// format, so a few shapes are tried; anything unparseable becomes `None`,
/// which sorts as the minimum.
pub fn parse_valid_from(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    None
}

fn de_lenient_f64<'de, D>(de: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(de)?;
    Ok(value.as_ref().and_then(coerce_f64))
}

fn de_lenient_i64<'de, D>(de: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(de)?;
    Ok(value.as_ref().and_then(coerce_i64))
}

/// Best-effort numeric coercion: JSON numbers and numeric strings count,
/// everything else is treated as absent.
pub(crate) fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Integer coercion with float truncation, so `782.0` and `"782.0"` both
/// resolve to batch id 782.
pub(crate) fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}
