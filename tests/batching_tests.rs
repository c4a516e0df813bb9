use chrono::{TimeZone, Utc};
use serde_json::json;

use saturn_stock::{plan_invoices, BatchLimits, DocNumberSequence, InvoiceSpec, StockRow};

fn row(batch_id: i64, qty: f64, valid_from: &str) -> StockRow {
    StockRow {
        batch_id: Some(batch_id),
        pat_id: Some(1),
        warehouse_id: Some(500),
        contractor_id: Some(9),
        count_pu: Some(qty),
        valid_from: Some(valid_from.to_string()),
        ..StockRow::default()
    }
}

fn plan(rows: &[StockRow], cap: usize, max_invoices: Option<usize>) -> Vec<InvoiceSpec> {
    let mut sequence = DocNumberSequence::new();
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let limits = BatchLimits {
        lines_per_invoice: cap,
        max_invoices,
    };
    plan_invoices(rows, limits, &mut sequence, now)
}

#[test]
fn line_caps_hold_with_only_the_last_invoice_short() {
    let rows: Vec<StockRow> = (1..=5)
        .map(|batch| row(batch, 1.0, "2024-01-01"))
        .collect();

    let specs = plan(&rows, 2, None);

    assert_eq!(specs.len(), 3);
    for spec in &specs[..specs.len() - 1] {
        assert_eq!(spec.lines.len(), 2);
    }
    assert_eq!(specs[2].lines.len(), 1);
}

#[test]
fn quantities_are_conserved_per_batch() {
    let mut rows = vec![
        row(7, 3.0, "2024-01-01"),
        row(7, 2.0, "2024-01-01"),
        row(8, 5.0, "2024-01-02"),
    ];
    // Same batch id under a different product is a separate group but the
    // batch total must still add up.
    let mut other_product = row(7, 4.0, "2024-01-01");
    other_product.pat_id = Some(2);
    rows.push(other_product);

    let specs = plan(&rows, 10, None);

    let mut sent_for_7 = 0.0;
    let mut sent_for_8 = 0.0;
    for line in specs.iter().flat_map(|s| &s.lines) {
        match line.batch_id {
            7 => sent_for_7 += line.count_pu_sent,
            8 => sent_for_8 += line.count_pu_sent,
            other => panic!("unexpected batch {other}"),
        }
    }
    assert_eq!(sent_for_7, 9.0);
    assert_eq!(sent_for_8, 5.0);
}

#[test]
fn groups_flow_in_validity_order_with_batch_id_tiebreak() {
    let rows = vec![
        row(100, 1.0, "2024-03-01"),
        row(5, 1.0, "2024-04-01"),
        row(50, 1.0, "2024-01-01"),
        row(9, 1.0, "2024-03-01"),
    ];

    let specs = plan(&rows, 1, None);

    let order: Vec<i64> = specs.iter().map(|s| s.lines[0].batch_id).collect();
    assert_eq!(order, vec![50, 9, 100, 5]);
}

#[test]
fn unparseable_and_missing_dates_are_consumed_first() {
    let mut undated = row(41, 1.0, "unused");
    undated.valid_from = None;
    let rows = vec![
        row(10, 1.0, "2024-01-01"),
        row(40, 1.0, "not a date"),
        undated,
    ];

    let specs = plan(&rows, 1, None);

    let order: Vec<i64> = specs.iter().map(|s| s.lines[0].batch_id).collect();
    assert_eq!(order, vec![40, 41, 10]);
}

#[test]
fn one_unparseable_date_pulls_its_whole_group_first() {
    // Batch 30 mixes a dated row with a garbage date; the group's earliest
    // value becomes unknown, so it is consumed before older dated stock.
    let rows = vec![
        row(20, 1.0, "2023-06-01"),
        row(30, 1.0, "2024-02-01"),
        row(30, 1.0, "broken"),
    ];

    let specs = plan(&rows, 1, None);

    let order: Vec<i64> = specs.iter().map(|s| s.lines[0].batch_id).collect();
    assert_eq!(order, vec![30, 20]);
    assert_eq!(specs[0].lines[0].count_pu_sent, 2.0);
}

#[test]
fn non_positive_and_non_numeric_quantities_are_excluded() {
    let mut rows: Vec<StockRow> = serde_json::from_value(json!([
        {"batchId": 1, "patId": 1, "warehouseId": 500, "contractorId": 9,
         "countPu": -4.0, "validFrom": "2024-01-01"},
        {"batchId": 2, "patId": 1, "warehouseId": 500, "contractorId": 9,
         "countPu": 0, "validFrom": "2024-01-01"},
        {"batchId": 3, "patId": 1, "warehouseId": 500, "contractorId": 9,
         "countPu": "abc", "validFrom": "2024-01-01"},
        {"batchId": 4, "patId": 1, "warehouseId": 500, "contractorId": 9,
         "validFrom": "2024-01-01"},
        {"batchId": 5, "patId": 1, "warehouseId": 500, "contractorId": 9,
         "countPu": 2.5, "validFrom": "2024-01-01"}
    ]))
    .unwrap();
    rows.push(row(6, f64::NAN, "2024-01-01"));

    let specs = plan(&rows, 10, None);

    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].lines.len(), 1);
    assert_eq!(specs[0].lines[0].batch_id, 5);
    assert_eq!(specs[0].lines[0].count_pu_sent, 2.5);
}

#[test]
fn write_off_marker_is_excluded_in_any_casing() {
    let notes = [
        "Списание со склада 2023",
        "СПИСАНИЕ СО СКЛАДА",
        "списание со склада",
        "задним числом списание со склада, март",
    ];
    let mut rows: Vec<StockRow> = notes
        .iter()
        .enumerate()
        .map(|(i, note)| {
            let mut r = row(i as i64 + 1, 1.0, "2024-01-01");
            r.note = Some(note.to_string());
            r
        })
        .collect();
    let mut kept = row(99, 1.0, "2024-01-01");
    kept.note = Some("обычная заметка".to_string());
    rows.push(kept);

    let specs = plan(&rows, 10, None);

    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].lines.len(), 1);
    assert_eq!(specs[0].lines[0].batch_id, 99);
}

#[test]
fn fully_filtered_input_produces_no_invoices() {
    let mut written_off = row(3, 2.0, "2024-01-01");
    written_off.note = Some("Списание со склада".to_string());
    let rows = vec![
        row(1, 0.0, "2024-01-01"),
        row(2, -3.0, "2024-01-01"),
        written_off,
    ];

    assert!(plan(&rows, 2, None).is_empty());
    assert!(plan(&[], 2, None).is_empty());
}

#[test]
fn invoice_count_cap_drops_whole_specs() {
    let rows: Vec<StockRow> = (1..=5)
        .map(|batch| row(batch, 1.0, "2024-01-01"))
        .collect();

    let specs = plan(&rows, 2, Some(2));

    assert_eq!(specs.len(), 2);
    assert_eq!(specs[0].lines.len(), 2);
    assert_eq!(specs[1].lines.len(), 2);
    let batches: Vec<i64> = specs
        .iter()
        .flat_map(|s| s.lines.iter().map(|l| l.batch_id))
        .collect();
    assert_eq!(batches, vec![1, 2, 3, 4]);
}

#[test]
fn planning_is_deterministic_for_the_same_input() {
    let rows = vec![
        row(7, 3.0, "2024-01-01"),
        row(8, 2.0, "2024-02-01"),
        row(9, 4.0, "2024-03-01"),
    ];

    let first = plan(&rows, 2, None);
    let second = plan(&rows, 2, None);

    assert_eq!(first, second);
}

#[test]
fn one_batch_aggregates_into_a_single_line() {
    let quantities = [3.0, 2.0, 5.0, 1.0, 4.0];
    let rows: Vec<StockRow> = quantities
        .iter()
        .map(|&qty| {
            let mut r = row(7, qty, "2024-01-01");
            r.warehouse_id = Some(1);
            r
        })
        .collect();

    let specs = plan(&rows, 2, None);

    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].lines.len(), 1);
    assert_eq!(specs[0].lines[0].batch_id, 7);
    assert_eq!(specs[0].lines[0].count_pu_sent, 15.0);
    assert_eq!(specs[0].source_warehouse_id, 1);
    assert_eq!(specs[0].receiver_contractor_id, 9);
}

#[test]
fn doc_numbers_restart_with_a_fresh_sequence() {
    let rows: Vec<StockRow> = (1..=3)
        .map(|batch| row(batch, 1.0, "2024-01-01"))
        .collect();

    let first = plan(&rows, 1, None);
    let numbers: Vec<&str> = first.iter().map(|s| s.doc_num.as_str()).collect();
    assert_eq!(numbers, vec!["20240501-001", "20240501-002", "20240501-003"]);

    let second = plan(&rows, 1, None);
    assert_eq!(second[0].doc_num, "20240501-001");
}

#[test]
fn invoice_headers_come_from_the_last_group_placed() {
    let mut g1 = row(1, 1.0, "2024-01-01");
    g1.warehouse_id = Some(100);
    let mut g2 = row(2, 1.0, "2024-01-02");
    g2.warehouse_id = Some(200);
    let mut g3 = row(3, 1.0, "2024-01-03");
    g3.warehouse_id = Some(300);

    let specs = plan(&[g1, g2, g3], 2, None);

    assert_eq!(specs.len(), 2);
    assert_eq!(specs[0].source_warehouse_id, 200);
    // Trailing partial invoice takes its header from its own last group.
    assert_eq!(specs[1].source_warehouse_id, 300);
}

#[test]
fn zero_line_cap_is_treated_as_one() {
    let rows: Vec<StockRow> = (1..=2)
        .map(|batch| row(batch, 1.0, "2024-01-01"))
        .collect();

    let specs = plan(&rows, 0, None);

    assert_eq!(specs.len(), 2);
    assert!(specs.iter().all(|s| s.lines.len() == 1));
}

#[test]
fn note_fields_describe_the_line_count() {
    let rows: Vec<StockRow> = (1..=3)
        .map(|batch| row(batch, 1.0, "2024-01-01"))
        .collect();

    let specs = plan(&rows, 2, None);

    assert_eq!(specs[0].doc_note, "Invoice_to_retail_2_items");
    assert_eq!(specs[0].name, "Подготовка для списания в розницу (2 позиций)");
    assert_eq!(specs[1].doc_note, "Invoice_to_retail_1_items");
}
