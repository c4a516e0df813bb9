use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use ureq::http::StatusCode;
use ureq::Agent;

use crate::batch::{coerce_i64, InvoiceSpec, StockRow};
use crate::config::{Config, REQUEST_TIMEOUT};
use crate::error::{Result, ServiceError};

/// Client for the Saturn operation endpoint. Every call is a POST of an
/// `execOperation` envelope to the same URL; only `op`, `otype`, `oid` and
/// `opargs` vary per operation.
pub struct SaturnClient {
    agent: Agent,
    url: String,
    content_type: String,
    authorization: String,
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    com: &'static str,
    op: &'a str,
    otype: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    oid: Option<String>,
    opargs: Value,
}

/// An in-transit invoice row from the listing operation. Both fields go
/// through lenient coercion, so either can be absent.
#[derive(Debug, Clone)]
pub struct OnWayInvoice {
    pub id: Option<i64>,
    pub destination_warehouse_id: Option<i64>,
}

impl SaturnClient {
    pub fn new(config: &Config) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            agent,
            url: config.url.clone(),
            content_type: config.content_type.clone(),
            authorization: config.authorization.clone(),
        }
    }

    /// List invoices currently on the way to `contractor_id`.
    pub fn fetch_on_way_invoices(
        &self,
        contractor_id: i64,
        page_size: u32,
    ) -> Result<Vec<OnWayInvoice>> {
        let opargs = json!({
            "filters": [
                {"column": "lcState", "condition": "=", "value": ["onWay"]},
                // sic: the listing filter column is misspelled upstream
                {"column": "recieverContractorId", "condition": "in", "value": [contractor_id]},
            ],
            "size": page_size,
            "getFullCards": 0,
        });
        let data = res_data(self.exec("static/getList()", "Invoice", None, opargs)?)?;
        let table = data
            .get("attrTable")
            .and_then(Value::as_array)
            .ok_or(ServiceError::MissingField("resData.attrTable"))?;
        Ok(parse_attr_table(table))
    }

    /// Mark an on-the-way invoice as delivered to the given warehouse.
    /// The ERP answers refusals with a plain non-2xx status, so the raw
    /// status and body are handed back for the caller to tally.
    pub fn notify_delivered(
        &self,
        invoice_id: i64,
        destination_warehouse_id: i64,
        date_action: DateTime<Utc>,
    ) -> Result<(u16, String)> {
        let opargs = json!({
            "theCard": {
                "dateAction": iso(date_action),
                "description": "auto_notify",
                "destinationWarehouseId": destination_warehouse_id,
            }
        });
        let (status, body) = self.send(
            "onWay/notifyDelivered()",
            "Invoice",
            Some(invoice_id.to_string()),
            opargs,
        )?;
        Ok((status.as_u16(), body))
    }

    /// Fetch current warehouse stock totals, grouped by product.
    pub fn fetch_stock_totals(&self, now: DateTime<Utc>) -> Result<Vec<StockRow>> {
        let opargs = json!({
            "theCard": {"dateTime": iso(now), "groupBy": "pat"}
        });
        let mut data = res_data(self.exec("static/getTotals()", "WarehouseStates", None, opargs)?)?;
        let rows = data
            .get_mut("rows")
            .map(Value::take)
            .ok_or(ServiceError::MissingField("resData.rows"))?;
        Ok(serde_json::from_value(rows)?)
    }

    /// Create a draft invoice and return the id Saturn assigned to it.
    pub fn create_draft_invoice(&self, spec: &InvoiceSpec) -> Result<i64> {
        let opargs = json!({
            "theCard": {
                "head": {
                    "docDate": iso(spec.doc_date),
                    "docNote": spec.doc_note,
                    "docNum": spec.doc_num,
                    "name": spec.name,
                    "receiverContractorId": spec.receiver_contractor_id,
                    "sourceWarehouseId": spec.source_warehouse_id,
                },
                "tbrDtoList": spec.lines,
            }
        });
        let data = res_data(self.exec(
            "static/createNew()",
            "Invoice",
            Some("0".to_string()),
            opargs,
        )?)?;
        data.get("id")
            .and_then(coerce_i64)
            .ok_or(ServiceError::MissingField("resData.id"))
    }

    /// Promote a draft invoice to the retail write-off state.
    pub fn send_to_retail(&self, invoice_id: i64) -> Result<()> {
        // sic: "Retale" is the operation's upstream spelling
        self.exec(
            "draft/doSendToRetale()",
            "Invoice",
            Some(invoice_id.to_string()),
            json!({}),
        )?;
        Ok(())
    }

    /// One operation round-trip with the success policy applied: non-2xx
    /// statuses become errors and the body must parse as JSON.
    fn exec(&self, op: &str, otype: &str, oid: Option<String>, opargs: Value) -> Result<Value> {
        let (status, text) = self.send(op, otype, oid, opargs)?;
        if !status.is_success() {
            return Err(ServiceError::UnexpectedStatus {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Transport only: POST the envelope and read the body back, whatever
    /// the status.
    fn send(
        &self,
        op: &str,
        otype: &str,
        oid: Option<String>,
        opargs: Value,
    ) -> Result<(StatusCode, String)> {
        let envelope = Envelope {
            com: "execOperation",
            op,
            otype,
            oid,
            opargs,
        };
        let body = serde_json::to_string(&envelope)?;
        tracing::debug!(op, "POST {}", self.url);

        let mut response = self
            .agent
            .post(self.url.as_str())
            .header("Content-Type", self.content_type.as_str())
            .header("Authorization", self.authorization.as_str())
            .send(body.as_str())?;

        let status = response.status();
        let text = response.body_mut().read_to_string()?;
        Ok((status, text))
    }
}

fn res_data(mut payload: Value) -> Result<Value> {
    payload
        .get_mut("resData")
        .map(Value::take)
        .ok_or(ServiceError::MissingField("resData"))
}

/// ISO-8601 with microseconds and a `+00:00` offset, the shape the ERP
/// expects for card timestamps.
fn iso(moment: DateTime<Utc>) -> String {
    moment.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// The listing response is columnar: row zero holds the column names, every
/// other row holds one invoice's values in the same order.
fn parse_attr_table(table: &[Value]) -> Vec<OnWayInvoice> {
    let Some(header) = table.first().and_then(Value::as_array) else {
        return Vec::new();
    };
    let position = |name: &str| header.iter().position(|cell| cell.as_str() == Some(name));
    let id_col = position("id");
    let dest_col = position("destinationWarehouseId");

    table[1..]
        .iter()
        .filter_map(Value::as_array)
        .map(|cells| OnWayInvoice {
            id: id_col.and_then(|i| cells.get(i)).and_then(coerce_i64),
            destination_warehouse_id: dest_col.and_then(|i| cells.get(i)).and_then(coerce_i64),
        })
        .collect()
}
