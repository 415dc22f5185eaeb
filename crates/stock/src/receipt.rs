//! Purchase receipt management: virtual receipts, submission, availability and
//! valuation reports, spreadsheet export.

use std::collections::BTreeMap;
use std::io::Write;

use chrono::NaiveDate;
use csv::WriterBuilder;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use acctkit_core::{DocName, DocStatus, Document, DomainError};

use crate::book::{DemandFilter, StockBook};
use crate::error::StockResult;
use crate::model::{Bin, ReservationStatus, StockLedgerEntry, normalize_year, year_matches};

/// Stock position for one receipt line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityRow {
    pub item_code: String,
    pub item_name: String,
    pub production_year: Option<String>,
    pub qty: Decimal,
    /// Stock on hand after current reservations and any future reservations
    /// incoming supply cannot cover.
    pub actual_available_qty: Decimal,
    /// Stock plus incoming supply after all reservations.
    pub future_available_qty: Decimal,
}

/// Quantities feeding the availability formulas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Availability {
    pub stock: Decimal,
    pub incoming: Decimal,
    pub reserved_now: Decimal,
    pub reserved_future: Decimal,
}

impl Availability {
    pub fn future_available(&self) -> Decimal {
        (self.stock + self.incoming) - (self.reserved_now + self.reserved_future)
    }

    pub fn actual_available(&self) -> Decimal {
        if self.reserved_future > self.incoming {
            self.stock - (self.reserved_now + (self.reserved_future - self.incoming))
        } else {
            self.stock - self.reserved_now
        }
    }
}

/// Valuation and pricing summary for one (item, production year) on a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValuationRow {
    pub item_code: String,
    pub item_name: String,
    pub brand: Option<String>,
    /// Empty when the lines carry no year.
    pub production_year: String,
    pub receipt_qty: Decimal,
    /// Cost per unit including the receipt's share of landed costs.
    pub receipt_valuation_rate: Option<Decimal>,
    /// Stock once the receipt is in, whether or not it is submitted yet.
    pub stock_qty: Decimal,
    pub available_qty: Decimal,
    pub stock_valuation_rate: Option<Decimal>,
    pub selling_price: Option<Decimal>,
    pub price_name: Option<DocName>,
}

#[derive(Debug, Serialize)]
struct ReceiptExportRow<'a> {
    name: &'a str,
    title: &'a str,
    brand: &'a str,
    item_code: &'a str,
    item_name: &'a str,
    production_year: &'a str,
    qty: Decimal,
    rate: Decimal,
    amount: Decimal,
}

#[derive(Debug, Default)]
struct ValuationGroup {
    item_name: String,
    brand: Option<String>,
    qty: Decimal,
    total_cost: Decimal,
}

impl StockBook {
    /// Flag a receipt as virtual (expected, not yet arrived) or real.
    pub fn set_virtual(&self, name: &DocName, virtual_receipt: bool) -> StockResult<()> {
        let mut state = self.write()?;
        state.receipt(name)?;
        if let Some(receipt) = state.receipts.get_mut(name) {
            receipt.virtual_receipt = virtual_receipt;
        }
        debug!(receipt = %name, virtual_receipt, "receipt virtual flag updated");
        Ok(())
    }

    /// Submit a receipt on `posting_date`, clearing its virtual flag and
    /// booking its lines into stock.
    pub fn submit_receipt(&self, name: &str, posting_date: NaiveDate) -> StockResult<()> {
        if name.trim().is_empty() {
            return Err(DomainError::validation("receipt name cannot be empty").into());
        }
        let name = DocName::new(name);

        let mut state = self.write()?;
        let receipt = state.receipt(&name)?;
        receipt.ensure_submittable()?;

        let prorata = receipt.landed_cost_prorata();
        let entries: Vec<StockLedgerEntry> = receipt
            .items
            .iter()
            .map(|line| StockLedgerEntry {
                item_code: line.item_code.clone(),
                production_year: normalize_year(line.production_year.as_deref()).map(str::to_string),
                warehouse: receipt.line_warehouse(line).to_string(),
                posting_date,
                actual_qty: line.qty,
                stock_value_difference: line.cost() * (Decimal::ONE + prorata),
                voucher_no: Some(name.clone()),
                is_cancelled: false,
            })
            .collect();

        for entry in &entries {
            let bin = state
                .bins
                .entry((entry.item_code.clone(), entry.warehouse.clone()))
                .or_insert_with(|| Bin {
                    item_code: entry.item_code.clone(),
                    warehouse: entry.warehouse.clone(),
                    actual_qty: Decimal::ZERO,
                    stock_value: Decimal::ZERO,
                });
            bin.actual_qty += entry.actual_qty;
            bin.stock_value += entry.stock_value_difference;
        }
        let lines = entries.len();
        state.ledger.extend(entries);

        if let Some(receipt) = state.receipts.get_mut(&name) {
            receipt.posting_date = Some(posting_date);
            receipt.virtual_receipt = false;
            receipt.docstatus = DocStatus::Submitted;
        }

        info!(receipt = %name, %posting_date, lines, "purchase receipt submitted");
        Ok(())
    }

    /// Actual and future availability of each receipt line in the receipt's
    /// warehouse.
    pub fn availability(&self, name: &DocName) -> StockResult<Vec<AvailabilityRow>> {
        let state = self.read()?;
        let receipt = state.receipt(name)?;
        let warehouse = receipt.set_warehouse.as_str();

        let rows = receipt
            .items
            .iter()
            .map(|line| {
                let year = line.production_year.as_deref();
                let incoming = state
                    .receipts
                    .values()
                    .filter(|r| r.is_future_supply())
                    .flat_map(|r| r.items.iter().map(move |l| (r, l)))
                    .filter(|(r, l)| {
                        l.item_code == line.item_code
                            && year_matches(year, l.production_year.as_deref())
                            && r.line_warehouse(l) == warehouse
                    })
                    .map(|(_, l)| l.qty)
                    .sum();
                let demand = |reservation| {
                    state
                        .pending_delivery(
                            &line.item_code,
                            year,
                            DemandFilter {
                                reservation: Some(reservation),
                                warehouse: Some(warehouse),
                                stock_items_only: true,
                                ..DemandFilter::default()
                            },
                        )
                        .unwrap_or_default()
                };

                let figures = Availability {
                    stock: state
                        .ledger_qty(&line.item_code, year, Some(warehouse))
                        .unwrap_or_default(),
                    incoming,
                    reserved_now: demand(ReservationStatus::CurrentStock),
                    reserved_future: demand(ReservationStatus::FutureReceipts),
                };
                debug!(receipt = %name, item = %line.item_code, ?figures, "availability computed");

                AvailabilityRow {
                    item_code: line.item_code.clone(),
                    item_name: line.item_name.clone(),
                    production_year: line.production_year.clone(),
                    qty: line.qty,
                    actual_available_qty: figures.actual_available(),
                    future_available_qty: figures.future_available(),
                }
            })
            .collect();

        Ok(rows)
    }

    /// Per (item, production year) valuation of a receipt against current stock
    /// and the default selling price.
    ///
    /// Rows are ordered by brand, tire size sorting code, ply rating and
    /// production year. A cancelled receipt yields no rows.
    pub fn receipt_valuation(&self, name: &DocName) -> StockResult<Vec<ValuationRow>> {
        let state = self.read()?;
        let receipt = state.receipt(name)?;
        if receipt.docstatus == DocStatus::Cancelled {
            debug!(receipt = %name, "cancelled receipt has no valuation");
            return Ok(Vec::new());
        }

        let prorata = receipt.landed_cost_prorata();
        let mut groups: BTreeMap<(String, String), ValuationGroup> = BTreeMap::new();
        for line in &receipt.items {
            let year = normalize_year(line.production_year.as_deref()).unwrap_or_default();
            let group = groups
                .entry((line.item_code.clone(), year.to_string()))
                .or_default();
            let item = state.items.get(&line.item_code);
            group.item_name = item.map_or_else(|| line.item_name.clone(), |i| i.item_name.clone());
            group.brand = item.and_then(|i| i.brand.clone()).or_else(|| line.brand.clone());
            group.qty += line.qty;
            group.total_cost += line.cost() * (Decimal::ONE + prorata);
        }

        let submitted = receipt.docstatus.is_submitted();
        let price_list = state.selling_price_list.as_deref();

        let mut rows: Vec<ValuationRow> = groups
            .into_iter()
            .map(|((item_code, production_year), group)| {
                let year = Some(production_year.as_str());
                let ledger_qty = state.ledger_qty(&item_code, year, None);
                let pending = state
                    .pending_delivery(
                        &item_code,
                        year,
                        DemandFilter { net_over_delivery: true, ..DemandFilter::default() },
                    )
                    .unwrap_or_default();

                let (value, qty) = state
                    .ledger
                    .iter()
                    .filter(|e| !e.is_cancelled && e.item_code == item_code)
                    .fold((Decimal::ZERO, Decimal::ZERO), |(v, q), e| {
                        (v + e.stock_value_difference, q + e.actual_qty)
                    });

                let (stock_qty, stock_value, valued_qty) = if submitted {
                    (ledger_qty.unwrap_or_default(), value, qty)
                } else {
                    (
                        ledger_qty.unwrap_or_default() + group.qty,
                        value + group.total_cost,
                        qty + group.qty,
                    )
                };

                let price = state.item_prices.values().find(|p| {
                    p.selling
                        && Some(p.price_list.as_str()) == price_list
                        && p.item_code == item_code
                        && year_matches(year, p.production_year.as_deref())
                });

                ValuationRow {
                    receipt_valuation_rate: group.total_cost.checked_div(group.qty),
                    item_name: group.item_name,
                    brand: group.brand,
                    receipt_qty: group.qty,
                    stock_qty,
                    available_qty: stock_qty - pending,
                    stock_valuation_rate: stock_value.checked_div(valued_qty),
                    selling_price: price.map(|p| p.price_list_rate),
                    price_name: price.map(|p| p.name.clone()),
                    item_code,
                    production_year,
                }
            })
            .collect();

        rows.sort_by_cached_key(|row| {
            let item = state.items.get(&row.item_code);
            let sorting_code = item
                .and_then(|i| i.tire_size.as_ref())
                .and_then(|size| state.tire_sizes.get(size))
                .map(|size| size.sorting_code);
            (
                row.brand.clone(),
                sorting_code,
                item.and_then(|i| i.ply_rating.clone()),
                row.production_year.clone(),
            )
        });

        Ok(rows)
    }

    /// Write the lines of the named receipts as CSV. Receipt name and title are
    /// filled on each receipt's first line only.
    ///
    /// Returns the number of data rows written.
    pub fn export_receipts<W: Write>(&self, names: &[DocName], writer: W) -> StockResult<usize> {
        let state = self.read()?;
        let mut wtr = WriterBuilder::new().from_writer(writer);
        let mut written = 0;

        for name in names {
            let receipt = state.receipt(name)?;
            for (index, line) in receipt.items.iter().enumerate() {
                let (name, title) = if index == 0 {
                    (receipt.name.as_str(), receipt.title.as_str())
                } else {
                    ("", "")
                };
                wtr.serialize(ReceiptExportRow {
                    name,
                    title,
                    brand: line.brand.as_deref().unwrap_or_default(),
                    item_code: &line.item_code,
                    item_name: &line.item_name,
                    production_year: line.production_year.as_deref().unwrap_or_default(),
                    qty: line.qty,
                    rate: line.rate,
                    amount: line.amount,
                })?;
                written += 1;
            }
        }

        wtr.flush()?;
        info!(receipts = names.len(), rows = written, "purchase receipts exported");
        Ok(written)
    }
}
