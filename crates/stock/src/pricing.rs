//! Item price maintenance and the price spreadsheet round trip.

use std::io::{Read, Write};

use csv::{ReaderBuilder, WriterBuilder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use acctkit_core::{DocName, DomainError};

use crate::book::{DemandFilter, StockBook};
use crate::error::{StockError, StockResult};
use crate::model::{ItemPrice, ItemPriceFilter};

/// A price edited on the receipt valuation screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceEdit {
    /// Existing price record; `None` or unknown creates a new one.
    #[serde(default)]
    pub name: Option<DocName>,
    pub item_code: String,
    #[serde(default)]
    pub item_name: String,
    #[serde(default)]
    pub production_year: Option<String>,
    pub price: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PriceEditSummary {
    pub updated: Vec<DocName>,
    pub created: Vec<DocName>,
    pub unchanged: usize,
}

/// One row of the price spreadsheet.
#[derive(Debug, Serialize)]
struct PriceSheetRow<'a> {
    name: &'a str,
    item_code: &'a str,
    item_name: &'a str,
    brand: &'a str,
    price_list_rate: Decimal,
    stock_valuation_rate: Decimal,
    stock_qty: Decimal,
    price_list: &'a str,
}

const NAME_COLUMN: usize = 0;
const RATE_COLUMN: usize = 4;

/// `ceil(valuation × (100 + percent) / 100)`.
pub fn marked_up_price(valuation_rate: Decimal, percent: Decimal) -> Decimal {
    (valuation_rate * (Decimal::ONE_HUNDRED + percent) / Decimal::ONE_HUNDRED).ceil()
}

impl StockBook {
    /// Apply edited prices: changed rates are updated, rows without an existing
    /// record create one on `price_list`, or on the default selling price list.
    pub fn edit_item_prices(
        &self,
        rows: &[PriceEdit],
        price_list: Option<&str>,
    ) -> StockResult<PriceEditSummary> {
        let mut state = self.write()?;
        let mut summary = PriceEditSummary::default();

        for row in rows {
            let existing = row
                .name
                .as_ref()
                .and_then(|name| state.item_prices.get_mut(name));

            match existing {
                Some(price) if price.price_list_rate != row.price => {
                    debug!(price = %price.name, from = %price.price_list_rate, to = %row.price, "item price updated");
                    price.price_list_rate = row.price;
                    summary.updated.push(price.name.clone());
                }
                Some(_) => summary.unchanged += 1,
                None => {
                    let list = price_list
                        .map(str::to_string)
                        .or_else(|| state.selling_price_list.clone())
                        .ok_or(StockError::MissingSellingPriceList)?;
                    let name = state.next_price_name();
                    let brand = state.items.get(&row.item_code).and_then(|i| i.brand.clone());
                    let mut price = ItemPrice::new(name.clone(), row.item_code.clone(), list, row.price);
                    price.item_name = row.item_name.clone();
                    price.brand = brand;
                    price.production_year = row.production_year.clone();
                    state.item_prices.insert(name.clone(), price);
                    debug!(price = %name, item = %row.item_code, "item price created");
                    summary.created.push(name);
                }
            }
        }

        info!(
            updated = summary.updated.len(),
            created = summary.created.len(),
            unchanged = summary.unchanged,
            "item prices edited"
        );
        Ok(summary)
    }

    /// Reprice every matching record from its stock valuation rate.
    ///
    /// Returns the number of prices changed.
    pub fn increase_item_prices(&self, filter: &ItemPriceFilter, percent: Decimal) -> StockResult<usize> {
        let mut state = self.write()?;
        let mut changed = 0;
        for price in state.item_prices.values_mut().filter(|p| filter.matches(p)) {
            price.price_list_rate = marked_up_price(price.stock_valuation_rate, percent);
            changed += 1;
        }
        info!(%percent, changed, "item prices increased");
        Ok(changed)
    }

    /// Recompute valuation rate, stock and available quantity on every price.
    ///
    /// The valuation rate averages bins holding stock for the item across all
    /// years; quantities are per item and production year.
    pub fn refresh_item_price_stock(&self) -> StockResult<usize> {
        let mut state = self.write()?;

        let refreshed: Vec<(DocName, Decimal, Decimal, Decimal)> = state
            .item_prices
            .values()
            .map(|price| {
                let year = price.production_year.as_deref();
                let (value, qty) = state
                    .bins
                    .values()
                    .filter(|b| b.item_code == price.item_code && b.actual_qty > Decimal::ZERO)
                    .fold((Decimal::ZERO, Decimal::ZERO), |(v, q), b| {
                        (v + b.stock_value, q + b.actual_qty)
                    });
                let rate = value.checked_div(qty).unwrap_or_default();
                let stock_qty = state
                    .ledger_qty(&price.item_code, year, None)
                    .unwrap_or_default();
                let pending = state
                    .pending_delivery(&price.item_code, year, DemandFilter::default())
                    .unwrap_or_default();
                (price.name.clone(), rate, stock_qty, stock_qty - pending)
            })
            .collect();

        let count = refreshed.len();
        for (name, rate, stock_qty, available_qty) in refreshed {
            if let Some(price) = state.item_prices.get_mut(&name) {
                price.stock_valuation_rate = rate;
                price.stock_qty = stock_qty;
                price.available_qty = available_qty;
            }
        }

        info!(prices = count, "item price stock refreshed");
        Ok(count)
    }

    /// Write matching prices as CSV, one row per price, by name.
    pub fn export_item_prices<W: Write>(&self, filter: &ItemPriceFilter, writer: W) -> StockResult<usize> {
        let state = self.read()?;
        let mut wtr = WriterBuilder::new().from_writer(writer);
        let mut written = 0;

        for price in state.item_prices.values().filter(|p| filter.matches(p)) {
            wtr.serialize(PriceSheetRow {
                name: price.name.as_str(),
                item_code: &price.item_code,
                item_name: &price.item_name,
                brand: price.brand.as_deref().unwrap_or_default(),
                price_list_rate: price.price_list_rate,
                stock_valuation_rate: price.stock_valuation_rate,
                stock_qty: price.stock_qty,
                price_list: &price.price_list,
            })?;
            written += 1;
        }

        wtr.flush()?;
        info!(rows = written, "item prices exported");
        Ok(written)
    }

    /// Read a price spreadsheet and set each named price's rate from the rate
    /// column. The header row is skipped.
    ///
    /// Every row is checked before any price changes, so a bad row leaves all
    /// prices untouched. Returns the `(name, rate)` pairs applied.
    pub fn import_item_prices<R: Read>(&self, reader: R) -> StockResult<Vec<(DocName, Decimal)>> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let mut parsed = Vec::new();
        for (index, record) in rdr.records().enumerate() {
            let record = record?;
            let row = index + 2;
            let sheet_error = |message: String| StockError::Sheet { row, message };

            let name = record
                .get(NAME_COLUMN)
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .ok_or_else(|| sheet_error("missing price name".into()))?;
            let rate = record
                .get(RATE_COLUMN)
                .map(str::trim)
                .ok_or_else(|| sheet_error("missing price_list_rate".into()))?
                .parse::<Decimal>()
                .map_err(|e| sheet_error(format!("invalid price_list_rate: {e}")))?;
            parsed.push((DocName::new(name), rate));
        }

        let mut state = self.write()?;
        if let Some((name, _)) = parsed.iter().find(|(name, _)| !state.item_prices.contains_key(name)) {
            warn!(price = %name, "import references unknown item price");
            return Err(DomainError::not_found(ItemPrice::DOCTYPE, name.as_str()).into());
        }
        for (name, rate) in &parsed {
            if let Some(price) = state.item_prices.get_mut(name) {
                price.price_list_rate = *rate;
            }
        }

        info!(rows = parsed.len(), "item prices imported");
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn markup_rounds_up_to_whole_units() {
        assert_eq!(marked_up_price(dec!(100), dec!(15)), dec!(115));
        assert_eq!(marked_up_price(dec!(99.5), dec!(10)), dec!(110));
        assert_eq!(marked_up_price(dec!(10), Decimal::ZERO), dec!(10));
    }

    #[test]
    fn negative_markup_discounts() {
        assert_eq!(marked_up_price(dec!(200), dec!(-25)), dec!(150));
    }
}
