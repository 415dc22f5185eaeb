//! In-memory stock records.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use rust_decimal::Decimal;

use acctkit_core::{DocName, Document, DomainError};

use crate::error::{StockError, StockResult};
use crate::model::{
    Bin, Item, ItemPrice, PurchaseReceipt, ReservationStatus, SalesOrder, StockLedgerEntry,
    TireSize, year_matches,
};

#[derive(Debug, Default)]
pub(crate) struct StockState {
    pub(crate) items: HashMap<String, Item>,
    pub(crate) tire_sizes: HashMap<String, TireSize>,
    pub(crate) bins: BTreeMap<(String, String), Bin>,
    pub(crate) ledger: Vec<StockLedgerEntry>,
    pub(crate) sales_orders: BTreeMap<DocName, SalesOrder>,
    pub(crate) receipts: BTreeMap<DocName, PurchaseReceipt>,
    pub(crate) item_prices: BTreeMap<DocName, ItemPrice>,
    pub(crate) selling_price_list: Option<String>,
    pub(crate) next_price: u64,
}

impl StockState {
    pub(crate) fn receipt(&self, name: &DocName) -> StockResult<&PurchaseReceipt> {
        self.receipts
            .get(name)
            .ok_or_else(|| StockError::from(DomainError::not_found(PurchaseReceipt::DOCTYPE, name.as_str())))
    }

    pub(crate) fn next_price_name(&mut self) -> DocName {
        loop {
            self.next_price += 1;
            let name = DocName::new(format!("IP-{:05}", self.next_price));
            if !self.item_prices.contains_key(&name) {
                return name;
            }
        }
    }

    pub(crate) fn is_stock_item(&self, item_code: &str) -> bool {
        self.items.get(item_code).is_some_and(|i| i.is_stock_item)
    }

    /// Net quantity on the stock ledger for an item and production year,
    /// optionally limited to one warehouse. `None` when no entries exist.
    pub(crate) fn ledger_qty(
        &self,
        item_code: &str,
        year: Option<&str>,
        warehouse: Option<&str>,
    ) -> Option<Decimal> {
        let mut rows = self
            .ledger
            .iter()
            .filter(|e| {
                !e.is_cancelled
                    && e.item_code == item_code
                    && year_matches(year, e.production_year.as_deref())
                    && warehouse.is_none_or(|w| e.warehouse == w)
            })
            .peekable();
        rows.peek()?;
        Some(rows.map(|e| e.actual_qty).sum())
    }

    /// Quantity still to deliver on stock-holding sales orders for an item and
    /// production year.
    ///
    /// `filter` limits the orders by reservation status and warehouse, and can
    /// restrict the count to stock items. By default only lines with quantity
    /// left count; with `net_over_delivery` every line counts, so an
    /// over-delivered line lowers the total, and a total at or below zero is
    /// reported as no demand.
    pub(crate) fn pending_delivery(
        &self,
        item_code: &str,
        year: Option<&str>,
        filter: DemandFilter<'_>,
    ) -> Option<Decimal> {
        if filter.stock_items_only && !self.is_stock_item(item_code) {
            return None;
        }
        let mut pending = self
            .sales_orders
            .values()
            .filter(|so| so.holds_stock())
            .filter(|so| filter.reservation.is_none_or(|r| so.reservation_status == r))
            .filter(|so| filter.warehouse.is_none_or(|w| so.set_warehouse == w))
            .flat_map(|so| so.items.iter())
            .filter(|line| {
                line.item_code == item_code
                    && year_matches(year, line.production_year.as_deref())
                    && (filter.net_over_delivery || line.pending_qty() > Decimal::ZERO)
            })
            .map(|line| line.pending_qty())
            .peekable();
        pending.peek()?;
        let total: Decimal = pending.sum();
        if filter.net_over_delivery && total <= Decimal::ZERO {
            return None;
        }
        Some(total)
    }
}

/// Which sales order demand to count.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct DemandFilter<'a> {
    pub(crate) reservation: Option<ReservationStatus>,
    pub(crate) warehouse: Option<&'a str>,
    pub(crate) stock_items_only: bool,
    pub(crate) net_over_delivery: bool,
}

/// Items, stock, orders, receipts and prices held in memory.
///
/// Reads take a shared lock over the whole book so every operation sees one
/// consistent snapshot.
#[derive(Debug, Default)]
pub struct StockBook {
    state: RwLock<StockState>,
}

impl StockBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn read(&self) -> StockResult<RwLockReadGuard<'_, StockState>> {
        self.state
            .read()
            .map_err(|_| StockError::Storage("stock book lock poisoned".into()))
    }

    pub(crate) fn write(&self) -> StockResult<RwLockWriteGuard<'_, StockState>> {
        self.state
            .write()
            .map_err(|_| StockError::Storage("stock book lock poisoned".into()))
    }

    pub fn insert_item(&self, item: Item) -> StockResult<()> {
        self.write()?.items.insert(item.item_code.clone(), item);
        Ok(())
    }

    pub fn insert_tire_size(&self, size: TireSize) -> StockResult<()> {
        self.write()?.tire_sizes.insert(size.name.clone(), size);
        Ok(())
    }

    pub fn insert_bin(&self, bin: Bin) -> StockResult<()> {
        self.write()?
            .bins
            .insert((bin.item_code.clone(), bin.warehouse.clone()), bin);
        Ok(())
    }

    pub fn insert_ledger_entry(&self, entry: StockLedgerEntry) -> StockResult<()> {
        self.write()?.ledger.push(entry);
        Ok(())
    }

    pub fn insert_sales_order(&self, order: SalesOrder) -> StockResult<()> {
        self.write()?.sales_orders.insert(order.name.clone(), order);
        Ok(())
    }

    pub fn insert_receipt(&self, receipt: PurchaseReceipt) -> StockResult<()> {
        self.write()?.receipts.insert(receipt.name.clone(), receipt);
        Ok(())
    }

    pub fn insert_item_price(&self, price: ItemPrice) -> StockResult<()> {
        self.write()?.item_prices.insert(price.name.clone(), price);
        Ok(())
    }

    /// Default selling price list from selling settings.
    pub fn set_selling_price_list(&self, price_list: impl Into<String>) -> StockResult<()> {
        self.write()?.selling_price_list = Some(price_list.into());
        Ok(())
    }

    pub fn selling_price_list(&self) -> StockResult<Option<String>> {
        Ok(self.read()?.selling_price_list.clone())
    }

    pub fn receipt(&self, name: &DocName) -> StockResult<PurchaseReceipt> {
        Ok(self.read()?.receipt(name)?.clone())
    }

    pub fn item_price(&self, name: &DocName) -> StockResult<Option<ItemPrice>> {
        Ok(self.read()?.item_prices.get(name).cloned())
    }

    /// All item prices, by name.
    pub fn item_prices(&self) -> StockResult<Vec<ItemPrice>> {
        Ok(self.read()?.item_prices.values().cloned().collect())
    }

    pub fn bin(&self, item_code: &str, warehouse: &str) -> StockResult<Option<Bin>> {
        Ok(self
            .read()?
            .bins
            .get(&(item_code.to_string(), warehouse.to_string()))
            .cloned())
    }

    pub fn stock_ledger(&self) -> StockResult<Vec<StockLedgerEntry>> {
        Ok(self.read()?.ledger.clone())
    }
}
