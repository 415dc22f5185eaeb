//! Stock and pricing records.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use acctkit_core::{DocName, DocStatus, Document};

/// Production year of a batch. Empty strings are treated as absent.
pub fn normalize_year(year: Option<&str>) -> Option<&str> {
    year.filter(|y| !y.is_empty())
}

/// A concrete year matches equal years only; an absent year matches rows
/// whose year is absent or empty.
pub fn year_matches(filter: Option<&str>, value: Option<&str>) -> bool {
    normalize_year(filter) == normalize_year(value)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub item_code: String,
    pub item_name: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default = "default_true")]
    pub is_stock_item: bool,
    #[serde(default)]
    pub tire_size: Option<String>,
    #[serde(default)]
    pub ply_rating: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Item {
    pub fn new(item_code: impl Into<String>, item_name: impl Into<String>) -> Self {
        Self {
            item_code: item_code.into(),
            item_name: item_name.into(),
            brand: None,
            is_stock_item: true,
            tire_size: None,
            ply_rating: None,
        }
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    pub fn with_tire_size(mut self, tire_size: impl Into<String>, ply_rating: impl Into<String>) -> Self {
        self.tire_size = Some(tire_size.into());
        self.ply_rating = Some(ply_rating.into());
        self
    }

    pub fn non_stock(mut self) -> Self {
        self.is_stock_item = false;
        self
    }
}

/// Tire size master; `sorting_code` orders sizes in reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TireSize {
    pub name: String,
    pub sorting_code: i64,
}

/// Current quantity and value of one item in one warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bin {
    pub item_code: String,
    pub warehouse: String,
    pub actual_qty: Decimal,
    pub stock_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLedgerEntry {
    pub item_code: String,
    #[serde(default)]
    pub production_year: Option<String>,
    pub warehouse: String,
    pub posting_date: NaiveDate,
    /// Signed quantity change.
    pub actual_qty: Decimal,
    pub stock_value_difference: Decimal,
    #[serde(default)]
    pub voucher_no: Option<DocName>,
    #[serde(default)]
    pub is_cancelled: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalesOrderStatus {
    #[default]
    #[serde(rename = "To Deliver and Bill")]
    ToDeliverAndBill,
    #[serde(rename = "To Deliver")]
    ToDeliver,
    #[serde(rename = "To Bill")]
    ToBill,
    Completed,
    Closed,
}

impl SalesOrderStatus {
    /// Completed and closed orders no longer hold stock.
    pub fn is_open(self) -> bool {
        !matches!(self, Self::Completed | Self::Closed)
    }
}

/// How an order claims stock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    #[default]
    #[serde(rename = "Reserve against Current Stock")]
    CurrentStock,
    /// Demand to be covered by virtual receipts not yet in stock.
    #[serde(rename = "Reserve against Future Receipts")]
    FutureReceipts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderItem {
    pub item_code: String,
    #[serde(default)]
    pub production_year: Option<String>,
    pub qty: Decimal,
    #[serde(default)]
    pub delivered_qty: Decimal,
}

impl SalesOrderItem {
    pub fn pending_qty(&self) -> Decimal {
        self.qty - self.delivered_qty
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrder {
    pub name: DocName,
    pub set_warehouse: String,
    #[serde(default)]
    pub status: SalesOrderStatus,
    #[serde(default)]
    pub reservation_status: ReservationStatus,
    #[serde(default)]
    pub docstatus: DocStatus,
    pub items: Vec<SalesOrderItem>,
}

impl SalesOrder {
    /// Submitted and neither completed nor closed.
    pub fn holds_stock(&self) -> bool {
        self.docstatus.is_submitted() && self.status.is_open()
    }
}

impl Document for SalesOrder {
    const DOCTYPE: &'static str = "Sales Order";

    fn name(&self) -> &DocName {
        &self.name
    }

    fn docstatus(&self) -> DocStatus {
        self.docstatus
    }
}

/// Costs spread over a receipt's lines in proportion to their value.
///
/// Foreign-currency charges carry their own exchange rate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LandedCosts {
    pub freight_amount: Decimal,
    pub freight_exchange_rate: Decimal,
    pub inspection_amount: Decimal,
    pub inspection_exchange_rate: Decimal,
    pub clearance_amount: Decimal,
    pub transport_amount: Decimal,
    pub foreign_bank_charges_amount: Decimal,
    pub foreign_bank_charges_exchange_rate: Decimal,
    pub local_bank_charges_amount: Decimal,
}

impl LandedCosts {
    /// Total in company currency.
    pub fn total(&self) -> Decimal {
        self.freight_amount * self.freight_exchange_rate
            + self.inspection_amount * self.inspection_exchange_rate
            + self.clearance_amount
            + self.transport_amount
            + self.foreign_bank_charges_amount * self.foreign_bank_charges_exchange_rate
            + self.local_bank_charges_amount
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceiptItem {
    pub item_code: String,
    pub item_name: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub production_year: Option<String>,
    pub qty: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
    /// Net amount in company currency.
    pub base_net_amount: Decimal,
    #[serde(default)]
    pub item_tax_amount: Decimal,
    /// Defaults to the receipt's warehouse.
    #[serde(default)]
    pub warehouse: Option<String>,
}

impl PurchaseReceiptItem {
    pub fn new(item_code: impl Into<String>, item_name: impl Into<String>, qty: Decimal, rate: Decimal) -> Self {
        let amount = qty * rate;
        Self {
            item_code: item_code.into(),
            item_name: item_name.into(),
            brand: None,
            production_year: None,
            qty,
            rate,
            amount,
            base_net_amount: amount,
            item_tax_amount: Decimal::ZERO,
            warehouse: None,
        }
    }

    pub fn with_year(mut self, year: impl Into<String>) -> Self {
        self.production_year = Some(year.into());
        self
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    pub fn with_tax(mut self, item_tax_amount: Decimal) -> Self {
        self.item_tax_amount = item_tax_amount;
        self
    }

    /// Cost before landed charges.
    pub fn cost(&self) -> Decimal {
        self.base_net_amount + self.item_tax_amount
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub name: DocName,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub posting_date: Option<NaiveDate>,
    pub set_warehouse: String,
    /// Draft virtual receipts count as future supply.
    #[serde(default)]
    pub virtual_receipt: bool,
    #[serde(default)]
    pub docstatus: DocStatus,
    #[serde(default)]
    pub landed_costs: LandedCosts,
    pub base_grand_total: Decimal,
    pub items: Vec<PurchaseReceiptItem>,
}

impl PurchaseReceipt {
    pub fn new(name: impl Into<DocName>, title: impl Into<String>, warehouse: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            posting_date: None,
            set_warehouse: warehouse.into(),
            virtual_receipt: false,
            docstatus: DocStatus::Draft,
            landed_costs: LandedCosts::default(),
            base_grand_total: Decimal::ZERO,
            items: Vec::new(),
        }
    }

    /// Append a line and add its net amount to the grand total.
    pub fn with_item(mut self, item: PurchaseReceiptItem) -> Self {
        self.base_grand_total += item.base_net_amount;
        self.items.push(item);
        self
    }

    pub fn with_landed_costs(mut self, costs: LandedCosts) -> Self {
        self.landed_costs = costs;
        self
    }

    pub fn virtual_receipt(mut self) -> Self {
        self.virtual_receipt = true;
        self
    }

    /// Share of landed costs per unit of grand total. Zero when the total is zero.
    pub fn landed_cost_prorata(&self) -> Decimal {
        self.landed_costs
            .total()
            .checked_div(self.base_grand_total)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn line_warehouse<'a>(&'a self, line: &'a PurchaseReceiptItem) -> &'a str {
        line.warehouse.as_deref().unwrap_or(&self.set_warehouse)
    }

    /// Draft virtual receipts are counted as incoming supply.
    pub fn is_future_supply(&self) -> bool {
        self.docstatus.is_draft() && self.virtual_receipt
    }
}

impl Document for PurchaseReceipt {
    const DOCTYPE: &'static str = "Purchase Receipt";

    fn name(&self) -> &DocName {
        &self.name
    }

    fn docstatus(&self) -> DocStatus {
        self.docstatus
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPrice {
    pub name: DocName,
    pub item_code: String,
    #[serde(default)]
    pub item_name: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub production_year: Option<String>,
    pub price_list: String,
    #[serde(default = "default_true")]
    pub selling: bool,
    pub price_list_rate: Decimal,
    #[serde(default)]
    pub stock_valuation_rate: Decimal,
    #[serde(default)]
    pub stock_qty: Decimal,
    #[serde(default)]
    pub available_qty: Decimal,
}

impl ItemPrice {
    pub const DOCTYPE: &'static str = "Item Price";

    pub fn new(
        name: impl Into<DocName>,
        item_code: impl Into<String>,
        price_list: impl Into<String>,
        price_list_rate: Decimal,
    ) -> Self {
        Self {
            name: name.into(),
            item_code: item_code.into(),
            item_name: String::new(),
            brand: None,
            production_year: None,
            price_list: price_list.into(),
            selling: true,
            price_list_rate,
            stock_valuation_rate: Decimal::ZERO,
            stock_qty: Decimal::ZERO,
            available_qty: Decimal::ZERO,
        }
    }

    pub fn with_year(mut self, year: impl Into<String>) -> Self {
        self.production_year = Some(year.into());
        self
    }

    pub fn with_valuation_rate(mut self, rate: Decimal) -> Self {
        self.stock_valuation_rate = rate;
        self
    }
}

/// Which item prices an operation applies to. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemPriceFilter {
    pub price_list: Option<String>,
    pub item_code: Option<String>,
    pub brand: Option<String>,
    pub selling: Option<bool>,
}

impl ItemPriceFilter {
    pub fn price_list(name: impl Into<String>) -> Self {
        Self {
            price_list: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    pub fn matches(&self, price: &ItemPrice) -> bool {
        self.price_list.as_ref().is_none_or(|p| *p == price.price_list)
            && self.item_code.as_ref().is_none_or(|c| *c == price.item_code)
            && self.brand.as_ref().is_none_or(|b| price.brand.as_ref() == Some(b))
            && self.selling.is_none_or(|s| s == price.selling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn absent_year_matches_absent_or_empty() {
        assert!(year_matches(None, None));
        assert!(year_matches(None, Some("")));
        assert!(year_matches(Some(""), None));
        assert!(!year_matches(None, Some("2023")));
    }

    #[test]
    fn concrete_year_matches_equal_only() {
        assert!(year_matches(Some("2023"), Some("2023")));
        assert!(!year_matches(Some("2023"), Some("2024")));
        assert!(!year_matches(Some("2023"), None));
        assert!(!year_matches(Some("2023"), Some("")));
    }

    #[test]
    fn landed_cost_prorata() {
        let receipt = PurchaseReceipt::new("PR-1", "Tires", "Main - LC")
            .with_item(PurchaseReceiptItem::new("T-1", "Tire", dec!(10), dec!(100)))
            .with_landed_costs(LandedCosts {
                freight_amount: dec!(10),
                freight_exchange_rate: dec!(5),
                clearance_amount: dec!(50),
                ..LandedCosts::default()
            });

        assert_eq!(receipt.base_grand_total, dec!(1000));
        assert_eq!(receipt.landed_cost_prorata(), dec!(0.1));
    }

    #[test]
    fn zero_grand_total_has_no_prorata() {
        let receipt = PurchaseReceipt::new("PR-1", "Empty", "Main - LC").with_landed_costs(LandedCosts {
            transport_amount: dec!(20),
            ..LandedCosts::default()
        });
        assert_eq!(receipt.landed_cost_prorata(), Decimal::ZERO);
    }

    #[test]
    fn sales_order_status_round_trips_display_names() {
        let json = serde_json::to_string(&ReservationStatus::FutureReceipts).unwrap();
        assert_eq!(json, "\"Reserve against Future Receipts\"");
        let status: SalesOrderStatus = serde_json::from_str("\"Closed\"").unwrap();
        assert!(!status.is_open());
    }

    #[test]
    fn filter_matches_set_fields_only() {
        let price = ItemPrice::new("IP-1", "T-1", "Standard Selling", dec!(10));
        assert!(ItemPriceFilter::default().matches(&price));
        assert!(ItemPriceFilter::price_list("Standard Selling").matches(&price));
        assert!(!ItemPriceFilter::price_list("Wholesale").matches(&price));
        assert!(!ItemPriceFilter::default().with_brand("Acme").matches(&price));
    }
}
