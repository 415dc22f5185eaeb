//! `acctkit-stock`: purchase receipt and selling price utilities.
//!
//! Stock is counted per item and production year. Receipts can be virtual
//! (announced but not arrived) and then count as future supply against sales
//! orders reserved for future receipts.

pub mod book;
pub mod error;
pub mod model;
pub mod pricing;
pub mod receipt;

pub use book::StockBook;
pub use error::{StockError, StockResult};
pub use model::{
    Bin, Item, ItemPrice, ItemPriceFilter, LandedCosts, PurchaseReceipt, PurchaseReceiptItem,
    ReservationStatus, SalesOrder, SalesOrderItem, SalesOrderStatus, StockLedgerEntry, TireSize,
    normalize_year, year_matches,
};
pub use pricing::{PriceEdit, PriceEditSummary, marked_up_price};
pub use receipt::{Availability, AvailabilityRow, ValuationRow};
