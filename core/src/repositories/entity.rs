//! Record-type descriptor implemented by every persisted type

use super::value::Value;

/// Describes how a record type maps onto its table
///
/// ```
/// use ks_core::repositories::{Entity, Value};
///
/// struct Order {
///     id: i64,
///     status: String,
/// }
///
/// impl Entity for Order {
///     const NAME: &'static str = "Order";
///     const TABLE: &'static str = "orders";
///     const COLUMNS: &'static [&'static str] = &["id", "status"];
///
///     fn primary_key(&self) -> Value {
///         Value::from(self.id)
///     }
/// }
///
/// assert!(Order::has_column("status"));
/// ```
pub trait Entity: Send + Sync + Unpin + 'static {
    /// Human-readable type name used in errors and logs
    const NAME: &'static str;

    /// Backing table
    const TABLE: &'static str;

    /// Primary-key column
    const PRIMARY_KEY: &'static str = "id";

    /// Every column of the table, primary key included
    const COLUMNS: &'static [&'static str];

    /// Primary-key value of this record
    fn primary_key(&self) -> Value;

    fn has_column(name: &str) -> bool {
        Self::COLUMNS.contains(&name)
    }
}
