//! Generic repository trait defining CRUD access for any [`Entity`].
//!
//! The trait is storage-agnostic: the infrastructure layer supplies the SQL
//! implementation. Every operation runs inside whatever transaction or
//! savepoint is open on the unit of work the implementation is bound to, and
//! none of them commits or rolls back.

use async_trait::async_trait;

use super::entity::Entity;
use super::filter::Filter;
use super::value::{Attributes, Value};
use crate::errors::{DbError, DbResult};

/// Repository trait for persistence of one record type `T`
///
/// Methods take `&mut self` because an implementation wraps a single
/// connection that cannot run two statements at once.
///
/// # Example
/// ```no_run
/// use ks_core::repositories::{Attributes, Entity, Filter, Repository, Value};
/// use ks_core::errors::DbResult;
///
/// async fn ship<T: Entity, R: Repository<T>>(repo: &mut R, id: i64) -> DbResult<Option<T>> {
///     if !repo.exists(&Filter::new().eq("id", id).eq("status", "pending")).await? {
///         return Ok(None);
///     }
///     repo.update(Value::from(id), Attributes::new().set("status", "shipped")).await
/// }
/// ```
#[async_trait]
pub trait Repository<T: Entity>: Send {
    /// Single-row lookup by primary key
    async fn get(&mut self, id: Value) -> DbResult<Option<T>>;

    /// First row matching `filter`
    ///
    /// Without an ordering on the filter, which row is returned when several
    /// match is unspecified.
    async fn get_by(&mut self, filter: &Filter) -> DbResult<Option<T>>;

    /// Skip `offset` rows and take at most `limit`; `None` means unbounded
    async fn get_all(&mut self, offset: u64, limit: Option<u64>) -> DbResult<Vec<T>>;

    /// Rows matching `filter`, paginated like [`Repository::get_all`]
    async fn filter(&mut self, offset: u64, limit: Option<u64>, filter: &Filter)
        -> DbResult<Vec<T>>;

    /// Insert a record and return it with its generated key
    ///
    /// # Errors
    /// `DbError::Database` wrapping the storage cause on constraint violation.
    async fn create(&mut self, attributes: Attributes) -> DbResult<T>;

    /// Insert several records; either all of them are written or none
    async fn create_many(&mut self, items: Vec<Attributes>) -> DbResult<Vec<T>>;

    /// Apply `attributes` to the record with `id`
    ///
    /// Returns `Ok(None)` without writing anything when no such record exists.
    async fn update(&mut self, id: Value, attributes: Attributes) -> DbResult<Option<T>>;

    /// Apply `values` to every matching row, returning the affected count
    async fn update_many(&mut self, filter: &Filter, values: Attributes) -> DbResult<u64>;

    /// Returns `true` if a row was deleted
    async fn delete(&mut self, id: Value) -> DbResult<bool>;

    async fn delete_many(&mut self, filter: &Filter) -> DbResult<u64>;

    /// Number of rows matching `filter`, or of all rows
    async fn count(&mut self, filter: Option<&Filter>) -> DbResult<u64>;

    async fn exists(&mut self, filter: &Filter) -> DbResult<bool> {
        Ok(self.count(Some(filter)).await? > 0)
    }

    /// Like [`Repository::get`] but fails with `DbError::NotFound`
    async fn get_or_raise(&mut self, id: Value) -> DbResult<T> {
        let lookup = Filter::new().eq(T::PRIMARY_KEY, id.clone()).to_json();
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found(T::NAME, lookup))
    }

    /// Like [`Repository::get_by`] but fails with `DbError::NotFound`
    async fn get_by_or_raise(&mut self, filter: &Filter) -> DbResult<T> {
        self.get_by(filter)
            .await?
            .ok_or_else(|| DbError::not_found(T::NAME, filter.to_json()))
    }
}
