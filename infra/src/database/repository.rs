//! SQL implementation of the generic [`Repository`] trait
//!
//! Statements are built from the entity descriptor: table, primary key and
//! column list. Every field name coming from a filter or attribute set is
//! checked against the column list before it reaches SQL; values are always
//! bound, never interpolated.

use std::marker::PhantomData;

use async_trait::async_trait;
use ks_core::errors::{DbError, DbResult, ErrorCode};
use ks_core::repositories::{Attributes, Entity, Filter, Repository, SortOrder, Value};
use sqlx::FromRow;

use super::backend::{
    empty_insert, last_insert_id, quote_identifier, to_arguments, Db, DbQueryResult, DbRow,
    UNBOUNDED_LIMIT,
};
use super::transaction::TransactionScope;
use super::unit_of_work::UnitOfWork;

/// Repository for `T` bound to one unit of work
///
/// Runs inside whatever transaction or savepoint is open on the unit and
/// never commits or rolls back on its own. The repository holds the unit's
/// mutable borrow, so create one per use site:
///
/// ```no_run
/// use ks_infra::database::{SqlRepository, UnitOfWork};
/// use ks_core::repositories::{Entity, Repository, Value};
/// use ks_core::errors::DbResult;
///
/// #[derive(sqlx::FromRow)]
/// struct Customer { id: i64, email: String }
///
/// impl Entity for Customer {
///     const NAME: &'static str = "Customer";
///     const TABLE: &'static str = "customers";
///     const COLUMNS: &'static [&'static str] = &["id", "email"];
///     fn primary_key(&self) -> Value { Value::from(self.id) }
/// }
///
/// async fn email_of(uow: &mut UnitOfWork, id: i64) -> DbResult<String> {
///     let customer = SqlRepository::<Customer>::new(uow).get_or_raise(Value::from(id)).await?;
///     Ok(customer.email)
/// }
/// ```
pub struct SqlRepository<'u, T> {
    uow: &'u mut UnitOfWork,
    _entity: PhantomData<fn() -> T>,
}

impl<'u, T> SqlRepository<'u, T>
where
    T: Entity + for<'r> FromRow<'r, DbRow>,
{
    pub fn new(uow: &'u mut UnitOfWork) -> Self {
        Self {
            uow,
            _entity: PhantomData,
        }
    }
}

#[async_trait]
impl<'u, T> Repository<T> for SqlRepository<'u, T>
where
    T: Entity + for<'r> FromRow<'r, DbRow>,
{
    async fn get(&mut self, id: Value) -> DbResult<Option<T>> {
        find::<T>(self.uow, id).await
    }

    async fn get_by(&mut self, filter: &Filter) -> DbResult<Option<T>> {
        check_filter::<T>(filter)?;
        let mut statement = select::<T>();
        statement.where_clause(filter);
        statement.order_by(filter.ordering());
        statement.push(" LIMIT 1");
        fetch_optional::<T>(self.uow, statement, "get_by").await
    }

    async fn get_all(&mut self, offset: u64, limit: Option<u64>) -> DbResult<Vec<T>> {
        let mut statement = select::<T>();
        statement.order_by(Some((T::PRIMARY_KEY, SortOrder::Asc)));
        statement.page(offset, limit);
        fetch_all::<T>(self.uow, statement, "get_all").await
    }

    async fn filter(
        &mut self,
        offset: u64,
        limit: Option<u64>,
        filter: &Filter,
    ) -> DbResult<Vec<T>> {
        check_filter::<T>(filter)?;
        let mut statement = select::<T>();
        statement.where_clause(filter);
        statement.order_by(
            filter
                .ordering()
                .or(Some((T::PRIMARY_KEY, SortOrder::Asc))),
        );
        statement.page(offset, limit);
        fetch_all::<T>(self.uow, statement, "filter").await
    }

    async fn create(&mut self, attributes: Attributes) -> DbResult<T> {
        insert::<T>(self.uow, &attributes).await
    }

    async fn create_many(&mut self, items: Vec<Attributes>) -> DbResult<Vec<T>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        for attributes in &items {
            check_fields::<T>(attributes.fields())?;
        }

        // A savepoint, never the outer transaction: create_many must not commit
        self.uow.ensure_transaction().await?;
        let mut scope = TransactionScope::begin(&mut *self.uow).await?;
        let mut created = Vec::with_capacity(items.len());
        for attributes in &items {
            match insert::<T>(&mut scope, attributes).await {
                Ok(row) => created.push(row),
                Err(err) => {
                    if let Err(rollback_err) = scope.rollback().await {
                        tracing::warn!(
                            entity = T::NAME,
                            error = %rollback_err,
                            "Rollback of partial batch insert failed"
                        );
                    }
                    return Err(err.with_context("batch_size", items.len()));
                }
            }
        }
        scope.commit().await?;
        tracing::debug!(entity = T::NAME, count = created.len(), "Batch insert completed");
        Ok(created)
    }

    async fn update(&mut self, id: Value, attributes: Attributes) -> DbResult<Option<T>> {
        check_fields::<T>(attributes.fields())?;
        if find::<T>(self.uow, id.clone()).await?.is_none() {
            return Ok(None);
        }
        if attributes.is_empty() {
            return find::<T>(self.uow, id).await;
        }

        let reload_id = attributes
            .get(T::PRIMARY_KEY)
            .cloned()
            .unwrap_or_else(|| id.clone());
        let mut statement = Statement::new(format!("UPDATE {} SET ", quote_identifier(T::TABLE)));
        statement.assignments(&attributes);
        statement.push(&format!(" WHERE {} = ?", quote_identifier(T::PRIMARY_KEY)));
        statement.bind(id.clone());
        execute::<T>(self.uow, statement, "update")
            .await
            .map_err(|err| err.with_context(T::PRIMARY_KEY, id.to_json()))?;

        find::<T>(self.uow, reload_id).await
    }

    async fn update_many(&mut self, filter: &Filter, values: Attributes) -> DbResult<u64> {
        check_filter::<T>(filter)?;
        check_fields::<T>(values.fields())?;
        if values.is_empty() {
            return Ok(0);
        }

        let mut statement = Statement::new(format!("UPDATE {} SET ", quote_identifier(T::TABLE)));
        statement.assignments(&values);
        statement.where_clause(filter);
        let result = execute::<T>(self.uow, statement, "update_many")
            .await
            .map_err(|err| err.with_context("filter", filter.to_json()))?;
        Ok(result.rows_affected())
    }

    async fn delete(&mut self, id: Value) -> DbResult<bool> {
        let mut statement = Statement::new(format!(
            "DELETE FROM {} WHERE {} = ?",
            quote_identifier(T::TABLE),
            quote_identifier(T::PRIMARY_KEY)
        ));
        statement.bind(id);
        let result = execute::<T>(self.uow, statement, "delete").await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_many(&mut self, filter: &Filter) -> DbResult<u64> {
        check_filter::<T>(filter)?;
        let mut statement = Statement::new(format!("DELETE FROM {}", quote_identifier(T::TABLE)));
        statement.where_clause(filter);
        let result = execute::<T>(self.uow, statement, "delete_many")
            .await
            .map_err(|err| err.with_context("filter", filter.to_json()))?;
        Ok(result.rows_affected())
    }

    async fn count(&mut self, filter: Option<&Filter>) -> DbResult<u64> {
        let mut statement = Statement::new(format!("SELECT COUNT(*) FROM {}", quote_identifier(T::TABLE)));
        if let Some(filter) = filter {
            check_filter::<T>(filter)?;
            statement.where_clause(filter);
        }
        let (sql, params) = statement.into_parts();
        let (count,): (i64,) = self
            .uow
            .fetch_one_as(sqlx::query_as_with::<Db, (i64,), _>(&sql, to_arguments(params)))
            .await
            .map_err(|err| operation_context::<T>(err, "count"))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

/// SQL text plus its positional parameters
struct Statement {
    sql: String,
    params: Vec<Value>,
}

impl Statement {
    fn new(sql: String) -> Self {
        Self {
            sql,
            params: Vec::new(),
        }
    }

    fn push(&mut self, fragment: &str) {
        self.sql.push_str(fragment);
    }

    fn bind(&mut self, value: Value) {
        self.params.push(value);
    }

    /// `a = ?, b = ?`
    fn assignments(&mut self, attributes: &Attributes) {
        let mut first = true;
        for (field, value) in attributes.iter() {
            if !first {
                self.sql.push_str(", ");
            }
            first = false;
            self.sql.push_str(&quote_identifier(field));
            self.sql.push_str(" = ?");
            self.params.push(value.clone());
        }
    }

    /// Conjunction of equalities; `Null` compares with `IS NULL`
    fn where_clause(&mut self, filter: &Filter) {
        for (index, (field, value)) in filter.conditions().iter().enumerate() {
            self.sql.push_str(if index == 0 { " WHERE " } else { " AND " });
            self.sql.push_str(&quote_identifier(field));
            if value.is_null() {
                self.sql.push_str(" IS NULL");
            } else {
                self.sql.push_str(" = ?");
                self.params.push(value.clone());
            }
        }
    }

    fn order_by(&mut self, ordering: Option<(&str, SortOrder)>) {
        if let Some((field, order)) = ordering {
            self.sql.push_str(&format!(
                " ORDER BY {} {}",
                quote_identifier(field),
                order.as_sql()
            ));
        }
    }

    fn page(&mut self, offset: u64, limit: Option<u64>) {
        match limit {
            Some(limit) => {
                self.sql.push_str(" LIMIT ? OFFSET ?");
                self.params.push(Value::Int(to_i64(limit)));
                self.params.push(Value::Int(to_i64(offset)));
            }
            None if offset > 0 => {
                self.sql.push_str(&format!(" LIMIT {} OFFSET ?", UNBOUNDED_LIMIT));
                self.params.push(Value::Int(to_i64(offset)));
            }
            None => {}
        }
    }

    fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn select<T: Entity>() -> Statement {
    let columns = T::COLUMNS
        .iter()
        .map(|column| quote_identifier(column))
        .collect::<Vec<_>>()
        .join(", ");
    Statement::new(format!(
        "SELECT {} FROM {}",
        columns,
        quote_identifier(T::TABLE)
    ))
}

fn check_fields<'a, T: Entity>(fields: impl IntoIterator<Item = &'a str>) -> DbResult<()> {
    for field in fields {
        if !T::has_column(field) {
            return Err(DbError::database(
                format!("Unknown field '{}' for {}", field, T::NAME),
                ErrorCode::InvalidInput,
            )
            .with_context("entity", T::NAME)
            .with_context("field", field));
        }
    }
    Ok(())
}

fn check_filter<T: Entity>(filter: &Filter) -> DbResult<()> {
    check_fields::<T>(filter.fields())?;
    if let Some((field, _)) = filter.ordering() {
        check_fields::<T>([field])?;
    }
    Ok(())
}

fn operation_context<T: Entity>(err: DbError, operation: &'static str) -> DbError {
    err.with_context("entity", T::NAME)
        .with_context("operation", operation)
}

async fn execute<T: Entity>(
    uow: &mut UnitOfWork,
    statement: Statement,
    operation: &'static str,
) -> DbResult<DbQueryResult> {
    let (sql, params) = statement.into_parts();
    uow.execute(sqlx::query_with(&sql, to_arguments(params)))
        .await
        .map_err(|err| operation_context::<T>(err, operation))
}

async fn fetch_all<T>(
    uow: &mut UnitOfWork,
    statement: Statement,
    operation: &'static str,
) -> DbResult<Vec<T>>
where
    T: Entity + for<'r> FromRow<'r, DbRow>,
{
    let (sql, params) = statement.into_parts();
    uow.fetch_all_as(sqlx::query_as_with::<Db, T, _>(&sql, to_arguments(params)))
        .await
        .map_err(|err| operation_context::<T>(err, operation))
}

async fn fetch_optional<T>(
    uow: &mut UnitOfWork,
    statement: Statement,
    operation: &'static str,
) -> DbResult<Option<T>>
where
    T: Entity + for<'r> FromRow<'r, DbRow>,
{
    let (sql, params) = statement.into_parts();
    uow.fetch_optional_as(sqlx::query_as_with::<Db, T, _>(&sql, to_arguments(params)))
        .await
        .map_err(|err| operation_context::<T>(err, operation))
}

async fn find<T>(uow: &mut UnitOfWork, id: Value) -> DbResult<Option<T>>
where
    T: Entity + for<'r> FromRow<'r, DbRow>,
{
    let mut statement = select::<T>();
    statement.push(&format!(
        " WHERE {} = ? LIMIT 1",
        quote_identifier(T::PRIMARY_KEY)
    ));
    statement.bind(id);
    fetch_optional::<T>(uow, statement, "get").await
}

/// Insert one row and load it back with its generated key
async fn insert<T>(uow: &mut UnitOfWork, attributes: &Attributes) -> DbResult<T>
where
    T: Entity + for<'r> FromRow<'r, DbRow>,
{
    check_fields::<T>(attributes.fields())?;

    let statement = if attributes.is_empty() {
        Statement::new(empty_insert(T::TABLE))
    } else {
        let columns = attributes
            .fields()
            .map(quote_identifier)
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; attributes.len()].join(", ");
        let mut statement = Statement::new(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(T::TABLE),
            columns,
            placeholders
        ));
        for (_, value) in attributes.iter() {
            statement.bind(value.clone());
        }
        statement
    };

    let result = execute::<T>(uow, statement, "create")
        .await
        .map_err(|err| err.with_context("attributes", attributes.to_json()))?;

    let id = match attributes.get(T::PRIMARY_KEY) {
        Some(id) => id.clone(),
        None => Value::Int(last_insert_id(&result)),
    };
    find::<T>(uow, id.clone()).await?.ok_or_else(|| {
        DbError::database(
            format!("Created {} could not be loaded back", T::NAME),
            ErrorCode::DatabaseQueryError,
        )
        .with_context(T::PRIMARY_KEY, id.to_json())
    })
}
