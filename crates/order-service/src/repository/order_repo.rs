//! PostgreSQL 分片订单仓储

use async_trait::async_trait;
use order_shared::database::ShardedDatabase;
use order_shared::models::{LineItem, Order, OrderStatus};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::{debug, instrument};

use super::traits::OrderRepositoryTrait;
use crate::error::{OrderError, Result};
use crate::sharding::ShardRouter;

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    user_id: i64,
    order_id: i64,
    total: f64,
    total_markup: f64,
    total_discount: f64,
    status: String,
    idempotency_key: String,
}

#[derive(sqlx::FromRow)]
struct LineItemRow {
    product_id: i64,
    quantity: i32,
    markup: f64,
    discount: f64,
    final_price: f64,
}

impl From<LineItemRow> for LineItem {
    fn from(row: LineItemRow) -> Self {
        Self {
            product_id: row.product_id,
            quantity: row.quantity,
            markup: row.markup,
            discount: row.discount,
            final_price: row.final_price,
        }
    }
}

impl OrderRow {
    fn into_order(self, line_items: Vec<LineItem>) -> Result<Order> {
        let status: OrderStatus = self
            .status
            .parse()
            .map_err(|e| OrderError::Internal(format!("order {}: {}", self.order_id, e)))?;

        Ok(Order {
            id: self.id,
            user_id: self.user_id,
            order_id: self.order_id,
            line_items,
            total: self.total,
            total_markup: self.total_markup,
            total_discount: self.total_discount,
            status,
            idempotency_key: self.idempotency_key,
        })
    }
}

/// 分片订单仓储
pub struct OrderRepository {
    db: ShardedDatabase,
    router: ShardRouter,
}

impl OrderRepository {
    /// 路由分片数必须与连接池数量一致
    pub fn new(db: ShardedDatabase, router: ShardRouter) -> Result<Self> {
        if db.shard_count() != router.shard_count() {
            return Err(OrderError::Internal(format!(
                "shard router expects {} shards, database has {}",
                router.shard_count(),
                db.shard_count()
            )));
        }
        Ok(Self { db, router })
    }

    fn pool_for(&self, order_id: i64) -> Result<&PgPool> {
        Ok(self.db.shard(self.router.shard_for(order_id))?)
    }

    /// 批量写入订单行；空集合直接返回（零行的 VALUES 是非法 SQL）
    async fn insert_line_items(
        conn: &mut PgConnection,
        order_row_id: i64,
        items: &[LineItem],
    ) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO line_items \
             (order_row_id, position, product_id, quantity, markup, discount, final_price) ",
        );
        builder.push_values(items.iter().enumerate(), |mut b, (position, item)| {
            b.push_bind(order_row_id)
                .push_bind(position as i32)
                .push_bind(item.product_id)
                .push_bind(item.quantity)
                .push_bind(item.markup)
                .push_bind(item.discount)
                .push_bind(item.final_price);
        });

        builder.build().execute(conn).await?;
        Ok(())
    }

    async fn load_line_items(conn: &mut PgConnection, order_row_id: i64) -> Result<Vec<LineItem>> {
        let rows = sqlx::query_as::<_, LineItemRow>(
            r#"
            SELECT product_id, quantity, markup, discount, final_price
            FROM line_items
            WHERE order_row_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(order_row_id)
        .fetch_all(conn)
        .await?;

        Ok(rows.into_iter().map(LineItem::from).collect())
    }
}

/// 唯一约束冲突：幂等键冲突视为重复请求，其余保留为存储错误
fn map_insert_error(err: sqlx::Error, order: &Order) -> OrderError {
    if let Some(db_err) = err.as_database_error()
        && db_err.is_unique_violation()
        && db_err
            .constraint()
            .is_some_and(|c| c.contains("idempotency_key"))
    {
        return OrderError::DuplicateRequest(order.idempotency_key.clone());
    }
    OrderError::Database(err)
}

#[async_trait]
impl OrderRepositoryTrait for OrderRepository {
    #[instrument(skip(self, order), fields(order_id = order.order_id))]
    async fn create(&self, order: &Order) -> Result<i64> {
        let pool = self.pool_for(order.order_id)?;
        let mut tx = pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO orders
                (user_id, order_id, total, total_markup, total_discount, status, idempotency_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(order.user_id)
        .bind(order.order_id)
        .bind(order.total)
        .bind(order.total_markup)
        .bind(order.total_discount)
        .bind(order.status.as_str())
        .bind(&order.idempotency_key)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_insert_error(e, order))?;

        // 任一步失败时 tx 被 drop，事务回滚
        Self::insert_line_items(&mut tx, id, &order.line_items).await?;
        tx.commit().await?;

        debug!(
            id,
            shard = self.router.shard_for(order.order_id),
            "订单已写入"
        );
        Ok(id)
    }

    #[instrument(skip(self, order), fields(order_id = order.order_id))]
    async fn replace(&self, order: &Order) -> Result<()> {
        let pool = self.pool_for(order.order_id)?;
        let mut tx = pool.begin().await?;

        let row_id: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE orders
            SET user_id = $1, total = $2, total_markup = $3, total_discount = $4,
                status = $5, updated_at = NOW()
            WHERE order_id = $6
            RETURNING id
            "#,
        )
        .bind(order.user_id)
        .bind(order.total)
        .bind(order.total_markup)
        .bind(order.total_discount)
        .bind(order.status.as_str())
        .bind(order.order_id)
        .fetch_optional(&mut *tx)
        .await?;

        let row_id = row_id.ok_or(OrderError::NotFound(order.order_id))?;

        sqlx::query("DELETE FROM line_items WHERE order_row_id = $1")
            .bind(row_id)
            .execute(&mut *tx)
            .await?;

        Self::insert_line_items(&mut tx, row_id, &order.line_items).await?;
        tx.commit().await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, order_id: i64) -> Result<Option<Order>> {
        let pool = self.pool_for(order_id)?;
        let mut tx = pool.begin().await?;

        // 同一快照内读取订单与订单行，避免与并发的整单替换交错
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, user_id, order_id, total, total_markup, total_discount,
                   status, idempotency_key
            FROM orders
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let line_items = Self::load_line_items(&mut tx, row.id).await?;
        tx.commit().await?;

        row.into_order(line_items).map(Some)
    }

    #[instrument(skip(self))]
    async fn set_status(&self, order_id: i64, status: OrderStatus) -> Result<()> {
        let pool = self.pool_for(order_id)?;

        let result = sqlx::query(
            "UPDATE orders SET status = $1, updated_at = NOW() WHERE order_id = $2",
        )
        .bind(status.as_str())
        .bind(order_id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrderError::NotFound(order_id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, order_id: i64) -> Result<()> {
        let pool = self.pool_for(order_id)?;
        let mut tx = pool.begin().await?;

        let row_id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM orders WHERE order_id = $1 FOR UPDATE")
                .bind(order_id)
                .fetch_optional(&mut *tx)
                .await?;

        let row_id = row_id.ok_or(OrderError::NotFound(order_id))?;

        sqlx::query("DELETE FROM line_items WHERE order_row_id = $1")
            .bind(row_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(row_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
