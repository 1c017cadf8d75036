/*!
 * Transaction boundary for multi-statement writes.
 *
 * Every order mutation runs inside [`with_transaction`]: the closure either
 * returns `Ok` and the transaction commits, or returns `Err` and every write
 * made so far is rolled back before the error reaches the caller.
 */

use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, TransactionTrait};
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use tracing::{error, warn};

/// Type alias for boxed future used in transactions
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Execute a function within a database transaction
///
/// A failing rollback is logged and the closure's original error is returned,
/// so the root cause is never replaced by the rollback failure.
///
/// ```rust,ignore
/// let order = with_transaction(&db, move |txn| {
///     Box::pin(async move {
///         order.insert(txn).await?;
///         item.insert(txn).await?;
///         recompute_total(txn, &order_id).await
///     })
/// })
/// .await?;
/// ```
pub async fn with_transaction<F, T, E>(db: &DatabaseConnection, f: F) -> Result<T, E>
where
    F: for<'a> FnOnce(&'a DatabaseTransaction) -> BoxFuture<'a, Result<T, E>>,
    E: From<DbErr> + Display,
{
    let txn = db.begin().await.map_err(|e| {
        error!("Failed to begin transaction: {}", e);
        E::from(e)
    })?;

    let result = f(&txn).await;

    match result {
        Ok(value) => {
            txn.commit().await.map_err(|e| {
                error!("Failed to commit transaction: {}", e);
                E::from(e)
            })?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                warn!(
                    original_error = %err,
                    rollback_error = %rollback_err,
                    "Transaction rollback failed"
                );
            }
            Err(err)
        }
    }
}
