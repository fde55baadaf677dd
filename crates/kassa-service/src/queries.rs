//! # Listing Queries
//!
//! Typed transaction and payment listings. Queries are validated here, once,
//! before the repository turns them into SQL.

use tracing::{debug, instrument};

use crate::error::ServiceResult;
use crate::service::Kassa;
use kassa_core::query::{PaymentQuery, TransactionQuery};
use kassa_core::{Payment, Transaction};

impl Kassa {
    #[instrument(skip(self, query))]
    pub async fn search_transactions(&self, query: &TransactionQuery) -> ServiceResult<Vec<Transaction>> {
        query.validate()?;
        let found = self.db().transactions().search(query).await?;
        debug!(count = found.len(), "Transactions listed");
        Ok(found)
    }

    #[instrument(skip(self, query))]
    pub async fn search_payments(&self, query: &PaymentQuery) -> ServiceResult<Vec<Payment>> {
        query.validate()?;
        let found = self.db().payments().search(query).await?;
        debug!(count = found.len(), "Payments listed");
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::orders::PlaceOrder;
    use crate::testing::{kassa, open_session, seed_lot, seed_product};
    use chrono::{Duration, Utc};
    use kassa_core::query::{Pagination, SortDirection, TransactionSort};
    use kassa_core::TransactionStatus;

    #[tokio::test]
    async fn test_transactions_sorted_and_paged() {
        let kassa = kassa().await;
        let (session, _) = open_session(&kassa, "cashier-1").await;
        let product = seed_product(&kassa, 1000).await;
        seed_lot(&kassa, &product.id, 20, Utc::now()).await;

        for quantity in [3, 1, 2] {
            kassa
                .place_order(&session, &PlaceOrder::new(&product.id, quantity))
                .await
                .unwrap();
        }

        let query = TransactionQuery {
            product_id: Some(product.id.clone()),
            status: Some(TransactionStatus::Pending),
            sort: TransactionSort::Quantity,
            direction: SortDirection::Desc,
            pagination: Pagination { page: 1, per_page: 2 },
            ..Default::default()
        };
        let page: Vec<i64> = kassa
            .search_transactions(&query)
            .await
            .unwrap()
            .iter()
            .map(|t| t.quantity)
            .collect();
        assert_eq!(page, vec![3, 2]);

        let query = TransactionQuery {
            pagination: Pagination { page: 2, per_page: 2 },
            ..query
        };
        assert_eq!(kassa.search_transactions(&query).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_query_rejected_before_sql() {
        let kassa = kassa().await;
        let now = Utc::now();
        let query = PaymentQuery {
            created_after: Some(now),
            created_before: Some(now - Duration::hours(1)),
            pagination: Pagination { page: 0, per_page: 500 },
            ..Default::default()
        };
        match kassa.search_payments(&query).await {
            Err(ServiceError::Validation(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected validation errors, got {other:?}"),
        }
    }
}
