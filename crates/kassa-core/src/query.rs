//! # Typed Queries
//!
//! List queries are described by typed structs with enumerated filter and
//! sort fields. They are validated once, at the boundary, and the db layer
//! turns them into SQL with bound parameters. Column names only ever come
//! from the enums below, never from caller strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::types::TransactionStatus;

/// Largest page size a caller may request.
pub const MAX_PER_PAGE: u32 = 100;

// =============================================================================
// Shared Parts
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub const fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// One-based page selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Pagination {
            page: 1,
            per_page: 20,
        }
    }
}

impl Pagination {
    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.per_page)
    }

    fn validate(&self, errors: &mut Vec<ValidationError>) {
        if self.page < 1 {
            errors.push(ValidationError::MustBePositive {
                field: "page".to_string(),
            });
        }
        if self.per_page < 1 || self.per_page > MAX_PER_PAGE {
            errors.push(ValidationError::OutOfRange {
                field: "per_page".to_string(),
                min: 1,
                max: i64::from(MAX_PER_PAGE),
            });
        }
    }
}

fn validate_window(
    after: Option<DateTime<Utc>>,
    before: Option<DateTime<Utc>>,
    errors: &mut Vec<ValidationError>,
) {
    if let (Some(after), Some(before)) = (after, before) {
        if after >= before {
            errors.push(ValidationError::InvalidFormat {
                field: "created_after".to_string(),
                reason: "must be earlier than created_before".to_string(),
            });
        }
    }
}

fn finish(errors: Vec<ValidationError>) -> Result<(), Vec<ValidationError>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// =============================================================================
// Transaction Query
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionSort {
    #[default]
    CreatedAt,
    Total,
    Quantity,
}

impl TransactionSort {
    pub const fn column(&self) -> &'static str {
        match self {
            TransactionSort::CreatedAt => "created_at",
            TransactionSort::Total => "total",
            TransactionSort::Quantity => "quantity",
        }
    }
}

/// Filters for listing transactions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionQuery {
    pub product_id: Option<String>,
    pub payment_id: Option<String>,
    pub status: Option<TransactionStatus>,
    /// Swept transactions are hidden unless set.
    pub include_deleted: bool,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub sort: TransactionSort,
    pub direction: SortDirection,
    pub pagination: Pagination,
}

impl TransactionQuery {
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        self.pagination.validate(&mut errors);
        validate_window(self.created_after, self.created_before, &mut errors);
        finish(errors)
    }
}

// =============================================================================
// Payment Query
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentSort {
    #[default]
    CreatedAt,
    Total,
}

impl PaymentSort {
    pub const fn column(&self) -> &'static str {
        match self {
            PaymentSort::CreatedAt => "created_at",
            PaymentSort::Total => "total",
        }
    }
}

/// Filters for listing payments.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentQuery {
    pub drawer_id: Option<String>,
    pub customer_id: Option<String>,
    pub is_finalized: Option<bool>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub sort: PaymentSort,
    pub direction: SortDirection,
    pub pagination: Pagination,
}

impl PaymentQuery {
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        self.pagination.validate(&mut errors);
        validate_window(self.created_after, self.created_before, &mut errors);
        finish(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_defaults_are_valid() {
        assert!(TransactionQuery::default().validate().is_ok());
        assert!(PaymentQuery::default().validate().is_ok());
    }

    #[test]
    fn test_pagination_bounds() {
        let mut query = TransactionQuery::default();
        query.pagination = Pagination {
            page: 0,
            per_page: 101,
        };
        let errors = query.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field(), "page");
        assert_eq!(errors[1].field(), "per_page");
    }

    #[test]
    fn test_offset() {
        let p = Pagination {
            page: 3,
            per_page: 25,
        };
        assert_eq!(p.offset(), 50);
        assert_eq!(p.limit(), 25);
    }

    #[test]
    fn test_inverted_window_rejected() {
        let now = Utc::now();
        let query = PaymentQuery {
            created_after: Some(now),
            created_before: Some(now - Duration::hours(1)),
            ..Default::default()
        };
        assert_eq!(query.validate().unwrap_err()[0].field(), "created_after");
    }

    #[test]
    fn test_deserialize_partial_query() {
        let query: TransactionQuery =
            serde_json::from_str(r#"{"status":"pending","sort":"total","direction":"asc"}"#)
                .unwrap();
        assert_eq!(query.status, Some(TransactionStatus::Pending));
        assert_eq!(query.sort.column(), "total");
        assert_eq!(query.direction.as_sql(), "ASC");
        assert_eq!(query.pagination, Pagination::default());
    }
}
