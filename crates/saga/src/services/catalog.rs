//! Catalog service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::Money;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::SagaError;
use crate::services::fault::FaultPlan;
use crate::services::journal::CallJournal;

const SERVICE: &str = "catalog";

/// A product as described by the catalog.
///
/// Fields beyond `name` and `price` are kept verbatim so the saga can hand
/// the full catalog entry back to its caller. The saga never reads the price,
/// so an entry without a usable one still validates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_price"
    )]
    pub price: Option<Money>,
    #[serde(flatten)]
    pub details: serde_json::Map<String, Value>,
}

impl Product {
    pub fn new(name: impl Into<String>, price: Money) -> Self {
        Self {
            name: name.into(),
            price: Some(price),
            details: serde_json::Map::new(),
        }
    }
}

/// Accepts a JSON number or a numeric string; anything else reads as no price.
fn lenient_price<'de, D>(deserializer: D) -> Result<Option<Money>, D::Error>
where
    D: Deserializer<'de>,
{
    let decimal = match Value::deserialize(deserializer)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    };
    Ok(decimal.and_then(|value| Money::from_decimal(value).ok()))
}

/// Read-only product lookup.
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Finds a product by name.
    ///
    /// Returns [`SagaError::ProductNotFound`] when the catalog has no such
    /// product.
    async fn find_product(&self, name: &str) -> Result<Product, SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryCatalogState {
    products: HashMap<String, Product>,
    faults: FaultPlan,
    lookups: u32,
}

/// In-memory catalog for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalogService {
    state: Arc<RwLock<InMemoryCatalogState>>,
    journal: Option<CallJournal>,
}

impl InMemoryCatalogService {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every call into the shared journal.
    pub fn with_journal(mut self, journal: CallJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Adds a product, builder style.
    pub fn with_product(self, name: &str, price: Money) -> Self {
        self.add_product(Product::new(name, price));
        self
    }

    /// Adds or replaces a product.
    pub fn add_product(&self, product: Product) {
        self.write()
            .products
            .insert(product.name.clone(), product);
    }

    /// Makes every lookup fail as if the catalog were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.write().faults.set_fail_always(unavailable);
    }

    /// Returns the number of lookups served (including failed ones).
    pub fn lookup_count(&self) -> u32 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .lookups
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryCatalogState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CatalogService for InMemoryCatalogService {
    async fn find_product(&self, name: &str) -> Result<Product, SagaError> {
        if let Some(journal) = &self.journal {
            journal.record(SERVICE, "find_product", name);
        }
        let mut state = self.write();
        state.lookups += 1;

        if state.faults.should_fail() {
            return Err(SagaError::ServiceRejected {
                service: SERVICE,
                status: 503,
            });
        }

        state
            .products
            .get(name)
            .cloned()
            .ok_or_else(|| SagaError::ProductNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_existing_product() {
        let catalog = InMemoryCatalogService::new().with_product("Widget", Money::from_cents(1999));

        let product = catalog.find_product("Widget").await.unwrap();
        assert_eq!(product.name, "Widget");
        assert_eq!(product.price, Some(Money::from_cents(1999)));
        assert_eq!(catalog.lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_product_is_not_found() {
        let catalog = InMemoryCatalogService::new();

        let err = catalog.find_product("Gadget").await.unwrap_err();
        assert!(matches!(err, SagaError::ProductNotFound(name) if name == "Gadget"));
    }

    #[tokio::test]
    async fn test_unavailable_catalog() {
        let catalog = InMemoryCatalogService::new().with_product("Widget", Money::from_cents(100));
        catalog.set_unavailable(true);

        let err = catalog.find_product("Widget").await.unwrap_err();
        assert!(matches!(err, SagaError::ServiceRejected { status: 503, .. }));
    }

    #[test]
    fn test_product_keeps_extra_fields() {
        let json = serde_json::json!({"name": "Widget", "price": 19.99, "category": "tools"});
        let product: Product = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(product.price, Some(Money::from_cents(1999)));
        assert_eq!(product.details["category"], "tools");
        assert_eq!(serde_json::to_value(&product).unwrap(), json);
    }

    #[test]
    fn test_product_without_price() {
        let json = serde_json::json!({"name": "Widget", "category": "tools"});
        let product: Product = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(product.price, None);
        assert_eq!(serde_json::to_value(&product).unwrap(), json);
    }

    #[test]
    fn test_product_price_as_string() {
        let json = serde_json::json!({"name": "Widget", "price": " 19.99 "});
        let product: Product = serde_json::from_value(json).unwrap();
        assert_eq!(product.price, Some(Money::from_cents(1999)));
    }

    #[test]
    fn test_unusable_price_is_ignored() {
        let prices = [
            serde_json::json!("on request"),
            serde_json::json!(null),
            serde_json::json!({"eur": 5}),
        ];
        for price in prices {
            let json = serde_json::json!({"name": "Widget", "price": price});
            let product: Product = serde_json::from_value(json).unwrap();
            assert_eq!(product.name, "Widget");
            assert_eq!(product.price, None);
        }
    }
}
