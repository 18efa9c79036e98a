use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;

// ============================================================================
// Product Catalog Port
// ============================================================================

/// Live price lookup used to validate order items at creation time.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Unit price for a product code, or None when the code is unknown.
    async fn price_of(&self, code: &str) -> anyhow::Result<Option<Decimal>>;
}

/// Fixed in-memory catalog. The production deployment would back this with
/// the catalog service; tests and the demo wiring seed it directly.
#[derive(Default)]
pub struct StaticCatalog {
    prices: HashMap<String, Decimal>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product(mut self, code: &str, price: Decimal) -> Self {
        self.prices.insert(code.to_string(), price);
        self
    }
}

#[async_trait]
impl Catalog for StaticCatalog {
    async fn price_of(&self, code: &str) -> anyhow::Result<Option<Decimal>> {
        Ok(self.prices.get(code).copied())
    }
}
