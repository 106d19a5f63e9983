//! Product test data.
//!
//! Tests look products up by name or id instead of hard-coding page content.
//! The shipped implementation reads a JSON file with a top-level `products`
//! list:
//!
//! ```json
//! { "products": [ { "id": "1", "name": "Premium Wireless Headphones", "price": 199.99,
//!                   "category": "electronics", "description": "..." } ] }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::result::{StorefrontError, StorefrontResult};

/// A product as the storefront should display it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Catalog id, as used in `/product/{id}`
    pub id: String,
    /// Display name
    pub name: String,
    /// Unit price
    pub price: f64,
    /// Category slug
    #[serde(default)]
    pub category: String,
    /// Long description
    #[serde(default)]
    pub description: String,
}

/// Source of product test data
pub trait ProductCatalog {
    /// Every product
    fn all_products(&self) -> &[Product];

    /// Product whose name matches, ignoring case
    fn product_by_name(&self, name: &str) -> Option<&Product> {
        let wanted = name.to_lowercase();
        self.all_products()
            .iter()
            .find(|product| product.name.to_lowercase() == wanted)
    }

    /// Product with exactly this id
    fn product_by_id(&self, id: &str) -> Option<&Product> {
        self.all_products().iter().find(|product| product.id == id)
    }
}

#[derive(Deserialize)]
struct CatalogFile {
    products: Option<Vec<Product>>,
}

/// Catalog loaded from a JSON file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonCatalog {
    products: Vec<Product>,
}

impl JsonCatalog {
    /// Load from `path`
    pub fn load(path: impl AsRef<Path>) -> StorefrontResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| StorefrontError::Catalog {
            message: format!("Product data file not readable: {}: {err}", path.display()),
        })?;
        let catalog = Self::from_json(&raw).map_err(|err| match err {
            StorefrontError::Catalog { message } => StorefrontError::Catalog {
                message: format!("{}: {message}", path.display()),
            },
            other => other,
        })?;
        tracing::debug!(path = %path.display(), count = catalog.products.len(), "product data loaded");
        Ok(catalog)
    }

    /// Parse a `{"products": [...]}` document
    pub fn from_json(raw: &str) -> StorefrontResult<Self> {
        let file: CatalogFile = serde_json::from_str(raw).map_err(|err| StorefrontError::Catalog {
            message: format!("Could not decode product data: {err}"),
        })?;
        let products = file.products.ok_or_else(|| StorefrontError::Catalog {
            message: "Product data JSON must contain a 'products' list".to_string(),
        })?;
        Ok(Self { products })
    }

    /// Catalog over the given products
    #[must_use]
    pub fn from_products(products: Vec<Product>) -> Self {
        Self { products }
    }
}

impl ProductCatalog for JsonCatalog {
    fn all_products(&self) -> &[Product] {
        &self.products
    }
}
