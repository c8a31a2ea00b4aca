//! Product catalog.
//!
//! Products are read from a JSON file, either a bare array or
//! `{ "products": [...] }`, and cached in memory with `moka` (5-minute TTL).
//! Field names from older exports are accepted as aliases (`slug` for `id`,
//! `name` for `title`, `base_price` for `price`).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use gi_foundation_core::{ProductId, round_cents};
use moka::future::Cache;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::cart::ProductRef;

/// Image shown when a product has none.
pub const PLACEHOLDER_IMAGE: &str = crate::cart::DEFAULT_IMAGE;

/// Errors loading the catalog.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {}: {message}", path.display())]
    Read { path: PathBuf, message: String },

    #[error("Invalid catalog JSON: {0}")]
    Parse(String),
}

/// A selectable option value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionValue {
    #[serde(alias = "value", alias = "id")]
    pub label: String,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub price_delta: Decimal,
}

/// A product option such as size or color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductOption {
    #[serde(default = "default_option_name")]
    pub name: String,
    #[serde(default)]
    pub values: Vec<OptionValue>,
}

fn default_option_name() -> String {
    "Option".to_string()
}

#[derive(Debug, Deserialize)]
struct RawProduct {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default, alias = "name")]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default, rename = "imageAlt")]
    image_alt: Option<String>,
    #[serde(default, alias = "base_price", deserialize_with = "lenient_decimal")]
    price: Decimal,
    #[serde(default)]
    options: Vec<ProductOption>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    subcategory: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    featured: bool,
}

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: ProductId,
    /// URL key; falls back to `id`.
    pub slug: String,
    pub title: String,
    pub description: String,
    pub image: String,
    pub image_alt: String,
    /// Suggested donation before option deltas.
    pub base_price: Decimal,
    pub options: Vec<ProductOption>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub tags: Vec<String>,
    pub featured: bool,
}

impl Product {
    fn from_raw(raw: RawProduct) -> Option<Self> {
        let non_blank = |s: Option<String>| s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        let slug = non_blank(raw.slug);
        let id = non_blank(raw.id).or_else(|| slug.clone())?;
        let slug = slug.unwrap_or_else(|| id.clone());
        let title = non_blank(raw.title).unwrap_or_else(|| slug.clone());

        Some(Self {
            id: ProductId::new(id),
            image_alt: non_blank(raw.image_alt).unwrap_or_else(|| title.clone()),
            image: non_blank(raw.image).unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string()),
            description: raw.description.unwrap_or_default(),
            base_price: raw.price.max(Decimal::ZERO),
            options: raw
                .options
                .into_iter()
                .filter(|option| !option.values.is_empty())
                .collect(),
            category: non_blank(raw.category).or_else(|| raw.categories.into_iter().next()),
            subcategory: non_blank(raw.subcategory),
            tags: raw.tags,
            featured: raw.featured,
            slug,
            title,
        })
    }

    /// True if `key` is this product's slug or id.
    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        self.slug == key || self.id.as_str() == key
    }

    /// Base price plus the delta of each selected option value.
    ///
    /// `selections[i]` is the chosen label for option `i`; missing or
    /// unknown labels add nothing.
    #[must_use]
    pub fn suggested_amount(&self, selections: &[String]) -> Decimal {
        let deltas: Decimal = self
            .options
            .iter()
            .zip(selections)
            .filter_map(|(option, label)| option.values.iter().find(|v| &v.label == label))
            .map(|value| value.price_delta)
            .fold(Decimal::ZERO, Decimal::saturating_add);
        round_cents(self.base_price.saturating_add(deltas).max(Decimal::ZERO))
    }

    /// Snapshot for adding to the cart.
    #[must_use]
    pub fn cart_ref(&self) -> ProductRef {
        ProductRef::new(self.id.clone())
            .with_title(self.title.clone())
            .with_description(self.description.clone())
            .with_image(self.image.clone())
    }

    fn relatedness(&self, other: &Self) -> usize {
        let mut score = 0;
        if self.category.is_some() && self.category == other.category {
            score += 3;
        }
        if self.subcategory.is_some() && self.subcategory == other.subcategory {
            score += 2;
        }
        score
            + other
                .tags
                .iter()
                .filter(|tag| self.tags.contains(tag))
                .count()
    }
}

fn lenient_decimal<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
        Null,
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Decimal::try_from(n).unwrap_or_default(),
        Raw::Text(s) => s.trim().trim_start_matches('$').parse().unwrap_or_default(),
        Raw::Null => Decimal::ZERO,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    List(Vec<RawProduct>),
    Wrapped { products: Vec<RawProduct> },
}

/// Parse catalog JSON. Entries without an id or slug are skipped.
///
/// # Errors
///
/// Returns `CatalogError::Parse` if the JSON is not a product list.
pub fn parse_catalog(bytes: &[u8]) -> Result<Vec<Product>, CatalogError> {
    let file: CatalogFile =
        serde_json::from_slice(bytes).map_err(|e| CatalogError::Parse(e.to_string()))?;
    let raw = match file {
        CatalogFile::List(list) | CatalogFile::Wrapped { products: list } => list,
    };
    Ok(raw.into_iter().filter_map(Product::from_raw).collect())
}

/// Products related to `product`, best match first.
///
/// Scores shared category (+3), subcategory (+2) and each shared tag (+1).
/// Remaining slots are filled with unrelated products in catalog order.
#[must_use]
pub fn related<'a>(products: &'a [Product], product: &Product, limit: usize) -> Vec<&'a Product> {
    let mut scored: Vec<(usize, &Product)> = products
        .iter()
        .filter(|p| p.id != product.id)
        .map(|p| (product.relatedness(p), p))
        .collect();
    // Stable sort keeps catalog order within a score.
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().take(limit).map(|(_, p)| p).collect()
}

/// Cached, file-backed catalog.
#[derive(Clone)]
pub struct Catalog {
    path: PathBuf,
    cache: Cache<(), Arc<Vec<Product>>>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog").field("path", &self.path).finish_non_exhaustive()
    }
}

impl Catalog {
    /// Create a catalog reading from `path`. Nothing is read until first use.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let cache = Cache::builder()
            .max_capacity(1)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();
        Self {
            path: path.into(),
            cache,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All products.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed. Failures are not
    /// cached.
    pub async fn products(&self) -> Result<Arc<Vec<Product>>, CatalogError> {
        self.cache
            .try_get_with((), async {
                let bytes = tokio::fs::read(&self.path)
                    .await
                    .map_err(|e| CatalogError::Read {
                        path: self.path.clone(),
                        message: e.to_string(),
                    })?;
                let products = parse_catalog(&bytes)?;
                tracing::debug!(count = products.len(), path = %self.path.display(), "Catalog loaded");
                Ok::<_, CatalogError>(Arc::new(products))
            })
            .await
            .map_err(|e: Arc<CatalogError>| (*e).clone())
    }

    /// Product by slug or id.
    ///
    /// # Errors
    ///
    /// Returns error if the catalog cannot be loaded.
    pub async fn find(&self, key: &str) -> Result<Option<Product>, CatalogError> {
        Ok(self.products().await?.iter().find(|p| p.matches(key)).cloned())
    }

    /// Featured products, falling back to the first products in the catalog.
    ///
    /// # Errors
    ///
    /// Returns error if the catalog cannot be loaded.
    pub async fn featured(&self, limit: usize) -> Result<Vec<Product>, CatalogError> {
        let products = self.products().await?;
        let featured: Vec<Product> = products.iter().filter(|p| p.featured).take(limit).cloned().collect();
        if featured.is_empty() {
            return Ok(products.iter().take(limit).cloned().collect());
        }
        Ok(featured)
    }

    /// Drop the cached product list.
    pub async fn invalidate(&self) {
        self.cache.invalidate(&()).await;
    }
}
