//! Product route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::extract::{Path, State};
use gi_foundation_core::format_usd;
use rust_decimal::Decimal;
use tower_sessions::Session;
use tracing::instrument;

use super::page_panel;
use crate::catalog::{self, Product};
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::CspNonce;
use crate::render::RenderedCart;
use crate::state::AppState;

/// How many related products the detail page shows.
const RELATED_LIMIT: usize = 4;

/// Product card display data for templates.
#[derive(Clone)]
pub struct ProductCard {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub image: String,
    pub image_alt: String,
    /// Suggested donation, empty when the product has none.
    pub price: String,
}

impl From<&Product> for ProductCard {
    fn from(product: &Product) -> Self {
        Self {
            slug: product.slug.clone(),
            title: product.title.clone(),
            description: product.description.clone(),
            image: product.image.clone(),
            image_alt: product.image_alt.clone(),
            price: if product.base_price > Decimal::ZERO {
                format_usd(product.base_price)
            } else {
                String::new()
            },
        }
    }
}

/// One selectable option value.
#[derive(Clone)]
pub struct OptionValueView {
    pub label: String,
    /// `" (+$5.00)"`, or empty without a price difference.
    pub delta: String,
}

/// Option select for the add form; posted as `option_<index>`.
#[derive(Clone)]
pub struct OptionView {
    pub index: usize,
    pub name: String,
    pub values: Vec<OptionValueView>,
}

/// Product detail display data for templates.
#[derive(Clone)]
pub struct ProductDetail {
    pub id: String,
    pub card: ProductCard,
    pub options: Vec<OptionView>,
    /// Donation input default: the suggested amount for the first value of
    /// every option.
    pub suggested: String,
}

impl From<&Product> for ProductDetail {
    fn from(product: &Product) -> Self {
        let defaults: Vec<String> = product
            .options
            .iter()
            .map(|option| option.values.first().map(|v| v.label.clone()).unwrap_or_default())
            .collect();
        let suggested = product.suggested_amount(&defaults);

        Self {
            id: product.id.to_string(),
            card: ProductCard::from(product),
            options: product
                .options
                .iter()
                .enumerate()
                .map(|(index, option)| OptionView {
                    index,
                    name: option.name.clone(),
                    values: option
                        .values
                        .iter()
                        .map(|value| OptionValueView {
                            label: value.label.clone(),
                            delta: if value.price_delta > Decimal::ZERO {
                                format!(" (+{})", format_usd(value.price_delta))
                            } else {
                                String::new()
                            },
                        })
                        .collect(),
                })
                .collect(),
            suggested: if suggested > Decimal::ZERO {
                format!("{suggested:.2}")
            } else {
                String::new()
            },
        }
    }
}

/// Product listing page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/index.html")]
pub struct ProductsIndexTemplate {
    pub nonce: String,
    pub panel: RenderedCart,
    pub products: Vec<ProductCard>,
}

/// Product detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/show.html")]
pub struct ProductShowTemplate {
    pub nonce: String,
    pub panel: RenderedCart,
    pub product: ProductDetail,
    pub related_products: Vec<ProductCard>,
    pub minimum_label: String,
}

/// Display product listing page.
#[instrument(skip(state, session, nonce))]
pub async fn index(
    State(state): State<AppState>,
    session: Session,
    CspNonce(nonce): CspNonce,
) -> Result<ProductsIndexTemplate> {
    let products = state.catalog().products().await?;

    Ok(ProductsIndexTemplate {
        nonce,
        panel: page_panel(&state, &session).await,
        products: products.iter().map(ProductCard::from).collect(),
    })
}

/// Display product detail page.
#[instrument(skip(state, session, nonce))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    CspNonce(nonce): CspNonce,
    Path(slug): Path<String>,
) -> Result<ProductShowTemplate> {
    let products = state.catalog().products().await?;
    let product = products
        .iter()
        .find(|p| p.matches(&slug))
        .ok_or_else(|| AppError::NotFound(format!("product {slug}")))?;

    let related_products = catalog::related(&products, product, RELATED_LIMIT)
        .into_iter()
        .map(ProductCard::from)
        .collect();

    Ok(ProductShowTemplate {
        nonce,
        panel: page_panel(&state, &session).await,
        product: ProductDetail::from(product),
        related_products,
        minimum_label: state.donation_policy().minimum_label(),
    })
}
