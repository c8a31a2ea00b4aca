//! Home page route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::extract::State;
use tower_sessions::Session;
use tracing::instrument;

use super::page_panel;
use super::products::ProductCard;
use crate::error::Result;
use crate::filters;
use crate::middleware::CspNonce;
use crate::render::RenderedCart;
use crate::state::AppState;

/// Products shown on the home page.
const FEATURED_LIMIT: usize = 6;

/// Home page template.
#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub nonce: String,
    pub panel: RenderedCart,
    pub featured: Vec<ProductCard>,
    pub minimum_label: String,
}

/// Display home page.
#[instrument(skip(state, session, nonce))]
pub async fn home(
    State(state): State<AppState>,
    session: Session,
    CspNonce(nonce): CspNonce,
) -> Result<HomeTemplate> {
    let featured = state.catalog().featured(FEATURED_LIMIT).await?;

    Ok(HomeTemplate {
        nonce,
        panel: page_panel(&state, &session).await,
        featured: featured.iter().map(ProductCard::from).collect(),
        minimum_label: state.donation_policy().minimum_label(),
    })
}
