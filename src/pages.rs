use axum::{extract::State, Json};
use futures::future::join_all;
use tracing::{error, info};

use crate::graph::PageInfo;
use crate::server::AppState;

/// Fetch metadata for every configured page concurrently. Pages whose fetch
/// fails are left out of the result.
pub async fn directory(state: &AppState) -> Vec<PageInfo> {
    if state.credentials().is_empty() {
        return Vec::new();
    }

    let graph = state.graph();
    let fetches = state.credentials().entries().map(|(page_id, token)| async move {
        match graph.page_info(page_id, token).await {
            Ok(info) => Some(info),
            Err(e) => {
                error!("Failed to fetch info for page {}: {:#}", page_id, e);
                None
            }
        }
    });

    let pages: Vec<PageInfo> = join_all(fetches).await.into_iter().flatten().collect();
    info!(
        "Page directory: {} of {} page(s) resolved",
        pages.len(),
        state.credentials().len()
    );
    pages
}

pub async fn pages_info(State(state): State<AppState>) -> Json<Vec<PageInfo>> {
    Json(directory(&state).await)
}
