//! REST endpoint for the live dashboard.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use super::store::SharedStateStore;
use super::view::DashboardView;

/// Shared state for dashboard routes.
#[derive(Clone)]
pub struct DashboardRouteState {
    pub store: Arc<SharedStateStore>,
}

/// GET /api/dashboard
///
/// Returns the derived view plus the raw document, or 404 with
/// `{"active": false}` when no session has written anything.
async fn get_dashboard(State(state): State<DashboardRouteState>) -> impl IntoResponse {
    let snapshot = match state.store.blocking(|s| Ok(s.read())).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::warn!(error = %e, "Dashboard read task failed");
            None
        }
    };

    match snapshot {
        Some(doc) => {
            let view = DashboardView::from_state(&doc);
            Json(serde_json::json!({
                "active": true,
                "view": view,
                "state": doc,
            }))
            .into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"active": false})),
        )
            .into_response(),
    }
}

/// Build the dashboard REST routes.
pub fn dashboard_routes(state: DashboardRouteState) -> Router {
    Router::new()
        .route("/api/dashboard", get(get_dashboard))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::dashboard::model::{OrdinalScore, SharedState, Symptom};

    fn app() -> (tempfile::TempDir, Arc<SharedStateStore>, Router) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SharedStateStore::new(dir.path().join("state.json")));
        let router = dashboard_routes(DashboardRouteState {
            store: store.clone(),
        });
        (dir, store, router)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn absent_document_is_404_inactive() {
        let (_dir, _store, router) = app();
        let response = router
            .oneshot(Request::get("/api/dashboard").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await, serde_json::json!({"active": false}));
    }

    #[tokio::test]
    async fn live_document_returns_view_and_raw_state() {
        let (_dir, store, router) = app();
        let mut doc = SharedState::default();
        doc.symptoms
            .insert(Symptom::FeelingDown, OrdinalScore::new(3).unwrap());
        store.write(doc).unwrap();
        store.update_emotion("sadness").unwrap();

        let response = router
            .oneshot(Request::get("/api/dashboard").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["active"], true);
        assert_eq!(json["view"]["phq9_total"], 3);
        assert_eq!(json["view"]["risk_tier"], "Mild");
        assert_eq!(json["state"]["symptoms"]["Feeling Down"], 3);
        assert_eq!(json["state"]["top_emotions"]["sadness"], 1);
    }
}
