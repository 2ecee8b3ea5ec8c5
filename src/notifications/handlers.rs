use std::collections::BTreeMap;

use axum::{extract::State, routing::get, Router};
use tracing::{error, instrument};

use super::{PushMessage, BROADCAST_TOPIC};
use crate::{
    error::{AppError, AppResult},
    response::ApiResponse,
    state::AppState,
};

pub fn notification_routes() -> Router<AppState> {
    Router::new().route("/notification", get(broadcast))
}

pub fn broadcast_message() -> PushMessage {
    let mut data = BTreeMap::new();
    data.insert("extraInfo".to_string(), "Optional data payload".to_string());
    PushMessage {
        title: "Global Test Notification".into(),
        body: "This is for all connected devices".into(),
        data,
    }
}

/// GET /notification
#[instrument(skip(state))]
pub async fn broadcast(State(state): State<AppState>) -> AppResult<ApiResponse<()>> {
    state
        .notifier
        .send_to_topic(BROADCAST_TOPIC, &broadcast_message())
        .await
        .map_err(|e| {
            error!(error = %e, "topic notification failed");
            AppError::upstream(format!("Failed to send notification: {e}"))
        })?;
    Ok(ApiResponse::message("Notification sent to all devices"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::harness;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    #[tokio::test]
    async fn broadcast_hits_all_devices_topic() {
        let h = harness();
        let app = crate::app::build_app(h.state.clone());

        let res = app
            .oneshot(Request::get("/notification").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, BROADCAST_TOPIC);
        assert_eq!(sent[0].1.title, "Global Test Notification");
    }

    #[tokio::test]
    async fn provider_failure_is_500() {
        let h = harness();
        h.notifier.set_failing(true);
        let app = crate::app::build_app(h.state.clone());

        let res = app
            .oneshot(Request::get("/notification").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), 500);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("Failed to send notification"));
    }
}
