use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use serde_json::Value;

use crate::error::AppResult;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", post(proxy_post))
}

/// Relay the request body to the configured webhook and answer with its JSON.
async fn proxy_post(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> AppResult<Json<Value>> {
    let reply = state.proxy.forward(&body).await?;
    Ok(Json(reply))
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::services::init::build_state;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use wiremock::matchers::{body_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn post_json(body: &Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/api/proxy-post")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn relays_webhook_answer() {
        let server = MockServer::start().await;
        let request = json!({ "action": "book", "room": "Phong 101" });
        Mock::given(method("POST"))
            .and(body_json(request.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "success" })))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = Config::default();
        config.proxy.webhook_url = Some(server.uri());
        let app = crate::routes::app(build_state(config).unwrap());

        let res = app.oneshot(post_json(&request)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(read_json(res).await, json!({ "result": "success" }));
    }

    #[tokio::test]
    async fn unconfigured_webhook_is_proxy_failure() {
        let app = crate::routes::app(build_state(Config::default()).unwrap());

        let res = app.oneshot(post_json(&json!({}))).await.unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = read_json(res).await;
        assert_eq!(body["error"], "Proxy failed");
        assert_eq!(body["detail"], "PROXY_WEBHOOK_URL is not configured");
    }
}
