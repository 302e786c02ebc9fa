use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request, Response},
    middleware::Next,
};

// Adds baseline hardening headers to every response unless a handler already set them.
pub async fn security_headers_middleware(req: Request<Body>, next: Next) -> Response<Body> {
    let mut res = next.run(req).await;

    const DEFAULTS: [(&str, &str); 2] = [
        ("x-content-type-options", "nosniff"),
        ("referrer-policy", "no-referrer"),
    ];

    for (name, value) in DEFAULTS {
        if res.headers().get(name).is_none() {
            res.headers_mut().insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }
    }

    res
}
