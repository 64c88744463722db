use axum::{
    Router,
    http::StatusCode,
    middleware,
    routing::{delete, get, patch, post},
};

use crate::auth::{self, AppState};
use crate::gate::{guest_only, optional_auth, require_auth};
use crate::rate_limit::limit_by_ip;
use crate::{lists, pins, tags};

/// Every route under `/v1`, each behind its gate.
///
/// Gates are attached per method so that one path can mix anonymous reads
/// with owner-only writes.
pub fn router(state: AppState) -> Router {
    let require = middleware::from_fn_with_state(state.clone(), require_auth);
    let optional = middleware::from_fn_with_state(state.clone(), optional_auth);
    let throttle = middleware::from_fn_with_state(state.limiter.clone(), limit_by_ip);

    // Throttle runs first, then the guest check.
    let guests = Router::new()
        .route("/account/create", post(auth::create_account))
        .route("/account/login", post(auth::login))
        .route_layer(middleware::from_fn(guest_only))
        .route_layer(throttle);

    let api = Router::new()
        .route("/account/logout", post(auth::logout).route_layer(require.clone()))
        .route(
            "/lists",
            post(lists::create_list)
                .get(lists::my_lists)
                .route_layer(require.clone()),
        )
        .route(
            "/list/{id}",
            get(lists::get_list).route_layer(optional.clone()).merge(
                patch(lists::update_list)
                    .delete(lists::delete_list)
                    .route_layer(require.clone()),
            ),
        )
        .route("/list/{id}/pins", get(lists::list_pins).route_layer(optional))
        .route("/pin", post(pins::create_pin).route_layer(require.clone()))
        .route("/pin/{id}", delete(pins::delete_pin).route_layer(require.clone()))
        .route("/pins", get(pins::my_pins).route_layer(require.clone()))
        .route("/tags", get(tags::my_tags).route_layer(require))
        .route("/health", get(health))
        .merge(guests);

    Router::new().nest("/v1", api).with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        Router,
        body::Body,
        http::{Method, Request, StatusCode},
    };
    use pinlist_db::Database;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::router;
    use crate::auth::{AppState, AppStateInner};
    use crate::error::BLOCKED_MESSAGE;
    use crate::rate_limit::RateLimiter;

    struct Harness {
        state: AppState,
        app: Router,
    }

    impl Harness {
        fn new() -> Self {
            let state: AppState = Arc::new(AppStateInner {
                db: Database::open_in_memory().unwrap(),
                limiter: Arc::new(RateLimiter::default()),
            });
            Self {
                app: router(state.clone()),
                state,
            }
        }

        async fn call(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder()
                .method(method)
                .uri(uri)
                .header("x-real-ip", "203.0.113.9");
            if let Some(token) = token {
                builder = builder.header("authorization", format!("Bearer {token}"));
            }
            let body = match body {
                Some(v) => {
                    builder = builder.header("content-type", "application/json");
                    Body::from(v.to_string())
                }
                None => Body::empty(),
            };

            let response = self
                .app
                .clone()
                .oneshot(builder.body(body).unwrap())
                .await
                .unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
                .await
                .unwrap();
            let value = serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
            (status, value)
        }

        async fn signup(&self, name: &str) -> String {
            let (status, body) = self
                .call(
                    Method::POST,
                    "/v1/account/create",
                    None,
                    Some(json!({
                        "username": name,
                        "email": format!("{name}@example.com"),
                        "password": "correct horse",
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{body}");
            body["token"]["hash"].as_str().unwrap().to_string()
        }
    }

    #[tokio::test]
    async fn health_is_open() {
        let h = Harness::new();
        assert_eq!(h.call(Method::GET, "/v1/health", None, None).await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn account_lifecycle() {
        let h = Harness::new();
        let token = h.signup("foo").await;

        let (status, body) = h
            .call(
                Method::POST,
                "/v1/account/login",
                None,
                Some(json!({ "login": "foo@example.com", "password": "correct horse" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["username"], "foo");
        assert!(body["user"].get("password").is_none());

        let (status, _) = h
            .call(
                Method::POST,
                "/v1/account/login",
                None,
                Some(json!({ "login": "foo", "password": "wrong password" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // Already signed in.
        let (status, _) = h
            .call(
                Method::POST,
                "/v1/account/login",
                Some(&token),
                Some(json!({ "login": "foo", "password": "correct horse" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // A token in the query counts too, even when repeated.
        let (status, _) = h
            .call(
                Method::POST,
                &format!("/v1/account/login?token={token}&token={token}"),
                None,
                Some(json!({ "login": "foo", "password": "correct horse" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = h.call(Method::POST, "/v1/account/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = h.call(Method::GET, "/v1/pins", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn signup_rejects_bad_and_duplicate_input() {
        let h = Harness::new();
        h.signup("foo").await;

        let dup = json!({ "username": "foo", "email": "other@example.com", "password": "12345678" });
        let (status, _) = h.call(Method::POST, "/v1/account/create", None, Some(dup)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let short = json!({ "username": "bar", "email": "bar@example.com", "password": "1234" });
        let (status, body) = h.call(Method::POST, "/v1/account/create", None, Some(short)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("password"));

        let unknown = json!({ "username": "bar", "email": "bar@example.com", "password": "12345678", "admin": true });
        let (status, _) = h.call(Method::POST, "/v1/account/create", None, Some(unknown)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn guest_routes_are_throttled_per_address() {
        let h = Harness::new();
        let body = json!({ "login": "nobody", "password": "nothing" });

        for _ in 0..20 {
            let (status, _) = h
                .call(Method::POST, "/v1/account/login", None, Some(body.clone()))
                .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        let (status, msg) = h
            .call(Method::POST, "/v1/account/login", None, Some(body))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(msg, Value::String(BLOCKED_MESSAGE.to_string()));
        assert_eq!(h.state.limiter.hits("203.0.113.9"), Some(20));
    }

    #[tokio::test]
    async fn pin_flow_with_private_list() {
        let h = Harness::new();
        let foo = h.signup("foo").await;
        let bar = h.signup("bar").await;

        let (status, list) = h
            .call(
                Method::POST,
                "/v1/lists",
                Some(&foo),
                Some(json!({ "name": "reading" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let list_id = list["id"].as_i64().unwrap();

        let (status, pin) = h
            .call(
                Method::POST,
                "/v1/pin",
                Some(&foo),
                Some(json!({
                    "title": "Rust",
                    "url": "https://www.rust-lang.org",
                    "tags": ["Lang", " lang ", "systems"],
                    "list": list_id,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(pin["creator"], "foo");
        let tags: Vec<&str> = pin["tags"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(tags, ["lang", "systems"]);
        let pin_id = pin["id"].as_i64().unwrap();

        let uri = format!("/v1/list/{list_id}");
        let (status, body) = h.call(Method::GET, &uri, Some(&foo), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pins"], 1);
        assert_eq!(h.call(Method::GET, &uri, None, None).await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(h.call(Method::GET, &uri, Some(&bar), None).await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(
            h.call(Method::GET, "/v1/list/999", None, None).await.0,
            StatusCode::NOT_FOUND
        );

        // bar cannot pin into foo's private list
        let (status, _) = h
            .call(
                Method::POST,
                "/v1/pin",
                Some(&bar),
                Some(json!({ "title": "x", "url": "http://x.org", "list": list_id })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = h
            .call(
                Method::POST,
                "/v1/pin",
                Some(&foo),
                Some(json!({ "title": "x", "url": "http://x.org", "list": 999 })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (_, body) = h.call(Method::GET, &uri, Some(&foo), None).await;
        assert_eq!(body["pins"], 1);

        let pin_uri = format!("/v1/pin/{pin_id}");
        assert_eq!(
            h.call(Method::DELETE, &pin_uri, Some(&bar), None).await.0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            h.call(Method::DELETE, &pin_uri, Some(&foo), None).await.0,
            StatusCode::OK
        );
        assert_eq!(
            h.call(Method::DELETE, &pin_uri, Some(&foo), None).await.0,
            StatusCode::NOT_FOUND
        );

        let (_, body) = h.call(Method::GET, &uri, Some(&foo), None).await;
        assert_eq!(body["pins"], 0);
    }

    #[tokio::test]
    async fn public_list_is_readable_anonymously_but_owner_writes() {
        let h = Harness::new();
        let foo = h.signup("foo").await;
        let bar = h.signup("bar").await;

        let (_, list) = h
            .call(
                Method::POST,
                "/v1/lists",
                Some(&foo),
                Some(json!({ "name": "links", "public": true })),
            )
            .await;
        let uri = format!("/v1/list/{}", list["id"]);

        for i in 0..3 {
            h.call(
                Method::POST,
                "/v1/pin",
                Some(&foo),
                Some(json!({ "title": format!("p{i}"), "url": "http://a.io", "list": list["id"] })),
            )
            .await;
        }

        let (status, page) = h
            .call(Method::GET, &format!("{uri}/pins?limit=2"), None, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["count"], 2);
        assert_eq!(page["total"], 3);
        let last = page["items"][1]["id"].as_i64().unwrap();

        let (_, page) = h
            .call(Method::GET, &format!("{uri}/pins?limit=2&offset={last}"), None, None)
            .await;
        assert_eq!(page["count"], 1);
        assert_eq!(page["items"][0]["title"], "p0");

        let rename = json!({ "name": "renamed" });
        assert_eq!(
            h.call(Method::PATCH, &uri, Some(&bar), Some(rename.clone())).await.0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            h.call(Method::PATCH, &uri, None, Some(rename.clone())).await.0,
            StatusCode::UNAUTHORIZED
        );
        let (status, body) = h.call(Method::PATCH, &uri, Some(&foo), Some(rename)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "renamed");

        assert_eq!(h.call(Method::DELETE, &uri, Some(&bar), None).await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(h.call(Method::DELETE, &uri, Some(&foo), None).await.0, StatusCode::OK);
        assert_eq!(h.call(Method::GET, &uri, None, None).await.0, StatusCode::NOT_FOUND);

        // Pins survive, detached.
        let (_, page) = h.call(Method::GET, "/v1/pins", Some(&foo), None).await;
        assert_eq!(page["total"], 3);
        assert!(page["items"][0]["list_id"].is_null());
    }

    #[tokio::test]
    async fn tags_and_lists_are_scoped_to_caller() {
        let h = Harness::new();
        let foo = h.signup("foo").await;
        let bar = h.signup("bar").await;

        h.call(
            Method::POST,
            "/v1/pin",
            Some(&foo),
            Some(json!({ "title": "a", "url": "http://a.io", "tags": ["x", "y"] })),
        )
        .await;
        h.call(
            Method::POST,
            "/v1/pin",
            Some(&foo),
            Some(json!({ "title": "b", "url": "http://b.io", "tags": ["x"] })),
        )
        .await;
        h.call(
            Method::POST,
            "/v1/lists",
            Some(&foo),
            Some(json!({ "name": "mine" })),
        )
        .await;

        let (status, tags) = h.call(Method::GET, "/v1/tags", Some(&foo), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tags["items"], json!([{ "name": "x", "count": 2 }, { "name": "y", "count": 1 }]));

        let (_, tags) = h.call(Method::GET, "/v1/tags", Some(&bar), None).await;
        assert_eq!(tags["total"], 0);

        let (_, lists) = h.call(Method::GET, "/v1/lists", Some(&foo), None).await;
        assert_eq!(lists["count"], 1);

        let (status, pins) = h
            .call(Method::GET, "/v1/pins?limit=abc&offset=", Some(&foo), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pins["count"], 2);
        let (_, lists) = h.call(Method::GET, "/v1/lists", Some(&bar), None).await;
        assert_eq!(lists["count"], 0);

        assert_eq!(h.call(Method::GET, "/v1/tags", None, None).await.0, StatusCode::UNAUTHORIZED);
    }
}
