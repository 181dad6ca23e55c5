#[cfg(test)]
mod webhook_api_tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use crmserver::main_module::build_app;
    use crmserver::core::config::AppConfig;
    use crmserver::tests::test_util::{bearer_for, test_state, test_state_with, TEST_JWT_SECRET};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    const BOUNDARY: &str = "crmserver-test-boundary";

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn json_request(method: &str, uri: &str, auth: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, auth)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn webhook_request(webhook_id: &str, secret: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(format!("/api/engage/data/webhook/{webhook_id}"))
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::USER_AGENT, "integration-test")
            .header("x-forwarded-for", "198.51.100.4, 10.0.0.2");
        if let Some(secret) = secret {
            builder = builder.header("x-webhook-secret", secret);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn multipart_request(auth: &str, filename: &str, contents: &str, fields: &[(&str, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: text/csv\r\n\r\n{contents}\r\n--{BOUNDARY}--\r\n"
        ));
        Request::builder()
            .method("POST")
            .uri("/api/engage/data/import")
            .header(header::AUTHORIZATION, auth)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    struct Hook {
        app: Router,
        auth: String,
        dataset_id: String,
        webhook_id: String,
        secret: String,
    }

    async fn webhook_dataset() -> Hook {
        let state = test_state();
        let app = build_app(state.clone());
        let auth = bearer_for(&state, Uuid::new_v4());
        let (status, body) = call(
            &app,
            json_request(
                "POST",
                "/api/engage/data",
                &auth,
                json!({"name": "Signups", "type": "webhook"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let data = &body["data"];
        Hook {
            dataset_id: data["id"].as_str().unwrap().to_string(),
            webhook_id: data["webhookId"].as_str().unwrap().to_string(),
            secret: data["webhookSecret"].as_str().unwrap().to_string(),
            app,
            auth,
        }
    }

    #[tokio::test]
    async fn test_missing_secret_is_unauthorized() {
        let hook = webhook_dataset().await;
        let (status, body) = call(
            &hook.app,
            webhook_request(&hook.webhook_id, None, json!({"a": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Webhook secret is required");
    }

    #[tokio::test]
    async fn test_wrong_secret_is_unauthorized() {
        let hook = webhook_dataset().await;
        let (status, body) = call(
            &hook.app,
            webhook_request(&hook.webhook_id, Some("not-the-secret"), json!({"a": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid webhook secret");
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_unknown_webhook_is_not_found() {
        let hook = webhook_dataset().await;
        let (status, body) = call(
            &hook.app,
            webhook_request("0123456789abcdef", Some(&hook.secret), json!({"a": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Invalid webhook ID");
    }

    #[tokio::test]
    async fn test_delivery_is_stored_with_metadata() {
        let hook = webhook_dataset().await;
        let (status, body) = call(
            &hook.app,
            webhook_request(
                &hook.webhook_id,
                Some(&hook.secret),
                json!({"email": "ada@example.com"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "Data received successfully");
        let record_id = body["data"]["recordId"].as_str().unwrap().to_string();

        let request = Request::builder()
            .uri(format!(
                "/api/engage/data/{}/records?page=1&limit=10&sortOrder=asc",
                hook.dataset_id
            ))
            .header(header::AUTHORIZATION, &hook.auth)
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(&hook.app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pagination"]["total"], 1);
        assert_eq!(body["pagination"]["totalPages"], 1);
        let record = &body["data"][0];
        assert_eq!(record["id"], record_id.as_str());
        assert_eq!(record["data"]["email"], "ada@example.com");
        assert_eq!(record["metadata"]["ip"], "198.51.100.4");
        assert_eq!(record["metadata"]["userAgent"], "integration-test");
        assert_eq!(record["metadata"]["referrer"], "Direct");
    }

    #[tokio::test]
    async fn test_record_paging_is_validated() {
        let hook = webhook_dataset().await;
        let request = Request::builder()
            .uri(format!("/api/engage/data/{}/records?limit=500", hook.dataset_id))
            .header(header::AUTHORIZATION, &hook.auth)
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(&hook.app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION");
        assert_eq!(body["details"][0]["field"], "limit");
    }

    #[tokio::test]
    async fn test_record_page_past_offset_range_is_rejected() {
        let hook = webhook_dataset().await;
        let request = Request::builder()
            .uri(format!(
                "/api/engage/data/{}/records?page={}&limit=100",
                hook.dataset_id,
                i64::MAX
            ))
            .header(header::AUTHORIZATION, &hook.auth)
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(&hook.app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION");
        assert_eq!(body["details"][0]["field"], "page");
    }

    #[tokio::test]
    async fn test_import_enforces_file_size_limit() {
        let mut config = AppConfig::in_memory(TEST_JWT_SECRET);
        config.import.max_upload_bytes = 1024;
        let state = test_state_with(config);
        let app = build_app(state.clone());
        let auth = bearer_for(&state, Uuid::new_v4());

        let header = "name,email\n";
        let row = "Ada,ada@example.com\n";
        let mut at_limit = String::from(header);
        while at_limit.len() + row.len() <= 1024 {
            at_limit.push_str(row);
        }
        at_limit.push_str(&"x".repeat(1024 - at_limit.len()));
        assert_eq!(at_limit.len(), 1024);

        let (status, _) = call(&app, multipart_request(&auth, "ok.csv", &at_limit, &[])).await;
        assert_eq!(status, StatusCode::CREATED);

        let over_limit = format!("{at_limit}y");
        let (status, body) =
            call(&app, multipart_request(&auth, "big.csv", &over_limit, &[])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "File exceeds the 1KB limit");
    }

    #[tokio::test]
    async fn test_csv_import() {
        let hook = webhook_dataset().await;
        let (status, body) = call(
            &hook.app,
            multipart_request(
                &hook.auth,
                "leads.csv",
                "name,email\nAda,ada@example.com\nAlan,alan@example.com",
                &[("name", "Spring leads")],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["imported"], 2);
        assert_eq!(body["data"]["errors"], 0);
        assert_eq!(body["data"]["dataset"]["name"], "Spring leads");
        assert_eq!(body["data"]["dataset"]["type"], "upload");
        assert_eq!(body["data"]["dataset"]["recordCount"], 2);
    }

    #[tokio::test]
    async fn test_import_rejections() {
        let hook = webhook_dataset().await;

        let (status, body) = call(
            &hook.app,
            multipart_request(&hook.auth, "empty.csv", "name,email", &[]),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "File contains no data");

        let (status, _) = call(
            &hook.app,
            multipart_request(&hook.auth, "notes.txt", "hello", &[]),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let request = Request::builder()
            .method("POST")
            .uri("/api/engage/data/import")
            .header(header::AUTHORIZATION, &hook.auth)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\nx\r\n--{BOUNDARY}--\r\n"
            )))
            .unwrap();
        let (status, body) = call(&hook.app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No file uploaded");
    }
}
