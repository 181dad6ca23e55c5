#[cfg(test)]
mod pipeline_api_tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use crmserver::main_module::build_app;
    use crmserver::tests::test_util::{bearer_for, test_state};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    struct Client {
        app: Router,
        auth: String,
    }

    impl Client {
        async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            send(&self.app, method, uri, Some(&self.auth), body).await
        }
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        auth: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn client_pair() -> (Client, Client) {
        let state = test_state();
        let app = build_app(state.clone());
        let owner = Client {
            app: app.clone(),
            auth: bearer_for(&state, Uuid::new_v4()),
        };
        let intruder = Client {
            app,
            auth: bearer_for(&state, Uuid::new_v4()),
        };
        (owner, intruder)
    }

    async fn create_pipeline(client: &Client) -> Value {
        let (status, body) = client
            .send(
                "POST",
                "/api/crm/pipelines",
                Some(json!({
                    "name": "Sales",
                    "stages": [{"name": "Lead"}, {"name": "Contacted"}, {"name": "Won", "color": "#00ff00"}]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"].clone()
    }

    async fn create_contact(client: &Client, first_name: &str) -> String {
        let (status, body) = client
            .send(
                "POST",
                "/api/crm/contacts",
                Some(json!({"firstName": first_name})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    fn stage_id(pipeline: &Value, index: usize) -> String {
        pipeline["stages"][index]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let state = test_state();
        let app = build_app(state);
        let (status, body) = send(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["storage"], "memory");
    }

    #[tokio::test]
    async fn test_requests_without_token_are_rejected() {
        let (owner, _) = client_pair();
        let (status, body) = send(&owner.app, "GET", "/api/crm/pipelines", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "UNAUTHORIZED");

        let (status, _) = send(
            &owner.app,
            "GET",
            "/api/crm/pipelines",
            Some("Bearer not-a-jwt"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_stage_order_round_trip() {
        let (owner, _) = client_pair();
        let pipeline = create_pipeline(&owner).await;
        let id = pipeline["id"].as_str().unwrap();

        let (status, body) = owner
            .send("GET", &format!("/api/crm/pipelines/{id}"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        let stages = body["data"]["stages"].as_array().unwrap();
        let names: Vec<&str> = stages.iter().map(|s| s["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Lead", "Contacted", "Won"]);
        let orders: Vec<i64> = stages.iter().map(|s| s["order"].as_i64().unwrap()).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        assert_eq!(stages[2]["color"], "#00ff00");
    }

    #[tokio::test]
    async fn test_lead_to_won_scenario() {
        let (owner, _) = client_pair();
        let pipeline = create_pipeline(&owner).await;
        let pipeline_id = pipeline["id"].as_str().unwrap().to_string();
        let contact_id = create_contact(&owner, "Ada").await;

        let (status, body) = owner
            .send(
                "POST",
                "/api/crm/deals",
                Some(json!({
                    "pipelineId": pipeline_id,
                    "stageId": stage_id(&pipeline, 0),
                    "contactId": contact_id,
                    "name": "Analytical engine",
                    "amount": 5000.0,
                    "probability": 10
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let deal_id = body["data"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["data"]["status"], "Open");
        assert_eq!(body["data"]["position"], 0);

        let (status, body) = owner
            .send(
                "PUT",
                &format!("/api/crm/pipelines/{pipeline_id}/move"),
                Some(json!({
                    "itemType": "deal",
                    "itemId": deal_id,
                    "sourceStageId": stage_id(&pipeline, 0),
                    "destinationStageId": stage_id(&pipeline, 2),
                    "destinationIndex": 0
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["stageId"], stage_id(&pipeline, 2));
        assert_eq!(body["data"]["position"], 0);

        let (status, body) = owner
            .send("GET", &format!("/api/crm/pipelines/{pipeline_id}/board"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let columns = body["data"]["columns"].as_array().unwrap();
        assert!(columns[0]["deals"].as_array().unwrap().is_empty());
        assert_eq!(columns[2]["deals"][0]["id"], deal_id.as_str());

        let (status, body) = owner
            .send(
                "PUT",
                &format!("/api/crm/deals/{deal_id}"),
                Some(json!({"status": "Won", "probability": 100})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "Won");
        assert_eq!(body["data"]["stageId"], stage_id(&pipeline, 2));
    }

    #[tokio::test]
    async fn test_cross_tenant_access_is_forbidden() {
        let (owner, intruder) = client_pair();
        let pipeline = create_pipeline(&owner).await;
        let id = pipeline["id"].as_str().unwrap();

        let (status, body) = intruder
            .send("GET", &format!("/api/crm/pipelines/{id}"), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Access denied");
        assert_eq!(body["code"], "FORBIDDEN");

        let (status, _) = intruder
            .send("DELETE", &format!("/api/crm/pipelines/{id}"), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = intruder
            .send(
                "GET",
                &format!("/api/crm/pipelines/{}", Uuid::new_v4()),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Pipeline not found");

        let (_, body) = intruder.send("GET", "/api/crm/pipelines", None).await;
        assert!(body["data"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_placement_conflicts() {
        let (owner, _) = client_pair();
        let pipeline = create_pipeline(&owner).await;
        let pipeline_id = pipeline["id"].as_str().unwrap().to_string();
        let contact_id = create_contact(&owner, "Grace").await;
        let uri = format!("/api/crm/pipelines/{pipeline_id}/contacts");

        let (status, _) = owner
            .send(
                "POST",
                &uri,
                Some(json!({"contactId": contact_id, "stageId": stage_id(&pipeline, 0)})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = owner
            .send(
                "POST",
                &uri,
                Some(json!({"contactId": contact_id, "stageId": stage_id(&pipeline, 1)})),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "CONFLICT");

        let (status, body) = owner
            .send(
                "PUT",
                &format!("{uri}/{contact_id}/move"),
                Some(json!({
                    "sourceStageId": stage_id(&pipeline, 0),
                    "destinationStageId": stage_id(&pipeline, 1),
                    "destinationIndex": 3
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["itemType"], "contact");
        assert_eq!(body["data"]["position"], 0);
    }

    #[tokio::test]
    async fn test_validation_envelope() {
        let (owner, _) = client_pair();
        let pipeline = create_pipeline(&owner).await;
        let contact_id = create_contact(&owner, "Alan").await;

        let (status, body) = owner
            .send(
                "POST",
                "/api/crm/deals",
                Some(json!({
                    "pipelineId": pipeline["id"],
                    "stageId": stage_id(&pipeline, 0),
                    "contactId": contact_id,
                    "name": "Bombe",
                    "probability": 140
                })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION");
        assert_eq!(body["details"][0]["field"], "probability");

        let (status, body) = owner
            .send("POST", "/api/crm/pipelines", Some(json!({"stages": []})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_non_empty_stage_cannot_be_deleted() {
        let (owner, _) = client_pair();
        let pipeline = create_pipeline(&owner).await;
        let contact_id = create_contact(&owner, "Edsger").await;
        let (status, _) = owner
            .send(
                "POST",
                "/api/crm/deals",
                Some(json!({
                    "pipelineId": pipeline["id"],
                    "stageId": stage_id(&pipeline, 1),
                    "contactId": contact_id,
                    "name": "Semaphores"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = owner
            .send(
                "DELETE",
                &format!("/api/crm/stages/{}", stage_id(&pipeline, 1)),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = owner
            .send(
                "DELETE",
                &format!("/api/crm/stages/{}", stage_id(&pipeline, 0)),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Stage deleted successfully");
    }
}
