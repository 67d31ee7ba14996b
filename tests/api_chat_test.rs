//! Integration tests for the chat API endpoints

mod test_utils;

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use mockito::Matcher;
    use serde_json::{Value, json};
    use serial_test::serial;
    use tower::util::ServiceExt;

    use crate::test_utils::{body_to_string, test_app, test_app_with_chat_limit, test_config};

    const EVENTS_PATH: &str = "/calendar/v3/calendars/primary/events";
    const COMPLETIONS_PATH: &str = "/v1/chat/completions";

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method("POST")
            .header("content-type", "application/json")
            .header("authorization", "Bearer test-access-token")
            .header("x-user-email", "ada@example.com")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    /// Tests chat endpoints return 401 without a bearer token
    #[tokio::test]
    #[serial]
    async fn it_returns_401_without_credential() {
        let app = test_app(test_config("http://127.0.0.1:1", "http://127.0.0.1:1"));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/chat/message")
                    .method("POST")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"message": "Hello"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    /// Tests chat POST returns 422 for a missing message field
    #[tokio::test]
    #[serial]
    async fn it_returns_422_for_missing_message() {
        let app = test_app(test_config("http://127.0.0.1:1", "http://127.0.0.1:1"));

        let response = app
            .oneshot(post("/api/chat/message", json!({"conversationId": "abc"})))
            .await
            .unwrap();

        // Missing required field should return 422 (validation error)
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    /// Tests chat POST returns 400 for an empty message
    #[tokio::test]
    #[serial]
    async fn it_returns_400_for_empty_message() {
        let app = test_app(test_config("http://127.0.0.1:1", "http://127.0.0.1:1"));

        let response = app
            .oneshot(post("/api/chat/message", json!({"message": ""})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_to_string(response.into_body()).await;
        assert!(body.contains("Invalid request format"));
        assert!(body.contains("message"));
    }

    /// Tests chat POST returns 400 for an over-long message
    #[tokio::test]
    #[serial]
    async fn it_returns_400_for_oversized_message() {
        let app = test_app(test_config("http://127.0.0.1:1", "http://127.0.0.1:1"));

        let response = app
            .oneshot(post(
                "/api/chat/message",
                json!({"message": "x".repeat(2001)}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    /// Tests chat POST returns 400 for out-of-range context preferences
    #[tokio::test]
    #[serial]
    async fn it_returns_400_for_invalid_context_preferences() {
        let app = test_app(test_config("http://127.0.0.1:1", "http://127.0.0.1:1"));

        let response = app
            .oneshot(post(
                "/api/chat/message",
                json!({"message": "Hello", "contextPreferences": {"maxEvents": 500}}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_to_string(response.into_body()).await;
        assert!(body.contains("maxEvents"));
    }

    /// Tests a full chat turn with calendar context
    #[tokio::test]
    #[serial]
    async fn it_answers_with_calendar_context() {
        let mut google = mockito::Server::new_async().await;
        google
            .mock("GET", EVENTS_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"items": []}).to_string())
            .create_async()
            .await;

        let mut llm = mockito::Server::new_async().await;
        llm.mock("POST", COMPLETIONS_PATH)
            .with_status(200)
            .with_body(
                json!({
                    "choices": [{"message": {"content": "Your afternoon is wide open."}}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let app = test_app(test_config(&google.url(), &llm.url()));
        let response = app
            .oneshot(post(
                "/api/chat/message",
                json!({"message": "How busy am I today?"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value =
            serde_json::from_str(&body_to_string(response.into_body()).await).unwrap();
        assert_eq!(body["message"], "Your afternoon is wide open.");
        assert!(body["id"].as_str().unwrap().starts_with("msg_"));
        assert!(body["processingTime"].is_number());
        assert_eq!(body["metadata"]["model"], "gpt-4-turbo-preview");
        assert_eq!(body["calendarContext"]["eventsToday"], json!([]));
        // "busy" and "today" both match suggestion categories
        let actions = body["suggestedActions"].as_array().unwrap();
        assert!(
            actions
                .iter()
                .any(|action| action["id"] == "meeting-analytics")
        );
        assert!(
            actions
                .iter()
                .any(|action| action["id"] == "todays-schedule")
        );
    }

    /// Tests failed calendar fetches degrade to the fallback context
    /// instead of failing the turn
    #[tokio::test]
    #[serial]
    async fn it_degrades_to_fallback_context_when_calendar_fails() {
        let mut google = mockito::Server::new_async().await;
        google
            .mock("GET", EVENTS_PATH)
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("backendError")
            .create_async()
            .await;

        let mut llm = mockito::Server::new_async().await;
        llm.mock("POST", COMPLETIONS_PATH)
            .with_status(200)
            .with_body(
                json!({"choices": [{"message": {"content": "Happy to help anyway."}}]})
                    .to_string(),
            )
            .create_async()
            .await;

        let app = test_app(test_config(&google.url(), &llm.url()));
        let response = app
            .oneshot(post("/api/chat/message", json!({"message": "Hello"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value =
            serde_json::from_str(&body_to_string(response.into_body()).await).unwrap();
        assert_eq!(body["message"], "Happy to help anyway.");
        let context = &body["calendarContext"];
        assert_eq!(context["eventsToday"], json!([]));
        assert_eq!(context["upcomingEvents"], json!([]));
        assert!(context.get("analytics").is_none());
    }

    /// Tests an unreachable model API surfaces as 503
    #[tokio::test]
    #[serial]
    async fn it_returns_503_when_model_is_unavailable() {
        let app = test_app(test_config("http://127.0.0.1:1", "http://127.0.0.1:1"));

        let response = app
            .oneshot(post(
                "/api/chat/message",
                json!({"message": "Hello", "includeCalendarContext": false}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_to_string(response.into_body()).await;
        assert!(body.contains("AI service temporarily unavailable"));
    }

    /// Tests the admission gate rejects with 429 and Retry-After
    #[tokio::test]
    #[serial]
    async fn it_rate_limits_chat_requests() {
        let mut llm = mockito::Server::new_async().await;
        llm.mock("POST", COMPLETIONS_PATH)
            .with_status(200)
            .with_body(
                json!({"choices": [{"message": {"content": "ok"}}]}).to_string(),
            )
            .create_async()
            .await;

        let app = test_app_with_chat_limit(
            test_config("http://127.0.0.1:1", &llm.url()),
            1,
        );

        let first = app
            .clone()
            .oneshot(post(
                "/api/chat/message",
                json!({"message": "Hello", "includeCalendarContext": false}),
            ))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(post(
                "/api/chat/message",
                json!({"message": "Hello again", "includeCalendarContext": false}),
            ))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key("retry-after"));
        let body = body_to_string(second.into_body()).await;
        assert!(body.contains("Rate limit exceeded"));
    }

    /// Tests the streaming endpoint emits content chunks and a
    /// terminal done chunk
    #[tokio::test]
    #[serial]
    async fn it_streams_content_and_done_chunks() {
        let mut llm = mockito::Server::new_async().await;
        let sse_body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" there\"},\"finish_reason\":null}]}\n\n",
            "data: [DONE]\n\n",
        );
        llm.mock("POST", COMPLETIONS_PATH)
            .with_status(200)
            .with_body(sse_body)
            .create_async()
            .await;

        let app = test_app(test_config("http://127.0.0.1:1", &llm.url()));
        let response = app
            .oneshot(post(
                "/api/chat/stream",
                json!({"message": "Hello", "includeCalendarContext": false}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "text/event-stream"
        );

        let body = body_to_string(response.into_body()).await;
        assert!(body.contains(r#""type":"content""#));
        assert!(body.contains("Hello"));
        assert!(body.contains(r#""type":"done""#));
        assert!(body.contains("processingTime"));
    }

    /// Tests a mid-stream failure ends with an apologetic content
    /// chunk instead of a broken stream
    #[tokio::test]
    #[serial]
    async fn it_streams_apology_when_model_is_unavailable() {
        let app = test_app(test_config("http://127.0.0.1:1", "http://127.0.0.1:1"));
        let response = app
            .oneshot(post(
                "/api/chat/stream",
                json!({"message": "Hello", "includeCalendarContext": false}),
            ))
            .await
            .unwrap();

        // The stream opens successfully; the failure arrives inside it
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_to_string(response.into_body()).await;
        assert!(body.contains("I apologize"));
        assert!(body.contains("error_"));
    }

    /// Tests the context chunk leads the stream when calendar
    /// context is requested
    #[tokio::test]
    #[serial]
    async fn it_announces_context_fetch_in_stream() {
        let mut google = mockito::Server::new_async().await;
        google
            .mock("GET", EVENTS_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"items": []}).to_string())
            .create_async()
            .await;

        let mut llm = mockito::Server::new_async().await;
        llm.mock("POST", COMPLETIONS_PATH)
            .with_status(200)
            .with_body("data: [DONE]\n\n")
            .create_async()
            .await;

        let app = test_app(test_config(&google.url(), &llm.url()));
        let response = app
            .oneshot(post("/api/chat/stream", json!({"message": "Hello"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_to_string(response.into_body()).await;
        assert!(body.contains(r#""type":"context""#));
        assert!(body.contains("Fetching calendar context..."));
        let context_at = body.find(r#""type":"context""#).unwrap();
        let done_at = body.find(r#""type":"done""#).unwrap();
        assert!(context_at < done_at);
    }
}
