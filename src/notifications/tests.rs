use crate::config::test_helpers::{setup_test_db, test_config};
use crate::routes::{build_state, router_for_state};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::StreamExt;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

#[tokio::test]
async fn test_event_stream_delivers_published_events() {
    let db = setup_test_db().await;
    let state = build_state(&db, &test_config());
    let app = router_for_state(&state);

    let response = app
        .oneshot(Request::builder().uri("/api/events").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    // The handler has subscribed by the time the response exists
    let experiment_id = Uuid::new_v4();
    state.events.rows_inserted(experiment_id, 42);

    let mut body = response.into_body().into_data_stream();
    let frame = tokio::time::timeout(Duration::from_secs(5), body.next())
        .await
        .expect("no event within timeout")
        .unwrap()
        .unwrap();
    let frame = String::from_utf8(frame.to_vec()).unwrap();

    assert!(frame.contains("event: rows_inserted"), "{frame}");
    assert!(frame.contains(&experiment_id.to_string()));
    assert!(frame.contains("\"row_count\":42"));
}
