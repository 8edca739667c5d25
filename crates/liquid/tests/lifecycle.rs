//! Session and reset behavior observed through the public client.

mod common;

use common::{builder, flush, settle, ScriptedTransport, Switch};
use liquid::{AttributeValue, ResetPolicy};
use std::time::Duration;

#[tokio::test]
async fn test_background_past_timeout_starts_new_session() {
    let transport = ScriptedTransport::new();
    let client = builder(&transport)
        .session_timeout(Duration::ZERO)
        .build()
        .await
        .unwrap();
    let first = client.session().await.unwrap().unwrap();

    client.on_app_backgrounded().await.unwrap();
    client.on_app_foregrounded().await.unwrap();
    flush(&client).await;

    assert_eq!(
        transport.event_names(),
        ["_startSession", "_pauseSession", "_endSession", "_startSession"]
    );
    let second = client.session().await.unwrap().unwrap();
    assert_ne!(first.id(), second.id());

    // the old session ends when the app went to background
    let points = transport.sent_to("/data_points");
    let paused_at = points[1].json()["event"]["date"].clone();
    let ended = points[2].json();
    assert_eq!(ended["session"]["unique_id"], first.id());
    assert_eq!(ended["session"]["ended_at"], paused_at);
}

#[tokio::test]
async fn test_short_background_resumes_session() {
    let transport = ScriptedTransport::new();
    let client = builder(&transport)
        .session_timeout(Duration::from_secs(3600))
        .build()
        .await
        .unwrap();
    let first = client.session().await.unwrap().unwrap();

    client.on_app_backgrounded().await.unwrap();
    client.on_app_foregrounded().await.unwrap();
    flush(&client).await;

    assert_eq!(
        transport.event_names(),
        ["_startSession", "_pauseSession", "_resumeSession"]
    );
    assert_eq!(client.session().await.unwrap().unwrap().id(), first.id());
}

#[tokio::test]
async fn test_background_flushes_and_refreshes_values() {
    let transport = ScriptedTransport::new();
    let client = builder(&transport).build().await.unwrap();
    settle(&client).await;
    let fetches = transport.sent_to("/liquid_package").len();

    client.track("tap").send().await.unwrap();
    client.on_app_backgrounded().await.unwrap();
    settle(&client).await;

    assert!(client.pending_requests().await.unwrap().is_empty());
    assert_eq!(transport.sent_to("/liquid_package").len(), fetches + 1);
}

#[tokio::test]
async fn test_close_session() {
    let transport = ScriptedTransport::new();
    let client = builder(&transport).build().await.unwrap();
    let first = client.session().await.unwrap().unwrap();

    client.close_session().await.unwrap();
    flush(&client).await;

    let second = client.session().await.unwrap().unwrap();
    assert_ne!(first.id(), second.id());
    assert!(second.is_open());
    assert_eq!(
        transport.event_names(),
        ["_startSession", "_endSession", "_startSession"]
    );
}

#[tokio::test]
async fn test_identify_same_user_keeps_session() {
    let transport = ScriptedTransport::new();
    let client = builder(&transport).build().await.unwrap();

    client.identify("A").send().await.unwrap();
    let session = client.session().await.unwrap().unwrap();

    client.identify("A").attribute("k", 1).send().await.unwrap();

    let user = client.user().await.unwrap().unwrap();
    assert_eq!(user.identifier(), "A");
    assert_eq!(user.attribute("k"), Some(&AttributeValue::from(1)));
    assert_eq!(client.session().await.unwrap().unwrap().id(), session.id());
}

#[tokio::test]
async fn test_reset_user_replaces_identified_user() {
    let transport = ScriptedTransport::new();
    let client = builder(&transport).build().await.unwrap();

    client
        .identify("user_1")
        .attribute("plan", "pro")
        .send()
        .await
        .unwrap();
    client.reset_user().await.unwrap();

    let user = client.user().await.unwrap().unwrap();
    assert_ne!(user.identifier(), "user_1");
    assert!(!user.is_identified());
    assert!(user.attributes().is_empty());
}

#[tokio::test]
async fn test_reset_user_keeps_anonymous_id() {
    let transport = ScriptedTransport::new();
    let client = builder(&transport).build().await.unwrap();
    client.set_attribute("theme", "dark").await.unwrap();
    let before = client.user().await.unwrap().unwrap();

    client.reset_user().await.unwrap();

    let after = client.user().await.unwrap().unwrap();
    assert_eq!(after.identifier(), before.identifier());
    assert!(after.attribute("theme").is_none());
}

#[tokio::test]
async fn test_hard_reset_clears_queue() {
    let transport = ScriptedTransport::new();
    let client = builder(&transport)
        .connectivity(Switch::offline())
        .build()
        .await
        .unwrap();
    client.identify("user_1").send().await.unwrap();
    client.track("tap").send().await.unwrap();

    client.reset().await.unwrap();

    let pending = client.pending_requests().await.unwrap();
    // only the new anonymous user's session start
    assert_eq!(pending.len(), 1);
    assert!(pending[0].body().unwrap().contains("_startSession"));
    assert!(!client.user().await.unwrap().unwrap().is_identified());
}

#[tokio::test]
async fn test_hard_reset_can_preserve_queue() {
    let transport = ScriptedTransport::new();
    let client = builder(&transport)
        .connectivity(Switch::offline())
        .reset_policy(ResetPolicy::PreserveQueue)
        .build()
        .await
        .unwrap();
    client.track("tap").send().await.unwrap();
    let before = client.pending_requests().await.unwrap().len();

    let session = client.session().await.unwrap().unwrap();

    client.reset().await.unwrap();

    // plus the start of the replacement session
    assert_eq!(client.pending_requests().await.unwrap().len(), before + 1);
    assert_ne!(client.session().await.unwrap().unwrap().id(), session.id());
}

#[tokio::test]
async fn test_soft_reset_keeps_queue_and_clears_values() {
    let transport = ScriptedTransport::new();
    transport.set_package(
        r#"{"values": [{"id": "v1", "value": 5,
            "variable": {"id": "a", "name": "limit", "data_type": "integer"}}]}"#,
    );
    let client = builder(&transport)
        .connectivity(Switch::online())
        .auto_load_values(true)
        .build()
        .await
        .unwrap();
    settle(&client).await;
    assert_eq!(client.get_int("limit", 1), 5);
    let before = client.pending_requests().await.unwrap().len();

    client.soft_reset().await.unwrap();
    settle(&client).await;

    assert_eq!(client.get_int("limit", 1), 1);
    assert_eq!(client.pending_requests().await.unwrap().len(), before + 1);
}

#[tokio::test]
async fn test_queue_capacity_evicts_oldest() {
    let transport = ScriptedTransport::new();
    let client = builder(&transport)
        .connectivity(Switch::offline())
        .queue_capacity(3)
        .build()
        .await
        .unwrap();

    for name in ["a", "b", "c", "d"] {
        client.track(name).send().await.unwrap();
    }

    let pending = client.pending_requests().await.unwrap();
    assert_eq!(pending.len(), 3);
    assert!(pending[0].body().unwrap().contains(r#""name":"b""#));
    assert!(pending[2].body().unwrap().contains(r#""name":"d""#));
}

#[tokio::test]
async fn test_offline_flush_keeps_requests_untouched() {
    let transport = ScriptedTransport::new();
    let switch = Switch::offline();
    let client = builder(&transport)
        .connectivity(switch.clone())
        .build()
        .await
        .unwrap();

    flush(&client).await;
    let pending = client.pending_requests().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempts(), 0);
    assert!(transport.sent_to("/data_points").is_empty());

    switch.set(true);
    flush(&client).await;
    assert!(client.pending_requests().await.unwrap().is_empty());
    assert_eq!(transport.event_names(), ["_startSession"]);
}

#[tokio::test]
async fn test_set_flush_interval_starts_periodic_flush() {
    let transport = ScriptedTransport::new();
    let client = builder(&transport).build().await.unwrap();
    client.track("tap").send().await.unwrap();

    client
        .set_flush_interval(Duration::from_millis(50))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(client.pending_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_location_is_reported_on_device() {
    let transport = ScriptedTransport::new();
    let client = builder(&transport).build().await.unwrap();

    client.set_location(Some((52.5, 13.4))).await.unwrap();
    client.track("checkin").send().await.unwrap();
    client.set_location(None).await.unwrap();
    client.track("checkout").send().await.unwrap();
    flush(&client).await;

    let points = transport.sent_to("/data_points");
    let checkin = points[1].json();
    assert_eq!(checkin["device"]["_latitude"], 52.5);
    assert_eq!(checkin["device"]["_longitude"], 13.4);
    assert!(points[2].json()["device"].get("_latitude").is_none());
}
