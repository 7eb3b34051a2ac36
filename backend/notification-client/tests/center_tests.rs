//! Local notification state fed by REST fetch and live pushes

use async_trait::async_trait;
use notification_client::config::{ApiConfig, AuthMode, BrokerConfig};
use notification_client::websocket::{BrokerConnector, BrokerLink, LinkEvent};
use notification_client::{
    ApiClient, ConnectionManager, Notification, NotificationApi, NotificationCenter,
    NotificationId, Result,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct LoopbackConnector {
    links: Mutex<Vec<mpsc::UnboundedSender<LinkEvent>>>,
}

impl LoopbackConnector {
    fn push(&self, body: serde_json::Value) {
        let links = self.links.lock();
        links
            .last()
            .expect("not connected")
            .send(LinkEvent::Message(body.to_string()))
            .expect("reader gone");
    }
}

#[async_trait]
impl BrokerConnector for LoopbackConnector {
    async fn connect(&self, _topic: &str) -> Result<BrokerLink> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown, _) = oneshot::channel();
        self.links.lock().push(tx);
        Ok(BrokerLink::new(rx, shutdown))
    }
}

struct Harness {
    server: MockServer,
    connector: Arc<LoopbackConnector>,
    manager: ConnectionManager,
}

impl Harness {
    async fn start() -> Self {
        let server = MockServer::start().await;
        let connector = Arc::new(LoopbackConnector::default());
        let manager = ConnectionManager::new(BrokerConfig::default(), connector.clone());
        Self {
            server,
            connector,
            manager,
        }
    }

    fn center(&self, receiver_code: &str) -> NotificationCenter {
        let config = ApiConfig {
            base_url: format!("{}/api", self.server.uri()),
            auth_mode: AuthMode::Header,
            ..ApiConfig::default()
        };
        let client = ApiClient::new(&config, Some("t0k".to_string())).unwrap();
        NotificationCenter::new(receiver_code, NotificationApi::new(client), &self.manager)
    }

    async fn mount_list(&self, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/api/notifications/receiver/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

fn ids(center: &NotificationCenter) -> Vec<String> {
    center
        .notifications()
        .iter()
        .map(|n| n.id.to_string())
        .collect()
}

#[tokio::test]
async fn test_refresh_loads_list_in_returned_order() {
    let harness = Harness::start().await;
    harness
        .mount_list(json!([
            { "id": 11, "title": "a", "read": false },
            { "id": 12, "title": "b", "read": true },
            { "id": 13, "title": "c", "read": false }
        ]))
        .await;

    let center = harness.center("7");
    assert!(center.is_empty());

    assert_eq!(center.refresh().await.unwrap(), 3);
    assert_eq!(ids(&center), vec!["11", "12", "13"]);
    assert_eq!(center.unread_count(), 2);
}

#[tokio::test]
async fn test_live_push_for_fetched_id_is_ignored() {
    let harness = Harness::start().await;
    harness
        .mount_list(json!([{ "id": 11 }, { "id": 12 }, { "id": 13 }]))
        .await;
    let center = harness.center("7");
    let fanned_out = Arc::new(Mutex::new(0usize));
    let counter = fanned_out.clone();
    let _sub = harness.manager.subscribe(Arc::new(move |_: &Notification| {
        *counter.lock() += 1;
    }));

    center.refresh().await.unwrap();
    assert!(harness.manager.connect("7").await);
    harness.connector.push(json!({ "id": 12, "title": "again" }));
    settle().await;

    assert_eq!(center.len(), 3);
    assert_eq!(*fanned_out.lock(), 0);
}

#[tokio::test]
async fn test_live_push_then_fetch_surfaces_once() {
    let harness = Harness::start().await;
    harness
        .mount_list(json!([{ "id": 21, "title": "from rest", "read": true }]))
        .await;
    let center = harness.center("7");

    assert!(harness.manager.connect("7").await);
    harness.connector.push(json!({ "id": 20 }));
    harness.connector.push(json!({ "id": 21, "title": "from push" }));
    settle().await;
    assert_eq!(ids(&center), vec!["21", "20"]);

    assert_eq!(center.refresh().await.unwrap(), 0);
    assert_eq!(center.len(), 2);
    // The REST copy replaces the pushed one in place
    let updated = center.get(&NotificationId::from(21u64)).unwrap();
    assert_eq!(updated.title, "from rest");
    assert!(updated.read);
}

#[tokio::test]
async fn test_mark_read_updates_unread_count() {
    let harness = Harness::start().await;
    harness
        .mount_list(json!([{ "id": 1 }, { "id": 2 }]))
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/notifications/1/read"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/notifications/receiver/7/read-all"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&harness.server)
        .await;

    let center = harness.center("7");
    center.refresh().await.unwrap();
    assert_eq!(center.unread_count(), 2);

    assert!(center.mark_read(&NotificationId::from("1")).await.unwrap());
    assert_eq!(center.unread_count(), 1);

    center.mark_all_read().await.unwrap();
    assert_eq!(center.unread_count(), 0);
}

#[tokio::test]
async fn test_failed_mark_read_leaves_state_untouched() {
    let harness = Harness::start().await;
    harness.mount_list(json!([{ "id": 1 }])).await;
    Mock::given(method("PUT"))
        .and(path("/api/notifications/1/read"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&harness.server)
        .await;

    let center = harness.center("7");
    center.refresh().await.unwrap();

    assert!(center.mark_read(&NotificationId::from("1")).await.is_err());
    assert_eq!(center.unread_count(), 1);
}

#[tokio::test]
async fn test_deleted_id_is_treated_as_new_on_redelivery() {
    let harness = Harness::start().await;
    harness.mount_list(json!([])).await;
    Mock::given(method("DELETE"))
        .and(path("/api/notifications/5"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&harness.server)
        .await;

    let center = harness.center("7");
    assert!(harness.manager.connect("7").await);
    harness.connector.push(json!({ "id": 5 }));
    settle().await;
    assert_eq!(center.len(), 1);

    assert!(center.delete(&NotificationId::from("5")).await.unwrap());
    assert!(center.is_empty());
    assert!(!harness.manager.dispatcher().is_seen(&NotificationId::from("5")));

    harness.connector.push(json!({ "id": 5 }));
    settle().await;
    assert_eq!(ids(&center), vec!["5"]);
}

#[tokio::test]
async fn test_clear_all_empties_state_and_dedup_set() {
    let harness = Harness::start().await;
    harness
        .mount_list(json!([{ "id": 1 }, { "id": 2 }]))
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/notifications/receiver/7"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&harness.server)
        .await;

    let center = harness.center("7");
    center.refresh().await.unwrap();
    assert_eq!(harness.manager.dispatcher().seen_count(), 2);

    assert_eq!(center.clear_all().await.unwrap(), 2);
    assert!(center.is_empty());
    assert_eq!(harness.manager.dispatcher().seen_count(), 0);
}

#[tokio::test]
async fn test_dropping_center_unregisters_listener() {
    let harness = Harness::start().await;
    let center = harness.center("7");
    assert_eq!(harness.manager.dispatcher().listener_count(), 1);

    drop(center);
    assert_eq!(harness.manager.dispatcher().listener_count(), 0);
    assert!(harness.manager.disconnect(false));
}
