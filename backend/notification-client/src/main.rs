use anyhow::{bail, Context};
use notification_client::{
    logging, metrics, AlertPermission, ApiClient, Config, ConnectionManager, DesktopAlerts,
    Notification, NotificationApi, NotificationCenter, SessionStore, StompConnector,
    TracingNotifier,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    logging::init_tracing(config.log.json);

    tracing::info!("Starting notification client");

    let store = SessionStore::new(config.session.path.clone());
    let session = store
        .load()
        .await
        .context("failed to read stored session")?;
    let token = session.as_ref().map(|s| s.token.clone());

    let Some(receiver_code) = config
        .receiver_code
        .clone()
        .or_else(|| session.as_ref().and_then(|s| s.user_id.clone()))
    else {
        bail!("no receiver code: set RECEIVER_CODE or sign in first");
    };

    let api = ApiClient::new(&config.api, token.clone())?;
    let connector = Arc::new(StompConnector::new(config.broker.clone(), token));
    let manager = ConnectionManager::new(config.broker.clone(), connector);

    let center = NotificationCenter::new(&receiver_code, NotificationApi::new(api), &manager);
    let alerts = DesktopAlerts::from_config(Arc::new(TracingNotifier), &config.alerts);
    let alerts_subscription =
        (alerts.permission() == AlertPermission::Granted).then(|| alerts.attach(&manager));
    let printer = manager.subscribe(Arc::new(|n: &Notification| {
        println!("[{}] {}: {}", n.notification_type, n.title, n.message);
    }));

    let mut status = manager.watch_status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let state = *status.borrow_and_update();
            tracing::info!(state = %state, "connection status");
        }
    });

    if !manager.connect(&receiver_code).await {
        tracing::warn!("live channel unavailable, relying on reconnect schedule");
    }

    match center.refresh().await {
        Ok(added) => tracing::info!(
            added,
            unread = center.unread_count(),
            "loaded notifications"
        ),
        Err(e) => tracing::warn!("Failed to load notifications: {}", e),
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    tracing::info!("Shutting down");
    printer.unsubscribe();
    if let Some(subscription) = alerts_subscription {
        subscription.unsubscribe();
    }
    drop(center);
    manager.disconnect(true);
    tracing::debug!("{}", metrics::render());

    Ok(())
}
