//! Broker pub/sub dispatcher.
//!
//! One task owns the server's single pub/sub connection. It multiplexes
//! the message stream with subscribe/unsubscribe commands from the
//! subscription manager, and fans each received frame out to the
//! channel's live sessions. A session that cannot accept the frame is
//! dropped and its subscriptions released.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::session::SessionRegistry;
use super::subscriptions::{BrokerCommand, SubscriptionManager};
use crate::broker::RedisClient;

enum Event {
    Command(Option<BrokerCommand>),
    Frame(Option<(String, String)>),
}

pub async fn run(
    broker: Arc<RedisClient>,
    mut control: mpsc::UnboundedReceiver<BrokerCommand>,
    subscriptions: Arc<SubscriptionManager>,
    registry: Arc<SessionRegistry>,
) -> anyhow::Result<()> {
    let mut pubsub = broker.pubsub_connection().await?;
    info!("stream dispatcher connected to broker");

    loop {
        let event = {
            let mut stream = pubsub.on_message();
            tokio::select! {
                command = control.recv() => Event::Command(command),
                frame = stream.next() => Event::Frame(match frame {
                    Some(msg) => {
                        let channel = msg.get_channel_name().to_string();
                        match msg.get_payload::<String>() {
                            Ok(payload) => Some((channel, payload)),
                            Err(e) => {
                                warn!(%channel, error = %e, "unreadable pub/sub payload");
                                continue;
                            }
                        }
                    }
                    None => None,
                }),
            }
        };

        match event {
            Event::Command(Some(BrokerCommand::Subscribe(channel))) => {
                if let Err(e) = pubsub.subscribe(&channel).await {
                    error!(%channel, error = %e, "broker subscribe failed");
                }
            }
            Event::Command(Some(BrokerCommand::Unsubscribe(channel))) => {
                if let Err(e) = pubsub.unsubscribe(&channel).await {
                    error!(%channel, error = %e, "broker unsubscribe failed");
                }
            }
            Event::Command(None) => {
                info!("subscription control channel closed, dispatcher stopping");
                return Ok(());
            }
            Event::Frame(Some((channel, payload))) => {
                dispatch(&channel, payload, &subscriptions, &registry);
            }
            Event::Frame(None) => {
                // Connection lost. Reconnect and rebuild the broker-side
                // subscriptions from the live tables.
                warn!("pub/sub connection lost, reconnecting");
                tokio::time::sleep(Duration::from_secs(1)).await;
                pubsub = broker.pubsub_connection().await?;
                for channel in subscriptions.active_channels() {
                    if let Err(e) = pubsub.subscribe(&channel).await {
                        error!(%channel, error = %e, "resubscribe failed");
                    }
                }
            }
        }
    }
}

/// Forward a frame to every live subscriber of a channel, dropping the
/// sessions that cannot keep up.
fn dispatch(
    channel: &str,
    payload: String,
    subscriptions: &SubscriptionManager,
    registry: &SessionRegistry,
) {
    let targets = subscriptions.subscribers(channel);
    debug!(channel, targets = targets.len(), "dispatching frame");

    for session_id in targets {
        if registry.send_text(&session_id, payload.clone()).is_err() {
            warn!(%session_id, channel, "dropping slow or dead session");
            metrics::counter!("spotx_ws_dropped_sessions_total").increment(1);
            registry.remove(&session_id);
            subscriptions.session_left(&session_id);
        }
    }
}
