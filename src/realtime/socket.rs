use std::time::Duration;

use rocket::State;
use rocket::futures::{SinkExt, StreamExt};
use rocket_ws::{Channel, Message, WebSocket, stream::DuplexStream};
use sqlx::{Pool, Sqlite};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::timeout;
use tracing::{error, info, warn};

use super::{NotificationHub, WsMessage};
use crate::auth::{User, user_for_token};
use crate::db::unread_notification_count;

const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(30);

type SocketResult = Result<(), rocket_ws::result::Error>;

async fn send(stream: &mut DuplexStream, message: &WsMessage) -> SocketResult {
    match message.to_json() {
        Ok(text) => stream.send(Message::text(text)).await,
        Err(e) => {
            error!(error = %e, "Failed to encode socket frame");
            Ok(())
        }
    }
}

async fn send_count(stream: &mut DuplexStream, pool: &Pool<Sqlite>, user_id: i64) -> SocketResult {
    match unread_notification_count(pool, user_id).await {
        Ok(count) => send(stream, &WsMessage::NotificationCount { count }).await,
        Err(e) => {
            e.log_and_record("Unread count for socket");
            Ok(())
        }
    }
}

async fn reject(stream: &mut DuplexStream, reason: &str) -> SocketResult {
    warn!(reason, "Rejecting notification socket");
    send(stream, &WsMessage::error(reason)).await?;
    stream.send(Message::Close(None)).await
}

/// Waits for the opening `SUBSCRIBE` frame and resolves its token.
async fn authenticate(
    stream: &mut DuplexStream,
    pool: &Pool<Sqlite>,
) -> Result<Option<User>, rocket_ws::result::Error> {
    let first = match timeout(SUBSCRIBE_TIMEOUT, stream.next()).await {
        Ok(Some(Ok(message))) => message,
        Ok(Some(Err(e))) => return Err(e),
        Ok(None) => return Ok(None),
        Err(_) => {
            reject(stream, "Timed out waiting for SUBSCRIBE").await?;
            return Ok(None);
        }
    };

    let token = match first.to_text().map(WsMessage::from_json) {
        Ok(Ok(WsMessage::Subscribe { token })) => token,
        _ => {
            reject(stream, "Expected SUBSCRIBE").await?;
            return Ok(None);
        }
    };

    match user_for_token(pool, &token).await {
        Ok(Some(user)) => Ok(Some(user)),
        Ok(None) => {
            reject(stream, "Authentication required").await?;
            Ok(None)
        }
        Err(_) => {
            reject(stream, "Internal server error").await?;
            Ok(None)
        }
    }
}

async fn serve(mut stream: DuplexStream, pool: Pool<Sqlite>, hub: NotificationHub) -> SocketResult {
    // Subscribe before authenticating so nothing created in between is lost.
    let mut events = hub.subscribe();

    let Some(user) = authenticate(&mut stream, &pool).await? else {
        return Ok(());
    };
    info!(user_id = user.id, "Notification socket subscribed");
    send_count(&mut stream, &pool, user.id).await?;

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Text(text))) => {
                        // A repeated SUBSCRIBE just refreshes the count.
                        if let Ok(WsMessage::Subscribe { .. }) = WsMessage::from_json(&text) {
                            send_count(&mut stream, &pool, user.id).await?;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "Notification socket read failed");
                        break;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Ok(notification) if notification.user_id == user.id => {
                        send(&mut stream, &WsMessage::Notification(notification)).await?;
                        send_count(&mut stream, &pool, user.id).await?;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Notification socket lagged");
                        send_count(&mut stream, &pool, user.id).await?;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    info!(user_id = user.id, "Notification socket closed");
    Ok(())
}

#[get("/ws")]
pub fn notifications_socket(
    ws: WebSocket,
    pool: &State<Pool<Sqlite>>,
    hub: &State<NotificationHub>,
) -> Channel<'static> {
    let pool = pool.inner().clone();
    let hub = hub.inner().clone();
    ws.channel(move |stream| Box::pin(serve(stream, pool, hub)))
}
