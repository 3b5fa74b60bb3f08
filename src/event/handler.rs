use axum::Extension;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use log::{debug, error, warn};

use crate::{auth, event, user};

use super::Notification;
use super::model::EventStream;
use super::presence::Presence;

pub async fn ws(
    ws: WebSocketUpgrade,
    Extension(auth_user): Extension<auth::User>,
    State(relay): State<event::Service>,
    State(user_service): State<user::Service>,
    State(presence): State<Presence>,
) -> crate::Result<Response> {
    let events = relay.subscribe(auth_user.id()).await?;

    Ok(ws.on_upgrade(move |socket| async move {
        let id = auth_user.id().clone();

        if presence.connect(&id).await {
            notify_friends(&id, true, &relay, &user_service).await;
        }

        handle_socket(socket, events).await;

        if presence.disconnect(&id).await {
            notify_friends(&id, false, &relay, &user_service).await;
        }
    }))
}

async fn handle_socket(socket: WebSocket, mut events: EventStream) {
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                None => break,
                Some(Err(e)) => {
                    error!("failed to read ws frame: {e:?}");
                    break;
                }
                Some(Ok(Message::Close(_))) => {
                    debug!("ws connection closed by client");
                    break;
                }
                Some(Ok(other)) => warn!("ignoring inbound ws frame: {other:?}"),
            },

            event = events.next() => match event {
                None => break,
                Some(payload) => {
                    if let Err(e) = sender.send(Message::Text(payload.into())).await {
                        error!("failed to send event to client: {e:?}");
                        break;
                    }
                }
            },
        }
    }
}

async fn notify_friends(
    id: &user::Id,
    online: bool,
    relay: &event::Service,
    user_service: &user::Service,
) {
    let friends = match user_service.find_by_id(id).await {
        Ok(u) => u.friends().to_vec(),
        Err(e) => {
            error!("failed to find friends of {id}: {e:?}");
            return;
        }
    };

    let noti = Notification::OnlineStatus {
        user: id.clone(),
        online,
    };
    for f in &friends {
        relay.notify(f, &noti).await;
    }
}
