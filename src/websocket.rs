/// WebSocket transport: one actor per connection, a shared store, and
/// table subscriptions that receive invalidation notices.
use actix::prelude::*;
use actix_web::error::BlockingError;
use actix_web::web::{self, Data};
use actix_web_actors::ws;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::{GridError, Result};
use crate::messages::{Call, ClientMessage, Invalidation, Reply, ServerMessage};
use crate::rpc;
use crate::table::Store;

/// How often heartbeat pings are sent
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// How long before lack of client response causes a timeout
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared state for all connections
pub struct AppState {
    pub store: Arc<Mutex<Store>>,
    pub subscribers: Arc<Mutex<HashMap<Uuid, Vec<Addr<GridSocket>>>>>,
}

impl AppState {
    pub fn new(store: Store) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run a call and broadcast the invalidations it produced
    pub fn call(&self, call: Call) -> Result<Reply> {
        let dispatched = {
            let mut store = self
                .store
                .lock()
                .map_err(|_| GridError::Transport("store lock poisoned".to_string()))?;
            rpc::dispatch(&mut store, call)?
        };
        for invalidation in dispatched.invalidations {
            self.broadcast(invalidation);
        }
        Ok(dispatched.reply)
    }

    /// Run a call on the blocking pool so the full-scan paths never hold up
    /// an async worker. The outer error means the pool itself failed.
    pub async fn call_blocking(state: Data<AppState>, call: Call) -> std::result::Result<Result<Reply>, BlockingError> {
        web::block(move || state.call(call)).await
    }

    fn check_table(&self, table_id: Uuid) -> Result<()> {
        let store = self
            .store
            .lock()
            .map_err(|_| GridError::Transport("store lock poisoned".to_string()))?;
        store.table(table_id)?;
        Ok(())
    }

    /// Subscribe a connection to a table
    pub fn subscribe(&self, table_id: Uuid, addr: Addr<GridSocket>) -> Result<()> {
        self.check_table(table_id)?;
        let mut subscribers = self
            .subscribers
            .lock()
            .map_err(|_| GridError::Transport("subscriber lock poisoned".to_string()))?;
        let entry = subscribers.entry(table_id).or_default();
        if !entry.contains(&addr) {
            entry.push(addr);
        }
        Ok(())
    }

    /// Drop a connection from every table it subscribed to
    pub fn unsubscribe(&self, addr: &Addr<GridSocket>) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            for addrs in subscribers.values_mut() {
                addrs.retain(|a| a != addr);
            }
            subscribers.retain(|_, addrs| !addrs.is_empty());
        }
    }

    fn broadcast(&self, invalidation: Invalidation) {
        let Ok(subscribers) = self.subscribers.lock() else {
            log::error!("subscriber lock poisoned, dropping invalidation");
            return;
        };
        if let Some(addrs) = subscribers.get(&invalidation.table_id) {
            log::debug!(
                "table {} revision {}: notifying {} subscribers",
                invalidation.table_id,
                invalidation.revision,
                addrs.len()
            );
            for addr in addrs {
                addr.do_send(Notify(ServerMessage::Invalidated(invalidation.clone())));
            }
        }
    }
}

/// Message pushed to a connection
#[derive(Message)]
#[rtype(result = "()")]
struct Notify(ServerMessage);

/// WebSocket connection actor
pub struct GridSocket {
    hb: Instant,
    state: Data<AppState>,
}

impl GridSocket {
    pub fn new(state: Data<AppState>) -> Self {
        Self {
            hb: Instant::now(),
            state,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                log::warn!("WebSocket client heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn send(ctx: &mut ws::WebsocketContext<Self>, msg: &ServerMessage) {
        match serde_json::to_string(msg) {
            Ok(text) => ctx.text(text),
            Err(e) => log::error!("failed to encode server message: {}", e),
        }
    }

    fn handle_client_message(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let request_id = msg.request_id;
        let call = match msg.call {
            Call::Subscribe { table_id } => {
                let response = match self.state.subscribe(table_id, ctx.address()) {
                    Ok(()) => ServerMessage::Subscribed { table_id },
                    Err(e) => ServerMessage::Error {
                        request_id: Some(request_id),
                        message: e.to_string(),
                    },
                };
                Self::send(ctx, &response);
                return;
            }
            call => call,
        };

        let work = AppState::call_blocking(self.state.clone(), call);
        ctx.spawn(work.into_actor(self).map(move |result, _act, ctx| {
            let response = match result {
                Ok(Ok(reply)) => ServerMessage::Reply { request_id, reply },
                Ok(Err(e)) => {
                    log::debug!("request {} failed: {}", request_id, e);
                    ServerMessage::Error {
                        request_id: Some(request_id),
                        message: e.to_string(),
                    }
                }
                Err(e) => {
                    log::error!("rpc worker failed: {}", e);
                    ServerMessage::Error {
                        request_id: Some(request_id),
                        message: "internal error".to_string(),
                    }
                }
            };
            Self::send(ctx, &response);
        }));
    }
}

impl Actor for GridSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);
    }

    fn stopped(&mut self, ctx: &mut Self::Context) {
        self.state.unsubscribe(&ctx.address());
    }
}

impl StreamHandler<std::result::Result<ws::Message, ws::ProtocolError>> for GridSocket {
    fn handle(&mut self, msg: std::result::Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => self.handle_client_message(client_msg, ctx),
                Err(e) => Self::send(
                    ctx,
                    &ServerMessage::Error {
                        request_id: None,
                        message: format!("Invalid message format: {}", e),
                    },
                ),
            },
            Ok(ws::Message::Binary(_)) => {
                log::warn!("unexpected binary WebSocket message");
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            _ => ctx.stop(),
        }
    }
}

impl Handler<Notify> for GridSocket {
    type Result = ();

    fn handle(&mut self, msg: Notify, ctx: &mut Self::Context) {
        Self::send(ctx, &msg.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_runs_against_shared_store() {
        let (store, table_id) = Store::with_demo_data().unwrap();
        let state = AppState::new(store);
        let reply = state.call(Call::CountRows { table_id }).unwrap();
        assert_eq!(reply, Reply::Count(503));

        let err = state.call(Call::CountRows { table_id: Uuid::new_v4() }).unwrap_err();
        assert!(matches!(err, GridError::TableNotFound(_)));
    }

    #[actix_web::test]
    async fn test_blocking_call_reaches_store() {
        let (store, table_id) = Store::with_demo_data().unwrap();
        let state = Data::new(AppState::new(store));
        let reply = AppState::call_blocking(state.clone(), Call::CountRows { table_id }).await;
        assert_eq!(reply.unwrap().unwrap(), Reply::Count(503));

        let missing = AppState::call_blocking(state, Call::ListColumns { table_id: Uuid::new_v4() }).await;
        assert!(matches!(missing.unwrap(), Err(GridError::TableNotFound(_))));
    }

    #[test]
    fn test_poisoned_store_is_a_transport_error() {
        let (store, table_id) = Store::with_demo_data().unwrap();
        let state = AppState::new(store);
        let shared = Arc::clone(&state.store);
        let _ = std::thread::spawn(move || {
            let _guard = shared.lock().unwrap();
            panic!("writer crashed while holding the store");
        })
        .join();

        let err = state.call(Call::CountRows { table_id }).unwrap_err();
        assert!(matches!(err, GridError::Transport(_)));
        // Subscriptions are refused rather than registered unchecked
        let err = state.check_table(table_id).unwrap_err();
        assert!(matches!(err, GridError::Transport(_)));
    }
}
