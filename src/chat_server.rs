//! Fan-out of newly posted team messages to connected websocket sessions.
//!
//! Persistence and access checks happen in the HTTP handlers before a message
//! reaches this actor; it only routes payloads to live connections.

use std::collections::HashMap;

use actix::prelude::*;
use log::{debug, info};

/// Serialized event pushed to a websocket client.
#[derive(Message, Clone, Debug)]
#[rtype(result = "()")]
pub struct WsMessage(pub String);

#[derive(Message)]
#[rtype(result = "()")]
pub struct Connect {
    pub user_id: String,
    pub addr: Recipient<WsMessage>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub user_id: String,
    pub addr: Recipient<WsMessage>,
}

/// A stored message to deliver to every listed recipient.
#[derive(Message)]
#[rtype(result = "()")]
pub struct TeamMessagePosted {
    pub recipients: Vec<String>,
    pub payload: String,
}

#[derive(Default)]
pub struct ChatServer {
    // One user may hold several connections (tabs, devices).
    sessions: HashMap<String, Vec<Recipient<WsMessage>>>,
}

impl ChatServer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Actor for ChatServer {
    type Context = Context<Self>;
}

impl Handler<Connect> for ChatServer {
    type Result = ();

    fn handle(&mut self, msg: Connect, _: &mut Context<Self>) {
        info!("User {} connected (WS)", msg.user_id);
        self.sessions.entry(msg.user_id).or_default().push(msg.addr);
    }
}

impl Handler<Disconnect> for ChatServer {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _: &mut Context<Self>) {
        info!("User {} disconnected (WS)", msg.user_id);
        if let Some(addrs) = self.sessions.get_mut(&msg.user_id) {
            addrs.retain(|a| a != &msg.addr);
            if addrs.is_empty() {
                self.sessions.remove(&msg.user_id);
            }
        }
    }
}

impl Handler<TeamMessagePosted> for ChatServer {
    type Result = ();

    fn handle(&mut self, msg: TeamMessagePosted, _: &mut Context<Self>) {
        let mut delivered = 0;
        for user_id in &msg.recipients {
            for addr in self.sessions.get(user_id).into_iter().flatten() {
                addr.do_send(WsMessage(msg.payload.clone()));
                delivered += 1;
            }
        }
        debug!("Relayed team message to {} connection(s)", delivered);
    }
}
