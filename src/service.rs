//! Websocket binding of the bus.
//!
//! Clients push payloads to a topic on `/ws/publish/<topic>` and receive what is published to a
//! topic on `/ws/subscribe/<topic>`.

use std::{
    collections::HashMap,
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc, Mutex, MutexGuard,
    },
    thread::{spawn, JoinHandle},
};

use log::{debug, info, warn};
use tungstenite::{
    accept_hdr,
    handshake::server::{Request, Response},
    Message as WsMessage, WebSocket,
};

use crate::{
    bus::{Bus, ChannelBus, Message, RejectReason, Subscription, JSON},
    error::BusError,
};

const BINARY: &str = "application/octet-stream";

type Peers = Arc<Mutex<HashMap<String, Vec<WebSocket<TcpStream>>>>>;

/// A payload to dispatch to the subscribers of a topic.
type Outbound = (String, Vec<u8>);

enum Route {
    Publish(String),
    Subscribe(String),
}

/// Bus served over websockets.
///
/// Inbound payloads are queued per topic in memory; websockets do not redeliver, so
/// acknowledgements and rejections are only logged.
pub struct WsBus {
    inbound: ChannelBus,
    outbound: Sender<Outbound>,
    dispatcher: JoinHandle<()>,
    address: SocketAddr,
}

impl WsBus {
    /// Listens on `address` and serves clients in background threads.
    pub fn bind(address: SocketAddr) -> Result<Self, BusError> {
        let server = TcpListener::bind(address)?;
        let address = server.local_addr()?;
        let inbound = ChannelBus::new();
        let peers: Peers = Arc::new(Mutex::new(HashMap::new()));
        let (outbound, outbound_receiver) = mpsc::channel::<Outbound>();
        let dispatcher = start_dispatcher(peers.clone(), outbound_receiver);
        let producer = inbound.clone();
        spawn(move || start_websockets(server, peers, producer));
        info!("websocket bus listening on {}", address);
        Ok(Self {
            inbound,
            outbound,
            dispatcher,
            address,
        })
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Stops accepting publications and waits until every published payload was written to the
    /// subscribers.
    pub fn close(self) -> Result<(), BusError> {
        drop(self.outbound);
        self.dispatcher
            .join()
            .map_err(|_| BusError::Unavailable("websocket dispatcher panicked".into()))?;
        info!("websocket bus on {} closed", self.address);
        Ok(())
    }
}

impl Bus for WsBus {
    fn subscribe(&self, topic: &str) -> Result<Subscription, BusError> {
        self.inbound.subscribe(topic)
    }

    fn publish(&self, topic: &str, payload: Vec<u8>, _content_type: &str) -> Result<(), BusError> {
        self.outbound
            .send((topic.into(), payload))
            .map_err(|_| BusError::Unavailable("websocket dispatcher stopped".into()))
    }

    fn acknowledge(&self, message: &Message) -> Result<(), BusError> {
        debug!("message {} acknowledged", message.id);
        self.inbound.acknowledge(message)
    }

    fn reject(&self, message: &Message, reason: RejectReason) -> Result<(), BusError> {
        warn!("message {} on `{}` rejected: {}", message.id, message.topic, reason);
        self.inbound.reject(message, reason)
    }
}

fn start_websockets(server: TcpListener, peers: Peers, producer: ChannelBus) {
    for stream in server.incoming() {
        let peers = peers.clone();
        let producer = producer.clone();
        spawn(move || {
            let (path, websocket) = match stream
                .map_err(BusError::from)
                .and_then(get_websocket)
            {
                Ok(accepted) => accepted,
                Err(reason) => {
                    warn!("{}", reason);
                    return;
                }
            };
            match route(&path) {
                Some(Route::Publish(topic)) => handle_producer(websocket, topic, producer),
                Some(Route::Subscribe(topic)) => handle_subscriber(websocket, topic, peers),
                None => warn!("no websocket route for `{}`", path),
            }
        });
    }
}

fn get_websocket(stream: TcpStream) -> Result<(String, WebSocket<TcpStream>), BusError> {
    let mut path: String = String::new();
    let callback = |req: &Request, response: Response| {
        path = String::from(req.uri().path());
        Ok(response)
    };
    let websocket =
        accept_hdr(stream, callback).map_err(|err| BusError::Handshake(err.to_string()))?;
    Ok((path, websocket))
}

fn route(path: &str) -> Option<Route> {
    let topic = |prefix: &str| {
        path.strip_prefix(prefix)
            .filter(|topic| !topic.is_empty())
            .map(String::from)
    };
    topic("/ws/publish/")
        .map(Route::Publish)
        .or_else(|| topic("/ws/subscribe/").map(Route::Subscribe))
}

fn handle_subscriber(websocket: WebSocket<TcpStream>, topic: String, peers: Peers) {
    debug!("new subscriber on `{}`", topic);
    lock(&peers).entry(topic).or_default().push(websocket);
}

fn handle_producer(mut websocket: WebSocket<TcpStream>, topic: String, producer: ChannelBus) {
    debug!("new producer on `{}`", topic);
    loop {
        let published = match websocket.read_message() {
            Ok(WsMessage::Text(txt)) => producer.publish(&topic, txt.into_bytes(), JSON),
            Ok(WsMessage::Binary(bytes)) => producer.publish(&topic, bytes, BINARY),
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => Ok(()),
            Err(reason) => {
                warn!("producer on `{}` dropped: {}", topic, reason);
                break;
            }
        };
        if let Err(reason) = published {
            warn!("{}", reason);
        }
    }
}

fn start_dispatcher(peers: Peers, outbound: Receiver<Outbound>) -> JoinHandle<()> {
    spawn(move || {
        for (topic, payload) in outbound {
            if let Some(subscribers) = lock(&peers).get_mut(&topic) {
                subscribers.retain_mut(|peer| send_payload(peer, &payload));
            }
        }
    })
}

/// Writes a payload to a subscriber; `false` once the subscriber is gone.
fn send_payload(peer: &mut WebSocket<TcpStream>, payload: &[u8]) -> bool {
    if !peer.can_write() {
        return false;
    }
    let message = match String::from_utf8(payload.to_vec()) {
        Ok(txt) => WsMessage::Text(txt),
        Err(err) => WsMessage::Binary(err.into_bytes()),
    };
    match peer.write_message(message) {
        Ok(()) => true,
        Err(reason) => {
            warn!("dropping subscriber: {}", reason);
            false
        }
    }
}

fn lock(peers: &Peers) -> MutexGuard<'_, HashMap<String, Vec<WebSocket<TcpStream>>>> {
    match peers.lock() {
        Ok(peers) => peers,
        Err(poisoned) => poisoned.into_inner(),
    }
}
