use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::codec;
use crate::config::Config;
use crate::engine::{Engine, Message};
use crate::value::Value;
use crate::Error;

/// Handle to a connection engine running as a background task.
///
/// Cloning is cheap; clones share the engine and its connection. The engine
/// stops when [`shutdown`](Client::shutdown) is called or the last handle is
/// dropped.
#[derive(Clone)]
pub struct Client {
    tx: mpsc::UnboundedSender<Message>,
}

impl Client {
    /// Spawns the engine and starts connecting in the background. Commands
    /// may be submitted immediately; they are queued until the connection is
    /// ready.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(config: Config) -> Client {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(Engine::new(config, rx).run());
        Client { tx }
    }

    /// Submits one command and resolves with its response.
    ///
    /// The command must be an array value, by protocol convention an array
    /// of bulk strings such as `["GET", "mykey"]`; anything else is rejected
    /// before it is queued. A server-reported error resolves successfully
    /// with a [`Value::Error`]; `Err` is reserved for client-side failures:
    /// a command that exhausted its retries or a stopped client.
    ///
    /// Commands are written to the wire in submission order and responses
    /// are matched back in that same order.
    pub async fn submit(&self, command: Value) -> crate::Result<Value> {
        if !command.is_array() {
            return Err(Error::NotAnArray);
        }

        let mut encoded = Vec::new();
        codec::encode_request(&command, &mut encoded);

        let (reply, response) = oneshot::channel();
        self.tx
            .send(Message::Submit {
                encoded: Bytes::from(encoded),
                reply,
            })
            .map_err(|_| Error::Stopped)?;

        response.await.map_err(|_| Error::Stopped)?
    }

    /// Stops the engine: queued and in-flight commands complete with
    /// [`Error::Stopped`], the connection is torn down, and the call returns
    /// once the engine has acknowledged. Safe to call more than once.
    pub async fn shutdown(&self) {
        let (done, ack) = oneshot::channel();
        if self.tx.send(Message::Shutdown { done }).is_err() {
            // Engine already gone.
            return;
        }
        let _ = ack.await;
    }
}
