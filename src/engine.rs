use std::collections::VecDeque;
use std::io;

use bytes::Bytes;
use futures::StreamExt;
use tokio::net::lookup_host;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::codec;
use crate::command::Command;
use crate::config::Config;
use crate::connection::{Connection, Writer};
use crate::value::Value;
use crate::Error;

pub(crate) enum Message {
    Submit {
        encoded: Bytes,
        reply: oneshot::Sender<crate::Result<Value>>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// Outcome of driving one established connection.
enum Exit {
    Reconnect,
    Shutdown,
}

/// What became of one parsed response.
enum Dispatch {
    Completed,
    Authenticated,
    Fatal,
}

type WriteTask = JoinHandle<(Writer, io::Result<()>)>;

/// The connection engine. Runs as a single task owning both command queues
/// and the live connection, so every queue mutation and state transition is
/// serialized without locks. Callers reach it through the message channel.
pub(crate) struct Engine {
    config: Config,
    rx: mpsc::UnboundedReceiver<Message>,
    /// Accepted commands not yet handed to the transport.
    pending: VecDeque<Command>,
    /// Commands written to the socket, matched to responses in FIFO order.
    in_flight: VecDeque<Command>,
}

impl Engine {
    pub fn new(config: Config, rx: mpsc::UnboundedReceiver<Message>) -> Engine {
        Engine {
            config,
            rx,
            pending: VecDeque::new(),
            in_flight: VecDeque::new(),
        }
    }

    pub async fn run(mut self) {
        let mut wait = false;
        loop {
            let conn = match self.await_connection(wait).await {
                Some(conn) => conn,
                None => return,
            };
            wait = true;
            match self.drive(conn).await {
                Exit::Reconnect => {}
                Exit::Shutdown => return,
            }
        }
    }

    /// Resolves and connects until a connection is established, queueing
    /// submissions in the meantime. Returns `None` on shutdown.
    async fn await_connection(&mut self, wait: bool) -> Option<Connection> {
        let connect = connect_loop(self.config.clone(), wait);
        tokio::pin!(connect);

        loop {
            tokio::select! {
                message = self.rx.recv() => match message {
                    Some(Message::Submit { encoded, reply }) => {
                        self.pending.push_back(Command::new(encoded, reply));
                    }
                    Some(Message::Shutdown { done }) => {
                        self.cancel_all();
                        let _ = done.send(());
                        return None;
                    }
                    // Every handle dropped: same as an explicit shutdown.
                    None => {
                        self.cancel_all();
                        return None;
                    }
                },
                conn = &mut connect => return Some(conn),
            }
        }
    }

    /// Steady state: batch pending commands into writes and match incoming
    /// values to the oldest in-flight command, until the connection dies or
    /// the client stops.
    async fn drive(&mut self, conn: Connection) -> Exit {
        let Connection {
            id,
            mut reader,
            writer,
        } = conn;
        let mut writer = Some(writer);
        let mut write_task: Option<WriteTask> = None;
        let mut authenticating = false;

        if let Some(auth) = self.config.password.as_deref().map(auth_request) {
            // The AUTH command takes the front of the in-flight queue, ahead
            // of anything pending, and its response is consumed by the engine
            // rather than by a caller.
            self.in_flight.push_front(Command::internal(auth.clone()));
            let idle = writer.take().expect("fresh connection has its writer");
            write_task = Some(tokio::spawn(idle.write_batch(vec![auth])));
            authenticating = true;
            debug!(connection_id = %id, "authenticating");
        }

        loop {
            if !authenticating && write_task.is_none() && !self.pending.is_empty() {
                if let Some(idle) = writer.take() {
                    let batch = self.next_batch();
                    write_task = Some(tokio::spawn(idle.write_batch(batch)));
                }
            }

            tokio::select! {
                message = self.rx.recv() => match message {
                    Some(Message::Submit { encoded, reply }) => {
                        self.pending.push_back(Command::new(encoded, reply));
                    }
                    Some(Message::Shutdown { done }) => {
                        abort_write(&mut write_task);
                        self.cancel_all();
                        let _ = done.send(());
                        return Exit::Shutdown;
                    }
                    None => {
                        abort_write(&mut write_task);
                        self.cancel_all();
                        return Exit::Shutdown;
                    }
                },
                value = reader.next() => match value {
                    Some(Ok(value)) => match self.dispatch_response(value) {
                        Dispatch::Completed => {}
                        Dispatch::Authenticated => {
                            info!(connection_id = %id, "authenticated");
                            authenticating = false;
                        }
                        Dispatch::Fatal => {
                            abort_write(&mut write_task);
                            self.requeue_in_flight();
                            return Exit::Reconnect;
                        }
                    },
                    Some(Err(err)) => {
                        error!(connection_id = %id, "dropping connection after protocol error: {}", err);
                        abort_write(&mut write_task);
                        self.requeue_in_flight();
                        return Exit::Reconnect;
                    }
                    None => {
                        warn!(connection_id = %id, "server closed the connection");
                        abort_write(&mut write_task);
                        self.requeue_in_flight();
                        return Exit::Reconnect;
                    }
                },
                result = async { write_task.as_mut().expect("write in flight").await }, if write_task.is_some() => {
                    write_task = None;
                    match result {
                        Ok((idle, Ok(()))) => writer = Some(idle),
                        Ok((_, Err(err))) => {
                            warn!(connection_id = %id, "write failed: {}", err);
                            self.requeue_in_flight();
                            return Exit::Reconnect;
                        }
                        Err(err) => {
                            error!(connection_id = %id, "write task failed: {}", err);
                            self.requeue_in_flight();
                            return Exit::Reconnect;
                        }
                    }
                },
            }
        }
    }

    /// Matches one parsed value to the oldest in-flight command. A value
    /// with nothing in flight means the stream is desynchronized and the
    /// connection can no longer be trusted.
    fn dispatch_response(&mut self, value: Value) -> Dispatch {
        let Some(command) = self.in_flight.pop_front() else {
            error!("received a response with no command in flight");
            return Dispatch::Fatal;
        };

        if command.is_internal() {
            if value.is_error() {
                error!(
                    "server rejected AUTH: {}",
                    String::from_utf8_lossy(value.as_error().unwrap_or_default())
                );
                return Dispatch::Fatal;
            }
            return Dispatch::Authenticated;
        }

        // A server-reported error is a normal completion; the caller
        // branches on the value's variant.
        command.complete(Ok(value));
        Dispatch::Completed
    }

    /// Moves commands from the pending queue to the in-flight queue in
    /// submission order and returns their encoded bytes. The drain stops
    /// once the batch reaches the configured soft cap, so a burst of large
    /// commands is split across writes instead of one unbounded send.
    fn next_batch(&mut self) -> Vec<Bytes> {
        let mut batch = Vec::new();
        let mut size = 0;
        while let Some(command) = self.pending.pop_front() {
            size += command.encoded.len();
            batch.push(command.encoded.clone());
            self.in_flight.push_back(command);
            if size >= self.config.write_batch_target {
                break;
            }
        }
        batch
    }

    /// Disconnect bookkeeping: every in-flight command either goes back to
    /// the front of the pending queue for another attempt or, once its retry
    /// budget is spent, fails permanently. Walking from the back keeps the
    /// oldest command first in line for the next connection.
    fn requeue_in_flight(&mut self) {
        while let Some(mut command) = self.in_flight.pop_back() {
            if command.is_internal() {
                continue;
            }
            command.fail_count += 1;
            if command.fail_count < self.config.command_retries {
                self.pending.push_front(command);
            } else {
                debug!("failing command after {} attempts", command.fail_count);
                command.complete(Err(Error::ConnectionLost));
            }
        }
    }

    fn cancel_all(&mut self) {
        for command in self.in_flight.drain(..) {
            command.complete(Err(Error::Stopped));
        }
        for command in self.pending.drain(..) {
            command.complete(Err(Error::Stopped));
        }
    }
}

/// Resolves the configured host and walks the candidate addresses in
/// resolver order until a connection is established, sleeping the fixed
/// reconnect interval between rounds. Never gives up on its own; shutdown
/// interrupts it from the caller's select.
async fn connect_loop(config: Config, mut wait: bool) -> Connection {
    loop {
        if wait {
            debug!("reconnecting in {:?}", config.reconnect_interval);
            time::sleep(config.reconnect_interval).await;
        }
        wait = true;

        let addrs = match lookup_host((config.host.as_str(), config.port)).await {
            Ok(addrs) => addrs.collect::<Vec<_>>(),
            Err(err) => {
                error!("failed to resolve {}: {}", config.host, err);
                continue;
            }
        };
        if addrs.is_empty() {
            error!("resolving {} returned no addresses", config.host);
            continue;
        }

        for addr in addrs {
            match Connection::connect(addr, config.connect_timeout).await {
                Ok(conn) => {
                    info!("connected to {}", addr);
                    return conn;
                }
                Err(err) => warn!("failed to connect to {}: {}", addr, err),
            }
        }
    }
}

fn auth_request(password: &str) -> Bytes {
    let command = Value::Array(vec![Value::from("AUTH"), Value::from(password)]);
    let mut encoded = Vec::new();
    codec::encode_request(&command, &mut encoded);
    Bytes::from(encoded)
}

fn abort_write(write_task: &mut Option<WriteTask>) {
    if let Some(task) = write_task.take() {
        task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(retries: usize, batch_target: usize) -> Engine {
        let (_, rx) = mpsc::unbounded_channel();
        let mut config = Config::new("127.0.0.1");
        config.command_retries = retries;
        config.write_batch_target = batch_target;
        Engine::new(config, rx)
    }

    fn command(payload: &str) -> (Command, oneshot::Receiver<crate::Result<Value>>) {
        let (reply, rx) = oneshot::channel();
        let command = Command::new(Bytes::copy_from_slice(payload.as_bytes()), reply);
        (command, rx)
    }

    #[test]
    fn next_batch_honors_the_soft_cap() {
        let mut engine = engine(3, 15);
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (command, rx) = command("0123456789");
            engine.pending.push_back(command);
            receivers.push(rx);
        }

        // Two ten-byte commands reach the fifteen-byte cap; the third waits
        // for the next batch.
        let first = engine.next_batch();
        assert_eq!(first.len(), 2);
        let second = engine.next_batch();
        assert_eq!(second.len(), 1);

        assert!(engine.pending.is_empty());
        assert_eq!(engine.in_flight.len(), 3);
    }

    #[test]
    fn requeue_preserves_submission_order() {
        let mut engine = engine(3, 1024);
        let mut receivers = Vec::new();
        for payload in ["a", "b", "c"] {
            let (command, rx) = command(payload);
            engine.in_flight.push_back(command);
            receivers.push(rx);
        }

        engine.requeue_in_flight();

        assert!(engine.in_flight.is_empty());
        let order: Vec<_> = engine
            .pending
            .iter()
            .map(|command| command.encoded.clone())
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn requeue_fails_commands_at_the_retry_limit() {
        let mut engine = engine(2, 1024);
        let (first, mut rx) = command("x");
        engine.in_flight.push_back(first);

        engine.requeue_in_flight();
        assert_eq!(engine.pending.len(), 1);
        assert!(rx.try_recv().is_err());

        let again = engine.pending.pop_front().unwrap();
        engine.in_flight.push_back(again);
        engine.requeue_in_flight();

        assert!(engine.pending.is_empty());
        assert_eq!(rx.try_recv().unwrap(), Err(Error::ConnectionLost));
    }

    #[test]
    fn requeue_drops_internal_commands() {
        let mut engine = engine(3, 1024);
        engine
            .in_flight
            .push_back(Command::internal(Bytes::from_static(b"auth")));

        engine.requeue_in_flight();

        assert!(engine.pending.is_empty());
        assert!(engine.in_flight.is_empty());
    }

    #[test]
    fn cancel_all_stops_every_command() {
        let mut engine = engine(3, 1024);
        let (queued, mut queued_rx) = command("a");
        let (sent, mut sent_rx) = command("b");
        engine.pending.push_back(queued);
        engine.in_flight.push_back(sent);

        engine.cancel_all();

        assert_eq!(queued_rx.try_recv().unwrap(), Err(Error::Stopped));
        assert_eq!(sent_rx.try_recv().unwrap(), Err(Error::Stopped));
    }

    #[test]
    fn dispatch_matches_the_oldest_in_flight_command() {
        let mut engine = engine(3, 1024);
        let (first, mut first_rx) = command("a");
        let (second, mut second_rx) = command("b");
        engine.in_flight.push_back(first);
        engine.in_flight.push_back(second);

        assert!(matches!(
            engine.dispatch_response(Value::Integer(1)),
            Dispatch::Completed
        ));
        assert!(matches!(
            engine.dispatch_response(Value::Integer(2)),
            Dispatch::Completed
        ));

        assert_eq!(first_rx.try_recv().unwrap(), Ok(Value::Integer(1)));
        assert_eq!(second_rx.try_recv().unwrap(), Ok(Value::Integer(2)));
    }

    #[test]
    fn dispatch_delivers_server_errors_as_completions() {
        let mut engine = engine(3, 1024);
        let (only, mut rx) = command("a");
        engine.in_flight.push_back(only);

        engine.dispatch_response(Value::error("ERR unknown command"));

        assert_eq!(
            rx.try_recv().unwrap(),
            Ok(Value::error("ERR unknown command"))
        );
    }

    #[test]
    fn dispatch_with_nothing_in_flight_is_fatal() {
        let mut engine = engine(3, 1024);
        assert!(matches!(
            engine.dispatch_response(Value::Null),
            Dispatch::Fatal
        ));
    }

    #[test]
    fn dispatch_handles_the_auth_handshake() {
        let mut engine = engine(3, 1024);

        engine
            .in_flight
            .push_front(Command::internal(auth_request("hunter2")));
        assert!(matches!(
            engine.dispatch_response(Value::from("OK")),
            Dispatch::Authenticated
        ));

        engine
            .in_flight
            .push_front(Command::internal(auth_request("hunter2")));
        assert!(matches!(
            engine.dispatch_response(Value::error("ERR invalid password")),
            Dispatch::Fatal
        ));
    }
}
