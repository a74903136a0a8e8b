use bytes::Bytes;
use tokio::sync::oneshot;

use crate::value::Value;

/// A queued command: the pre-encoded request bytes, a single-shot
/// completion and a count of failed delivery attempts.
pub(crate) struct Command {
    pub encoded: Bytes,
    completion: Completion,
    pub fail_count: usize,
}

enum Completion {
    /// Resolves a caller's `submit` future.
    Reply(oneshot::Sender<crate::Result<Value>>),
    /// Synthesized by the engine (AUTH). Never surfaced to callers and never
    /// requeued across reconnects.
    Internal,
}

impl Command {
    pub fn new(encoded: Bytes, reply: oneshot::Sender<crate::Result<Value>>) -> Command {
        Command {
            encoded,
            completion: Completion::Reply(reply),
            fail_count: 0,
        }
    }

    pub fn internal(encoded: Bytes) -> Command {
        Command {
            encoded,
            completion: Completion::Internal,
            fail_count: 0,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self.completion, Completion::Internal)
    }

    /// Consumes the command, so the completion can fire at most once. A
    /// caller that dropped its receiver is ignored.
    pub fn complete(self, result: crate::Result<Value>) {
        if let Completion::Reply(reply) = self.completion {
            let _ = reply.send(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_resolves_the_caller() {
        let (tx, mut rx) = oneshot::channel();
        let command = Command::new(Bytes::from_static(b"x"), tx);

        command.complete(Ok(Value::Integer(1)));

        assert_eq!(rx.try_recv().unwrap(), Ok(Value::Integer(1)));
    }

    #[test]
    fn complete_ignores_a_dropped_receiver() {
        let (tx, rx) = oneshot::channel();
        let command = Command::new(Bytes::from_static(b"x"), tx);
        drop(rx);

        command.complete(Ok(Value::Null));
    }

    #[test]
    fn internal_commands_have_no_caller() {
        let command = Command::internal(Bytes::from_static(b"auth"));
        assert!(command.is_internal());
        command.complete(Ok(Value::Null));
    }
}
