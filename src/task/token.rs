//! Tokens and token sinks
//!
//! A [`Token`] announces that one output port of a context holds its data.
//! Tokens are handed to a [`TokenSink`]: a channel towards the scheduler in
//! production, [`CollectingSink`] or [`NoopSink`] in tests.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::context::ContextId;
use crate::data::Data;
use crate::port::OutputPort;

/// (output port, data) pair of one successful task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    context_id: ContextId,
    port: OutputPort,
    data: Data,
}

impl Token {
    pub(crate) fn new(context_id: ContextId, port: OutputPort, data: Data) -> Self {
        Self {
            context_id,
            port,
            data,
        }
    }

    /// Context that produced the data
    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    pub fn port(&self) -> &OutputPort {
        &self.port
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn into_data(self) -> Data {
        self.data
    }
}

/// Receiver of the tokens emitted by task runners
pub trait TokenSink: Send + Sync {
    fn send_token(&self, token: Token);
}

/// Forward tokens to the scheduler's channel
impl TokenSink for UnboundedSender<Token> {
    fn send_token(&self, token: Token) {
        if let Err(err) = self.send(token) {
            let token = err.0;
            warn!(
                context_id = %token.context_id,
                port = token.port.name(),
                "token receiver dropped, token lost"
            );
        }
    }
}

/// Sink dropping every token
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl TokenSink for NoopSink {
    fn send_token(&self, _token: Token) {}
}

/// Sink keeping every token in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    tokens: Mutex<Vec<Token>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokens received so far, in arrival order
    pub fn tokens(&self) -> Vec<Token> {
        self.tokens.lock().clone()
    }

    /// Remove and return every token received so far
    pub fn take(&self) -> Vec<Token> {
        std::mem::take(&mut *self.tokens.lock())
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.lock().is_empty()
    }
}

impl TokenSink for CollectingSink {
    fn send_token(&self, token: Token) {
        self.tokens.lock().push(token);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::format::{formats, DataFormatRegistry};
    use crate::port::OutputPorts;

    fn token() -> Token {
        let fastq = DataFormatRegistry::builtin()
            .lookup(formats::READS_FASTQ)
            .unwrap();
        let mut builder = OutputPorts::builder();
        builder.add_port("output", Arc::clone(&fastq)).unwrap();
        let port = builder.build().get("output").unwrap().clone();
        let data = Data::named("s1", fastq).unwrap();
        let id: ContextId = serde_json::from_str("7").unwrap();
        Token::new(id, port, data)
    }

    #[test]
    fn sink_trait_is_object_safe() {
        fn accepts(_: &dyn TokenSink) {}
        accepts(&NoopSink);
        accepts(&CollectingSink::new());
    }

    #[test]
    fn collecting_sink_keeps_order() {
        let sink = CollectingSink::new();
        sink.send_token(token());
        sink.send_token(token());
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.tokens()[0].data().name(), "s1");
        assert_eq!(sink.take().len(), 2);
        assert!(sink.is_empty());
    }

    #[test]
    fn channel_sink_forwards() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tx.send_token(token());
        let received = rx.try_recv().unwrap();
        assert_eq!(received.port().name(), "output");
        assert_eq!(received.context_id().get(), 7);

        drop(rx);
        // receiver gone: logged, not fatal
        tx.send_token(token());
    }
}
