//! Text processors: fallbacks that may claim a message the native commands did not handle.
//!
//! Each room has one privileged [`PriorityProcessor`] consulted first; after it the shared
//! [`ProcessorChain`] runs in registration order and stops at the first claim.

mod learned;
mod priority;

pub use learned::LearnedCommandProcessor;
pub use priority::PriorityProcessor;

use crate::actions::ResolvedAction;
use crate::channels::InboundMessage;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait Processor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// `Some(action)` claims the message; `None` passes it on.
    async fn try_process(&self, message: &InboundMessage) -> anyhow::Result<Option<ResolvedAction>>;
}

/// Ordered fallback processors.
#[derive(Default)]
pub struct ProcessorChain {
    processors: Vec<Arc<dyn Processor>>,
}

impl ProcessorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a processor; it runs after every processor registered before it.
    pub fn register(&mut self, processor: Arc<dyn Processor>) {
        log::debug!("registered processor {}", processor.name());
        self.processors.push(processor);
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// First claim wins; later processors are not invoked. Returns the claimer's name and action.
    pub async fn claim(
        &self,
        message: &InboundMessage,
    ) -> anyhow::Result<Option<(String, ResolvedAction)>> {
        for p in &self.processors {
            if let Some(action) = p.try_process(message).await? {
                return Ok(Some((p.name().to_string(), action)));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        name: &'static str,
        claims: bool,
        calls: AtomicUsize,
    }

    impl Counting {
        fn new(name: &'static str, claims: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                claims,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Processor for Counting {
        fn name(&self) -> &str {
            self.name
        }

        async fn try_process(
            &self,
            message: &InboundMessage,
        ) -> anyhow::Result<Option<ResolvedAction>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .claims
                .then(|| ResolvedAction::reply_to(message, self.name)))
        }
    }

    #[tokio::test]
    async fn chain_short_circuits_on_first_claim() {
        let first = Counting::new("first", false);
        let second = Counting::new("second", true);
        let third = Counting::new("third", true);
        let mut chain = ProcessorChain::new();
        chain.register(first.clone());
        chain.register(second.clone());
        chain.register(third.clone());

        let msg = InboundMessage::stack("1", "u", "alice", "good morning", 3);
        let (name, action) = chain.claim(&msg).await.unwrap().unwrap();
        assert_eq!(name, "second");
        assert_eq!(action, ResolvedAction::reply_to(&msg, "second"));
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
        assert_eq!(third.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_chain_claims_nothing() {
        let chain = ProcessorChain::new();
        let msg = InboundMessage::stack("1", "u", "alice", "hi", 3);
        assert!(chain.claim(&msg).await.unwrap().is_none());
    }
}
