//! Message plumbing: the retry engine, the in-process transport and the
//! observer channel.

mod channel;
mod processor;
mod queue;
mod sender;

pub use channel::{Channel, ChannelEvent, ChannelOptions};
pub use processor::{Attempt, HandlerVerdict, MessageHandler, MessageProcessor, ProcessOutcome};
pub use queue::MessageQueue;
pub use sender::MessageSender;
