mod cache;
mod queue;
mod serializer;
mod shutdown;

pub use cache::MemCache;
pub use queue::{BroadcastQueue, Queue};
pub use serializer::{JsonSerializer, Serializer, SerializerExt};
pub use shutdown::Shutdown;
