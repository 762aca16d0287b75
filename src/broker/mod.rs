//! Redis message fabric.
//!
//! The broker provides the two primitives every component is built on:
//! list queues with atomic push/pop (work queue, trade queue) and
//! pub/sub channels (reply channels, market-data streams). Components
//! receive an explicit [`RedisClient`] handle at construction; there are
//! no process-global clients.

pub mod channels;
pub mod redis_client;

pub use redis_client::{RedisClient, RedisConfig};
