pub mod channel;
pub mod pipeline;
pub mod queue;
pub mod source;
pub mod staging;
pub mod storage;
