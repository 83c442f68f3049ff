pub mod message_stream;

pub use message_stream::{Attachment, MessageRecord, MessageStream};
