mod record;
mod status;

pub use record::MessageRecord;
pub use status::{InvalidStatus, Mailbox, MessageStatus};
