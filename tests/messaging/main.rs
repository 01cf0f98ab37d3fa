//! Outbox/inbox integration tests.

mod outbox;
mod end_to_end;
mod lifecycle;
