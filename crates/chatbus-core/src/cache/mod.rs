//! In-process mirrors of the persisted entities.
//!
//! Every component owns its lock(s).  No method holds one component's lock
//! while acquiring another's, and none of them performs I/O.

pub mod contacts;
pub mod mailbox;
pub mod sessions;
pub mod users;

pub use contacts::ContactGraph;
pub use mailbox::{Delivery, Mailbox, MailboxStore};
pub use sessions::SessionRegistry;
pub use users::UserDirectory;
