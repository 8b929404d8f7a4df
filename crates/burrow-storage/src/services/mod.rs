//! Per-payload-class storage services.
//!
//! Each service owns one content store bound to one persistence slot and
//! enforces the replay/ordering rules for its class. Validation and mutation
//! run atomically under the store's write lock; persistence writes and
//! listener fan-out happen after the lock is released.

mod append_only;
mod authenticated;
mod mailbox;

pub use append_only::{AppendOnlyStorageService, AppendOnlyStoreListener};
pub use authenticated::{AuthenticatedStorageService, AuthenticatedStoreListener};
pub use mailbox::{MailboxStorageService, MailboxStoreListener};
