pub mod event_relay;
pub mod format;
pub mod handle;
pub mod handlers;

pub use event_relay::EventRelay;
pub use handle::{register, RelayHandle};
pub use handlers::{Category, EventKind, EventRef, Handler};
