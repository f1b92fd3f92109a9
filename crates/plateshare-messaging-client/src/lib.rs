//! Client-side orchestration over the Plateshare messaging core:
//! [`ChatSession`] binds one open chat to one counterpart (history
//! load, realtime merge with dedupe, send guard, reconnect
//! reconciliation), and [`ConversationList`] keeps a viewer's summary
//! list fresh from push signals.
//!
//! Everything here follows the app's single-threaded cooperative
//! model: no background threads, state only changes inside explicit
//! `pump()` calls driven by the UI loop.

mod conversation_list;
mod session;

pub use conversation_list::ConversationList;
pub use session::{ChatSession, SessionPhase};
