//! OpenWork Observers - consumers of the engine's outbound event queue
//!
//! Settlement requests return as soon as the money-safety work is done;
//! everything that merely reacts to a settlement runs here, off the
//! request path. The consumer drains the event channel one event at a
//! time, and a failing handler is logged and skipped - it can never fail
//! the request that produced the event, and it can never kill the
//! consumer.

mod consumer;
mod drain;
mod notify;
mod reputation;

pub use consumer::Observers;
pub use drain::DrainController;
pub use notify::{InAppNotifier, NotificationDispatcher, Notification, Notifier, WebhookNotifier};
pub use reputation::{ReputationUpdater, TrustClient, TrustEvent};
