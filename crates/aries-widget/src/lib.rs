//! Conversation widget for the AriesBerries chat gate.
//!
//! The controller is I/O free so any host can drive it:
//!
//! - [`status`]: the request lifecycle state machine.
//! - [`guard`]: checks run before a submission leaves the widget.
//! - [`panel`]: open/closed state and keyboard shortcuts.
//! - [`toast`]: self-dismissing notifications.
//! - [`widget`]: [`ChatWidget`], tying the above to a transcript.
//! - [`client`]: [`GateClient`], which talks to the gate over HTTP.

pub mod client;
pub mod error;
pub mod guard;
pub mod panel;
pub mod status;
pub mod toast;
pub mod widget;

pub use client::{GateClient, Generation};
pub use error::WidgetError;
pub use guard::{CharCounter, GuardRejection, SubmitGuard};
pub use panel::{Key, KeyPress, Panel, PanelEffect};
pub use status::{ChatEvent, ChatStatus, Step, TransitionError};
pub use toast::{Toast, ToastKind, ToastQueue};
pub use widget::{ChatWidget, ClearRequest, TranscriptEntry, WidgetEffect};
