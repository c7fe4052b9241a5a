//! The display surface the orchestrator reports to.
//!
//! One analysis produces a fixed sequence of events:
//!
//! ```text
//! on_processing_start
//!   ├─ on_success ─ render × N   (text extracted, response streamed)
//!   ├─ on_error                  (empty document, or any failure)
//!   └─ on_success ─ render × k ─ on_error   (stream broke off)
//! on_processing_end
//! ```
//!
//! `render` receives the fragment that was just appended and the whole
//! buffer so far, so an in-process surface may either repaint or append.
//! [`ChannelDisplay`] forwards the fragment only; receivers append.
//!
//! All methods default to no-ops; implement only what the surface shows.
//! Implementations must be `Send + Sync` because the web surface drives the
//! orchestrator from a spawned task.

use serde::Serialize;
use tokio::sync::mpsc;

/// Receives progress and output of one analysis.
pub trait AnalysisDisplay: Send + Sync {
    /// Conversion is about to start; show the spinner.
    fn on_processing_start(&self, filename: &str) {
        let _ = filename;
    }

    /// Success banner.
    fn on_success(&self, message: &str) {
        let _ = message;
    }

    /// Error banner.
    fn on_error(&self, message: &str) {
        let _ = message;
    }

    /// A fragment arrived.
    ///
    /// * `fragment`: the text just appended
    /// * `buffer`: everything received so far, `fragment` included
    fn render(&self, fragment: &str, buffer: &str) {
        let _ = (fragment, buffer);
    }

    /// The request is over; clear the spinner.
    fn on_processing_end(&self) {}
}

/// Discards everything.
pub struct NoopDisplay;

impl AnalysisDisplay for NoopDisplay {}

/// One display event, as sent over a [`ChannelDisplay`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DisplayEvent {
    Started { filename: String },
    Success { message: String },
    Error { message: String },
    Render { fragment: String },
    Finished,
}

/// Forwards every event over an unbounded channel.
///
/// Used where the orchestrator runs in a spawned task and the surface lives
/// elsewhere. Events sent after the receiver is gone are dropped.
#[derive(Debug, Clone)]
pub struct ChannelDisplay {
    tx: mpsc::UnboundedSender<DisplayEvent>,
}

impl ChannelDisplay {
    pub fn new(tx: mpsc::UnboundedSender<DisplayEvent>) -> Self {
        Self { tx }
    }

    /// A display and the receiving end of its events.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DisplayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// True once the receiver has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, event: DisplayEvent) {
        let _ = self.tx.send(event);
    }
}

impl AnalysisDisplay for ChannelDisplay {
    fn on_processing_start(&self, filename: &str) {
        self.send(DisplayEvent::Started {
            filename: filename.to_string(),
        });
    }

    fn on_success(&self, message: &str) {
        self.send(DisplayEvent::Success {
            message: message.to_string(),
        });
    }

    fn on_error(&self, message: &str) {
        self.send(DisplayEvent::Error {
            message: message.to_string(),
        });
    }

    fn render(&self, fragment: &str, _buffer: &str) {
        self.send(DisplayEvent::Render {
            fragment: fragment.to_string(),
        });
    }

    fn on_processing_end(&self) {
        self.send(DisplayEvent::Finished);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_display_accepts_everything() {
        let d = NoopDisplay;
        d.on_processing_start("a.pdf");
        d.on_success("ok");
        d.on_error("bad");
        d.render("x", "x");
        d.on_processing_end();
    }

    #[test]
    fn channel_display_forwards_in_order() {
        let (display, mut rx) = ChannelDisplay::channel();
        display.on_processing_start("invoice.pdf");
        display.on_success("done");
        display.render("ab", "ab");
        display.on_processing_end();

        assert_eq!(
            rx.try_recv().unwrap(),
            DisplayEvent::Started {
                filename: "invoice.pdf".into()
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            DisplayEvent::Success {
                message: "done".into()
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            DisplayEvent::Render {
                fragment: "ab".into()
            }
        );
        assert_eq!(rx.try_recv().unwrap(), DisplayEvent::Finished);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn channel_display_survives_dropped_receiver() {
        let (display, rx) = ChannelDisplay::channel();
        drop(rx);
        assert!(display.is_closed());
        display.on_error("nobody listening");
    }

    #[test]
    fn events_serialise_with_tag() {
        let json = serde_json::to_value(DisplayEvent::Error {
            message: "boom".into(),
        })
        .unwrap();
        assert_eq!(json["event"], "error");
        assert_eq!(json["message"], "boom");
    }

    #[test]
    fn render_event_carries_only_the_fragment() {
        let (display, mut rx) = ChannelDisplay::channel();
        display.render(" 42 |", "| Invoice # | 42 |");

        let json = serde_json::to_value(rx.try_recv().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "event": "render", "fragment": " 42 |" })
        );
    }
}
