use std::time::Duration;

use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use tokio::sync::{broadcast, mpsc};

use tutor_core::types::AppEvent;

/// Events that drive the TUI loop.
pub enum TuiEvent {
    Key(KeyEvent),
    /// Result of a background probe or agent stream.
    App(AppEvent),
    /// Tick timer for the spinner.
    Tick,
}

/// Merged event loop: crossterm keys, app events, tick timer.
pub struct EventLoop {
    app_rx: broadcast::Receiver<AppEvent>,
    key_rx: mpsc::UnboundedReceiver<KeyEvent>,
    tick: tokio::time::Interval,
}

impl EventLoop {
    pub fn new(app_rx: broadcast::Receiver<AppEvent>) -> Self {
        let (key_tx, key_rx) = mpsc::unbounded_channel();

        // Single terminal reader for the session; exits when the loop is dropped.
        tokio::task::spawn_blocking(move || loop {
            if key_tx.is_closed() {
                break;
            }
            if !event::poll(Duration::from_millis(50)).unwrap_or(false) {
                continue;
            }
            match event::read() {
                Ok(CrosstermEvent::Key(key)) if key.kind == KeyEventKind::Press => {
                    if key_tx.send(key).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Terminal read failed");
                    break;
                }
            }
        });

        Self {
            app_rx,
            key_rx,
            tick: tokio::time::interval(Duration::from_millis(100)),
        }
    }

    /// Wait for the next event from any source.
    pub async fn next(&mut self) -> Option<TuiEvent> {
        tokio::select! {
            result = self.app_rx.recv() => match result {
                Ok(evt) => Some(TuiEvent::App(evt)),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "TUI event receiver lagged");
                    Some(TuiEvent::Tick)
                }
                Err(_) => None,
            },
            key = self.key_rx.recv() => key.map(TuiEvent::Key),
            _ = self.tick.tick() => Some(TuiEvent::Tick),
        }
    }
}
