use crate::pipeline::StopHandle;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::time::Duration;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Keyboard input handler that turns `q` or `Esc` into a session stop request
pub struct KeyboardInputHandler {
    session_stop: StopHandle,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    pub fn new(session_stop: StopHandle) -> Self {
        Self {
            session_stop,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start listening for keyboard input
    pub fn start(&self) {
        info!("Starting keyboard input handler - press q or Esc to stop counting");

        let session_stop = self.session_stop.clone();
        let cancellation_token = self.cancellation_token.clone();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            debug!("Raw mode enabled - keyboard handler active");

            while !cancellation_token.is_cancelled() {
                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }
                        match key_event.code {
                            KeyCode::Char('q') | KeyCode::Esc => {
                                info!("Quit key pressed - stopping session");
                                session_stop.request_stop();
                                break;
                            }
                            other => debug!("Key pressed: {:?}", other),
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            } else {
                debug!("Raw mode disabled");
            }
        });
    }

    /// Stop the keyboard input handler
    pub async fn stop(&self) {
        debug!("Stopping keyboard input handler");
        self.cancellation_token.cancel();

        // Give the polling task a moment to restore the terminal
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyboard_handler_creation() {
        let handler = KeyboardInputHandler::new(StopHandle::new());
        assert!(!handler.cancellation_token.is_cancelled());
        assert!(!handler.session_stop.is_stop_requested());
    }

    #[tokio::test]
    async fn test_keyboard_handler_stop_leaves_session_alone() {
        let stop = StopHandle::new();
        let handler = KeyboardInputHandler::new(stop.clone());

        handler.stop().await;
        assert!(handler.cancellation_token.is_cancelled());
        assert!(!stop.is_stop_requested());
    }
}
