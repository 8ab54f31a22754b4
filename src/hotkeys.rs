use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode};
use crossterm::terminal;
use tokio_util::sync::CancellationToken;

use crate::events::EventBus;
use crate::matcher::UrlMatcher;
use crate::plugin::PluginContext;
use crate::state::ProxyState;

/// Reads single keystrokes from the terminal without waiting for Enter,
/// implementing the interactive controls named in `spec.md` §4.5/§9:
/// `r` toggles recording, `s` stops recording and raises
/// `recording-stopped` with the drained entries, `c` clears the
/// console, `w` raises `mock-request`, and Esc/Ctrl-C requests
/// shutdown. Polling happens on a blocking thread since `crossterm`'s
/// raw-mode key reads are synchronous; state changes are applied
/// through `ProxyState`, which is already safe to share across threads.
pub async fn run(
    state: Arc<ProxyState>,
    urls: Arc<UrlMatcher>,
    events: Arc<EventBus>,
    cancellation: CancellationToken,
) {
    let Ok(_raw_guard) = RawModeGuard::enable() else {
        log::debug!("not an interactive terminal, hotkeys disabled");
        return;
    };
    let ctx = PluginContext { urls, state: state.clone() };

    loop {
        if cancellation.is_cancelled() {
            break;
        }
        let polled = tokio::task::spawn_blocking(|| event::poll(Duration::from_millis(200)))
            .await
            .unwrap_or(Ok(false));
        match polled {
            Ok(true) => {
                let read = tokio::task::spawn_blocking(event::read).await;
                if let Ok(Ok(Event::Key(key))) = read {
                    handle_key(&state, &ctx, &events, key.code, &cancellation).await;
                }
            }
            Ok(false) => {}
            Err(err) => {
                log::warn!("hotkey polling failed: {err}");
                break;
            }
        }
    }
}

async fn handle_key(
    state: &Arc<ProxyState>,
    ctx: &PluginContext,
    events: &Arc<EventBus>,
    key: KeyCode,
    cancellation: &CancellationToken,
) {
    match key {
        KeyCode::Char('r') => {
            state.recording.start();
            println!("recording started");
        }
        KeyCode::Char('s') => {
            let entries = state.recording.stop();
            println!("recording stopped, {} entries captured", entries.len());
            events.recording_stopped(ctx, &entries).await;
        }
        KeyCode::Char('c') => {
            print!("\x1B[2J\x1B[1;1H");
        }
        KeyCode::Char('w') => {
            events.mock_request(ctx).await;
            println!("mock-request raised");
        }
        KeyCode::Esc => {
            cancellation.cancel();
        }
        _ => {}
    }
}

struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> std::io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}
