use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::time::Duration;

pub(crate) fn is_quit(k: &KeyEvent) -> bool {
    if k.kind != KeyEventKind::Press && k.kind != KeyEventKind::Repeat {
        return false;
    }
    match k.code {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => true,
        KeyCode::Char('c') | KeyCode::Char('C') => k.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

/// Drain pending terminal events, waiting at most `timeout` for the first.
pub(crate) fn quit_requested(timeout: Duration) -> anyhow::Result<bool> {
    let mut wait = timeout;
    let mut drained = 0;
    while event::poll(wait)? {
        if let Event::Key(k) = event::read()? {
            if is_quit(&k) {
                return Ok(true);
            }
        }
        wait = Duration::ZERO;
        drained += 1;
        if drained >= 32 {
            break;
        }
    }
    Ok(false)
}
