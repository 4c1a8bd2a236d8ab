use std::io::Stdout;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyEventKind, MouseEventKind};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use super::*;

pub(crate) fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    config: Config,
    gateway: Arc<dyn Gateway>,
    credentials: Arc<dyn CredentialStore>,
) -> Result<()> {
    const ACTIVE_POLL_MS: u64 = 33;
    const IDLE_POLL_MS: u64 = 100;
    const SPINNER_TICK_MS: u64 = 120;
    const MAX_EVENTS_PER_FRAME: u16 = 64;

    let mut app = App::new(config, gateway, credentials);
    let mut last_spinner_tick = Instant::now();
    let mut needs_draw = true;

    loop {
        let mut state_changed = false;
        if app.poll_worker() {
            state_changed = true;
        }
        if app.is_waiting()
            && last_spinner_tick.elapsed() >= Duration::from_millis(SPINNER_TICK_MS)
        {
            // The pending dots live inside the cached transcript.
            app.spinner_idx = (app.spinner_idx + 1) % PENDING_FRAMES.len();
            app.invalidate_render_cache();
            last_spinner_tick = Instant::now();
            state_changed = true;
        }
        if app.expire_copy_feedback() {
            state_changed = true;
        }
        if state_changed {
            needs_draw = true;
        }

        if needs_draw {
            if let Ok(area) = terminal.size() {
                app.update_viewport(area.width, area.height);
            }
            app.ensure_render_cache();
            terminal.draw(|f| ui::draw(f, &app))?;
            needs_draw = false;
        }

        if app.should_quit {
            break;
        }

        let timeout = if app.is_waiting() {
            Duration::from_millis(ACTIVE_POLL_MS)
        } else {
            Duration::from_millis(IDLE_POLL_MS)
        };
        if !event::poll(timeout).context("event poll")? {
            continue;
        }

        let mut wheel_delta: i32 = 0;
        let mut drained_events: u16 = 0;
        let mut input_changed = false;

        loop {
            match event::read().context("event read")? {
                Event::Key(key) => {
                    if !matches!(key.kind, KeyEventKind::Release) {
                        app.handle_key_event(key);
                        input_changed = true;
                    }
                }
                Event::Mouse(mouse) => match mouse.kind {
                    MouseEventKind::ScrollUp => wheel_delta -= 1,
                    MouseEventKind::ScrollDown => wheel_delta += 1,
                    _ => {}
                },
                Event::Paste(text) => {
                    app.handle_paste_event(&text);
                    input_changed = true;
                }
                Event::Resize(_, _) => {
                    input_changed = true;
                }
                _ => {}
            }

            drained_events = drained_events.saturating_add(1);
            if drained_events >= MAX_EVENTS_PER_FRAME {
                break;
            }
            if !event::poll(Duration::from_millis(0)).context("event poll drain")? {
                break;
            }
        }

        if wheel_delta < 0 {
            app.scroll_up(wheel_delta.unsigned_abs().min(64) as u16);
            input_changed = true;
        } else if wheel_delta > 0 {
            app.scroll_down((wheel_delta as u32).min(64) as u16);
            input_changed = true;
        }

        if input_changed {
            needs_draw = true;
        }
    }

    app.persist_ui_state();
    Ok(())
}

#[cfg(test)]
pub(super) fn flatten_lines_to_plain(lines: &[Line<'static>]) -> Vec<String> {
    lines.iter().map(flatten_line_to_plain).collect()
}

#[cfg(test)]
pub(super) fn flatten_line_to_plain(line: &Line<'static>) -> String {
    let mut out = String::new();
    for span in &line.spans {
        out.push_str(span.content.as_ref());
    }
    out
}
