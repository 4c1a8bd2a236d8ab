use std::fs::File;
use std::io::Stdout;
use std::sync::Arc;

use anyhow::{Context, Result};
use crossterm::event::{
    DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture,
    KeyboardEnhancementFlags, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement, EnterAlternateScreen,
    LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use unicode_width::UnicodeWidthChar;

mod app;
mod config;
mod gateway;

use config::{Config, FileCredentialStore};
use gateway::HttpGateway;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "--version" | "-v" => {
                println!("termchat {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            unknown => {
                eprintln!("unknown argument: {}", unknown);
                std::process::exit(2);
            }
        }
    }

    let config = Config::from_env();
    init_logging(&config);

    let credentials = Arc::new(FileCredentialStore::new(config.token_path()));
    let gateway =
        Arc::new(HttpGateway::new(&config, credentials.clone()).context("build http client")?);

    let mut terminal = setup_terminal()?;
    let result = app::run_app(&mut terminal, config, gateway, credentials);
    restore_terminal(&mut terminal)?;
    result
}

/// Logging goes to a file under the state dir, and only when TERMCHAT_LOG
/// asks for it. Writing to stderr would corrupt the raw-mode screen.
fn init_logging(config: &Config) {
    let Ok(filter) = std::env::var("TERMCHAT_LOG") else {
        return;
    };
    if filter.trim().is_empty() {
        return;
    }
    if config::ensure_state_dir(&config.state_dir).is_err() {
        return;
    }
    let Ok(file) = File::create(config.log_path()) else {
        return;
    };
    env_logger::Builder::new()
        .parse_filters(&filter)
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("enable raw mode")?;
    crossterm::execute!(std::io::stdout(), EnterAlternateScreen, EnableMouseCapture)
        .context("enter alternate screen")?;
    if matches!(supports_keyboard_enhancement(), Ok(true)) {
        crossterm::execute!(
            std::io::stdout(),
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
        )
        .ok();
    }
    crossterm::execute!(std::io::stdout(), EnableBracketedPaste).ok();

    let terminal =
        Terminal::new(CrosstermBackend::new(std::io::stdout())).context("create terminal")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    crossterm::execute!(std::io::stdout(), DisableBracketedPaste).ok();
    crossterm::execute!(std::io::stdout(), PopKeyboardEnhancementFlags).ok();
    crossterm::execute!(std::io::stdout(), DisableMouseCapture, LeaveAlternateScreen)
        .context("leave alternate screen")?;
    disable_raw_mode().context("disable raw mode")?;
    terminal.show_cursor().context("show cursor")?;
    Ok(())
}

/// Caps `s` at `n` characters, ellipsis included.
pub(crate) fn truncate(s: &str, n: usize) -> String {
    if s.chars().count() <= n {
        return s.to_string();
    }
    let prefix: String = s.chars().take(n.saturating_sub(3)).collect();
    format!("{prefix}...")
}

pub(crate) fn input_cursor_position(
    input: &str,
    cursor: usize,
    width: u16,
    prompt_width: u16,
) -> (u16, u16) {
    let width = width.max(1) as usize;
    let mut x = prompt_width as usize;
    let mut y = 0usize;
    let mut consumed = 0usize;

    for ch in input.chars() {
        let len = ch.len_utf8();
        if consumed + len > cursor {
            break;
        }
        consumed += len;
        if ch == '\n' {
            x = prompt_width as usize;
            y += 1;
            continue;
        }
        let ch_width = UnicodeWidthChar::width(ch).unwrap_or(1).max(1);
        if x + ch_width > width {
            x = 0;
            y += 1;
        }
        x += ch_width;
        if x >= width {
            x = 0;
            y += 1;
        }
    }

    (x as u16, y as u16)
}
