use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::text::Span;
use ratatui::widgets::{Block, Borders};
use ratatui::Frame;

use super::*;

pub(super) fn draw(frame: &mut Frame, app: &App) {
    let area = frame.area();
    let palette = app.theme_palette();

    let prompt_width = UnicodeWidthStr::width("> ") as u16;
    let inner_width = area.width.saturating_sub(2);
    let max_input_height = area.height.saturating_sub(6).max(1);
    let input_height = app
        .input_height(inner_width, prompt_width)
        .saturating_add(2)
        .min(max_input_height);

    let docs_present = app
        .sessions
        .active()
        .is_some_and(|c| !c.attached_documents.is_empty());
    let notice_rows = if app.notices.is_empty() {
        0
    } else {
        app.notices.len() as u16 + 2
    };

    let mut constraints = vec![Constraint::Length(1), Constraint::Min(1)];
    if docs_present {
        constraints.push(Constraint::Length(1));
    }
    if notice_rows > 0 {
        constraints.push(Constraint::Length(notice_rows));
    }
    constraints.push(Constraint::Length(input_height));
    constraints.push(Constraint::Length(1));

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);
    let mut chunk_iter = chunks.iter().copied();

    if let Some(chunk) = chunk_iter.next() {
        draw_chat_bar(frame, app, chunk, palette);
    }
    if let Some(chunk) = chunk_iter.next() {
        draw_transcript(frame, app, chunk);
    }
    if docs_present {
        if let Some(chunk) = chunk_iter.next() {
            draw_docs_row(frame, app, chunk, palette);
        }
    }
    if notice_rows > 0 {
        if let Some(chunk) = chunk_iter.next() {
            draw_notices(frame, app, chunk, palette);
        }
    }
    if let Some(chunk) = chunk_iter.next() {
        draw_composer(frame, app, chunk, palette, prompt_width);
    }
    if let Some(chunk) = chunk_iter.next() {
        draw_status(frame, app, chunk, palette);
    }
}

fn draw_chat_bar(frame: &mut Frame, app: &App, area: Rect, palette: ThemePalette) {
    let mut spans = Vec::new();
    if !app.logged_in {
        spans.push(Span::styled(" termchat ".to_string(), palette.prompt_style()));
        spans.push(Span::styled("offline".to_string(), palette.muted_style()));
    } else if app.sessions.is_empty() {
        spans.push(Span::styled(
            " no chats — /new to start one".to_string(),
            palette.muted_style(),
        ));
    } else {
        for (idx, conversation) in app.sessions.conversations().iter().enumerate() {
            let active = app.sessions.active_id() == Some(conversation.id.as_str());
            let label = format!(" [{}] {} ", idx + 1, App::chat_label(conversation));
            let style = if active {
                palette.active_chat_style()
            } else {
                palette.muted_style()
            };
            spans.push(Span::styled(label, style));
            spans.push(Span::raw(" "));
        }
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_transcript(frame: &mut Frame, app: &App, area: Rect) {
    let paragraph = Paragraph::new(Text::from(app.cached_log_lines().to_vec()))
        .wrap(Wrap { trim: false })
        .scroll((app.scroll, 0));
    frame.render_widget(paragraph, area);
}

fn draw_docs_row(frame: &mut Frame, app: &App, area: Rect, palette: ThemePalette) {
    let Some(conversation) = app.sessions.active() else {
        return;
    };
    let names: Vec<&str> = conversation
        .attached_documents
        .iter()
        .map(String::as_str)
        .collect();
    let line = Line::from(vec![
        Span::styled(" docs: ".to_string(), palette.muted_style()),
        Span::styled(names.join(", "), palette.body_style()),
        Span::styled("  (/detach <name>)".to_string(), palette.muted_style()),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn draw_notices(frame: &mut Frame, app: &App, area: Rect, palette: ThemePalette) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(palette.panel_border_style())
        .title(Span::styled(" notices ".to_string(), palette.muted_style()));
    let lines: Vec<Line> = app
        .notices
        .iter()
        .map(|notice| {
            let style = if notice.starts_with("Error")
                || notice.contains("failed")
                || notice.contains("expired")
            {
                palette.error_style()
            } else {
                palette.notice_style()
            };
            Line::from(vec![Span::styled(notice.clone(), style)])
        })
        .collect();
    frame.render_widget(Paragraph::new(Text::from(lines)).block(block), area);
}

fn draw_composer(frame: &mut Frame, app: &App, area: Rect, palette: ThemePalette, prompt_width: u16) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(palette.panel_border_style());
    let inner = block.inner(area);

    match app.mode {
        Mode::Confirm => {
            let prompt = app
                .confirm
                .as_ref()
                .map(|c| c.prompt.clone())
                .unwrap_or_default();
            let line = Line::from(vec![
                Span::styled(prompt, palette.prompt_style()),
                Span::styled("  [y/n]".to_string(), palette.muted_style()),
            ]);
            frame.render_widget(Paragraph::new(line).block(block), area);
        }
        Mode::Normal => {
            let mut lines = Vec::new();
            for (i, part) in app.input.split('\n').enumerate() {
                let lead = if i == 0 {
                    Span::styled("> ".to_string(), palette.prompt_style())
                } else {
                    Span::raw("  ".to_string())
                };
                lines.push(Line::from(vec![
                    lead,
                    Span::styled(part.to_string(), palette.input_surface_style()),
                ]));
            }
            let offset = app.input_scroll_offset(inner.width, prompt_width, inner.height.max(1));
            let paragraph = Paragraph::new(Text::from(lines))
                .wrap(Wrap { trim: false })
                .scroll((offset, 0))
                .block(block);
            frame.render_widget(paragraph, area);

            let (cx, cy) = input_cursor_position(&app.input, app.cursor, inner.width, prompt_width);
            frame.set_cursor_position((
                inner.x.saturating_add(cx).min(inner.right().saturating_sub(1)),
                inner.y.saturating_add(cy.saturating_sub(offset)),
            ));
        }
    }
}

fn draw_status(frame: &mut Frame, app: &App, area: Rect, palette: ThemePalette) {
    let mut spans = Vec::new();
    let conn = if app.logged_in { "online" } else { "offline" };
    spans.push(Span::styled(format!(" {conn}"), palette.status_style()));
    if let Some(conversation) = app.sessions.active() {
        spans.push(Span::styled(" · ".to_string(), palette.muted_style()));
        spans.push(Span::styled(
            App::chat_label(conversation),
            palette.status_style(),
        ));
    }
    if app.reasoning_mode {
        spans.push(Span::styled(" · ".to_string(), palette.muted_style()));
        spans.push(Span::styled("reasoning".to_string(), palette.prompt_style()));
    }
    if app.is_waiting() {
        spans.push(Span::styled(" · ".to_string(), palette.muted_style()));
        spans.push(Span::styled(
            PENDING_FRAMES[app.spinner_idx % PENDING_FRAMES.len()].to_string(),
            palette.pending_style(),
        ));
    }
    spans.push(Span::styled(" · ".to_string(), palette.muted_style()));
    spans.push(Span::styled(app.last_status.clone(), palette.muted_style()));
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
