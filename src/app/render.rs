use ratatui::style::{Modifier, Style};
use ratatui::text::Span;
use unicode_width::UnicodeWidthChar;

use super::*;

fn truncate_display_width(text: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut used = 0usize;
    for ch in text.chars() {
        let cw = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + cw > max_width {
            break;
        }
        out.push(ch);
        used += cw;
    }
    out
}

fn fit_to_display_width(text: &str, width: usize) -> String {
    let mut fitted = truncate_display_width(text, width);
    let used = UnicodeWidthStr::width(fitted.as_str());
    if used < width {
        fitted.push_str(&" ".repeat(width - used));
    }
    fitted
}

/// Canonical language tag for a fence label. Aliases collapse to one tag
/// so snippet headers stay consistent with what the backend emits.
pub(super) fn normalize_language(raw: &str) -> String {
    let lowered = raw.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "" => "plaintext".to_string(),
        "html" | "markup" => "markup".to_string(),
        "js" => "javascript".to_string(),
        "py" => "python".to_string(),
        _ => lowered,
    }
}

/// Narrow escape hatch for backend-emitted embeds: only a reply that is a
/// single iframe fragment qualifies. Everything else goes through the
/// markdown path as text.
pub(super) fn is_embedded_fragment(content: &str) -> bool {
    let trimmed = content.trim();
    trimmed.starts_with("<iframe") && trimmed.ends_with('>')
}

fn push_user_lines(
    lines: &mut Vec<Line<'static>>,
    text: &str,
    width: u16,
    palette: ThemePalette,
) {
    let w = width as usize;
    let user_style = palette.user_style();
    for part in text.split('\n') {
        let content = if part.is_empty() { " " } else { part };
        let mut row = format!(" {} ", content);
        if w > 0 {
            let row_w = UnicodeWidthStr::width(row.as_str());
            if row_w < w {
                row.push_str(&" ".repeat(w - row_w));
            }
        }
        lines.push(Line::from(vec![Span::styled(row, user_style)]));
    }
}

fn embed_card_outer_width(viewport_width: u16) -> usize {
    let max_outer = viewport_width.max(1) as usize;
    if max_outer >= 26 {
        max_outer.min(76)
    } else {
        max_outer
    }
}

/// Bordered card holding the raw fragment verbatim.
fn push_embed_lines(
    lines: &mut Vec<Line<'static>>,
    fragment: &str,
    width: u16,
    palette: ThemePalette,
) {
    let border_style = palette.snippet_frame_style();
    let outer = embed_card_outer_width(width);
    if outer < 6 {
        lines.push(Line::from(vec![Span::styled(
            fragment.to_string(),
            palette.muted_style(),
        )]));
        return;
    }
    let inner = outer.saturating_sub(2);
    let content_width = inner.saturating_sub(2);
    lines.push(Line::from(vec![
        Span::styled("┌─ ".to_string(), border_style),
        Span::styled("embed".to_string(), palette.muted_style()),
        Span::styled(" ".to_string(), border_style),
        Span::styled("─".repeat(inner.saturating_sub(8)), border_style),
        Span::styled("┐".to_string(), border_style),
    ]));
    for part in fragment.split('\n') {
        for chunk in wrap_plain(part, content_width) {
            let content = fit_to_display_width(&chunk, content_width);
            lines.push(Line::from(vec![
                Span::styled("│ ".to_string(), border_style),
                Span::styled(content, palette.muted_style()),
                Span::styled(" │".to_string(), border_style),
            ]));
        }
    }
    lines.push(Line::from(vec![
        Span::styled("└".to_string(), border_style),
        Span::styled("─".repeat(inner), border_style),
        Span::styled("┘".to_string(), border_style),
    ]));
}

fn wrap_plain(text: &str, width: usize) -> Vec<String> {
    if width == 0 || UnicodeWidthStr::width(text) <= width {
        return vec![text.to_string()];
    }
    let mut out = Vec::new();
    let mut current = String::new();
    let mut used = 0usize;
    for ch in text.chars() {
        let cw = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + cw > width && !current.is_empty() {
            out.push(std::mem::take(&mut current));
            used = 0;
        }
        current.push(ch);
        used += cw;
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

impl App {
    /// Pure view of the active conversation: styled lines plus the code
    /// snippets they contain, in display order.
    pub(super) fn render_transcript(&self, width: u16) -> (Vec<Line<'static>>, Vec<Snippet>) {
        let palette = self.theme_palette();
        let mut lines = Vec::<Line>::new();
        let mut snippets = Vec::<Snippet>::new();

        if !self.logged_in {
            lines.push(Line::from(vec![Span::styled(
                format!("termchat {}", env!("CARGO_PKG_VERSION")),
                palette.heading_style(),
            )]));
            lines.push(Line::from(""));
            lines.push(Line::from(vec![Span::styled(
                "not logged in — /login <user> <pass> to connect".to_string(),
                palette.muted_style(),
            )]));
            return (lines, snippets);
        }

        let Some(conversation) = self.sessions.active() else {
            lines.push(Line::from(vec![Span::styled(
                "no chat selected — /new to start one".to_string(),
                palette.muted_style(),
            )]));
            return (lines, snippets);
        };

        let copied = if self.copied_at.is_some() {
            self.copied_snippet
        } else {
            None
        };

        for (idx, message) in conversation.messages.iter().enumerate() {
            match message.role {
                Role::User => push_user_lines(&mut lines, &message.content, width, palette),
                Role::Assistant if message.pending => {
                    let frame = PENDING_FRAMES[self.spinner_idx % PENDING_FRAMES.len()];
                    lines.push(Line::from(vec![Span::styled(
                        frame.to_string(),
                        palette.pending_style(),
                    )]));
                }
                Role::Assistant => {
                    if let Some(reasoning) = &message.reasoning {
                        let key = (conversation.id.clone(), idx);
                        let expanded = self.expanded_reasoning.contains(&key);
                        let toggle = if expanded {
                            "▾ hide reasoning"
                        } else {
                            "▸ show reasoning"
                        };
                        lines.push(Line::from(vec![Span::styled(
                            toggle.to_string(),
                            palette.reasoning_toggle_style(),
                        )]));
                        if expanded {
                            push_reasoning_lines(&mut lines, reasoning, width, palette);
                        }
                    }
                    // A blank answer still shows its reasoning section above.
                    if message.content.trim().is_empty() {
                        if message.reasoning.is_none() {
                            log::warn!("skipping assistant message without content");
                            continue;
                        }
                    } else if is_embedded_fragment(&message.content) {
                        push_embed_lines(&mut lines, message.content.trim(), width, palette);
                    } else {
                        let md_lines = render_markdown(
                            &message.content,
                            palette.body_style(),
                            palette,
                            &mut snippets,
                            copied,
                        );
                        for md_line in md_lines {
                            for w_line in wrap_spans(md_line, width.max(1) as usize) {
                                lines.push(Line::from(w_line));
                            }
                        }
                    }
                }
            }
            lines.push(Line::from(""));
        }

        (lines, snippets)
    }
}

fn push_reasoning_lines(
    lines: &mut Vec<Line<'static>>,
    reasoning: &str,
    width: u16,
    palette: ThemePalette,
) {
    let style = palette.reasoning_style();
    let content_width = (width.max(1) as usize).saturating_sub(2);
    for part in reasoning.trim().split('\n') {
        let content = if part.is_empty() { " " } else { part };
        for chunk in wrap_plain(content, content_width.max(1)) {
            lines.push(Line::from(vec![
                Span::raw("  "),
                Span::styled(chunk, style),
            ]));
        }
    }
}

/// Pre-wrap a list of spans so that each resulting line fits within
/// `max_width` display columns.
fn wrap_spans(spans: Vec<Span<'static>>, max_width: usize) -> Vec<Vec<Span<'static>>> {
    if max_width == 0 {
        return vec![spans];
    }
    let mut result: Vec<Vec<Span<'static>>> = Vec::new();
    let mut current_line: Vec<Span<'static>> = Vec::new();
    let mut current_width: usize = 0;

    for span in spans {
        let span_width = UnicodeWidthStr::width(span.content.as_ref());
        if current_width + span_width <= max_width {
            current_width += span_width;
            current_line.push(span);
        } else {
            let style = span.style;
            let text = span.content.into_owned();
            let mut remaining = text.as_str();
            while !remaining.is_empty() {
                let avail = max_width.saturating_sub(current_width);
                if avail == 0 {
                    if !current_line.is_empty() {
                        result.push(std::mem::take(&mut current_line));
                    }
                    current_width = 0;
                    continue;
                }
                // Fit as many chars as possible within avail columns.
                let mut split_byte = 0;
                let mut cols = 0usize;
                for (byte_idx, ch) in remaining.char_indices() {
                    let w = UnicodeWidthChar::width(ch).unwrap_or(0);
                    if cols + w > avail {
                        break;
                    }
                    cols += w;
                    split_byte = byte_idx + ch.len_utf8();
                }
                if split_byte == 0 && current_line.is_empty() {
                    // Single char wider than avail; force one char to avoid
                    // an infinite loop.
                    let ch = remaining.chars().next().unwrap();
                    split_byte = ch.len_utf8();
                    cols = UnicodeWidthChar::width(ch).unwrap_or(1);
                }
                if split_byte == 0 {
                    result.push(std::mem::take(&mut current_line));
                    current_width = 0;
                    continue;
                }
                let chunk = &remaining[..split_byte];
                current_line.push(Span::styled(chunk.to_string(), style));
                current_width += cols;
                remaining = &remaining[split_byte..];
                if !remaining.is_empty() {
                    result.push(std::mem::take(&mut current_line));
                    current_width = 0;
                }
            }
        }
    }
    if !current_line.is_empty() {
        result.push(current_line);
    }
    if result.is_empty() {
        result.push(Vec::new());
    }
    result
}

/// Render markdown text into styled spans per line.
/// Supports: headings (#), bold (**), italic (*), inline code (`),
/// fenced code blocks (```), and unordered list bullets (- / *).
/// Fenced blocks are collected into `snippets` and framed with a header
/// carrying their 1-based copy index.
pub(super) fn render_markdown(
    text: &str,
    base_style: Style,
    palette: ThemePalette,
    snippets: &mut Vec<Snippet>,
    copied: Option<usize>,
) -> Vec<Vec<Span<'static>>> {
    if !contains_markdown_syntax(text) {
        return text
            .split('\n')
            .map(|line| {
                let content = if line.is_empty() { " " } else { line };
                vec![Span::styled(content.to_string(), base_style)]
            })
            .collect();
    }

    let mut result: Vec<Vec<Span<'static>>> = Vec::new();
    let mut fence: Option<(String, Vec<String>)> = None;

    let bold_style = base_style.add_modifier(Modifier::BOLD);
    let italic_style = base_style.add_modifier(Modifier::ITALIC);
    let inline_code_style = palette.inline_code_style();
    let bullet_style = base_style.fg(palette.bullet);

    for line in text.split('\n') {
        let trimmed = line.trim();

        if trimmed.starts_with("```") {
            match fence.take() {
                Some((language, body)) => {
                    emit_snippet(&mut result, snippets, language, body, palette, copied);
                }
                None => {
                    let language = normalize_language(trimmed.trim_start_matches('`'));
                    fence = Some((language, Vec::new()));
                }
            }
            continue;
        }

        if let Some((_, body)) = fence.as_mut() {
            body.push(line.to_string());
            continue;
        }

        // Headings
        if trimmed.starts_with('#') {
            let level = trimmed.chars().take_while(|c| *c == '#').count();
            let heading_text = trimmed[level..].trim_start();
            let prefix = "#".repeat(level);
            if heading_text.is_empty() {
                result.push(vec![Span::styled(prefix, palette.heading_style())]);
            } else {
                result.push(vec![
                    Span::styled(format!("{} ", prefix), palette.muted_style()),
                    Span::styled(heading_text.to_string(), palette.heading_style()),
                ]);
            }
            continue;
        }

        // Unordered list bullets
        if trimmed.starts_with("- ") || trimmed.starts_with("* ") {
            let indent = line.len() - line.trim_start().len();
            let rest = &trimmed[2..];
            let mut spans = Vec::new();
            if indent > 0 {
                spans.push(Span::raw(" ".repeat(indent)));
            }
            spans.push(Span::styled("\u{2022} ".to_string(), bullet_style));
            spans.extend(render_inline_markdown(
                rest,
                base_style,
                bold_style,
                italic_style,
                inline_code_style,
            ));
            result.push(spans);
            continue;
        }

        let content = if line.is_empty() { " " } else { line };
        result.push(render_inline_markdown(
            content,
            base_style,
            bold_style,
            italic_style,
            inline_code_style,
        ));
    }

    // Unterminated fence: treat what arrived as a complete block.
    if let Some((language, body)) = fence.take() {
        emit_snippet(&mut result, snippets, language, body, palette, copied);
    }

    result
}

fn emit_snippet(
    result: &mut Vec<Vec<Span<'static>>>,
    snippets: &mut Vec<Snippet>,
    language: String,
    body: Vec<String>,
    palette: ThemePalette,
    copied: Option<usize>,
) {
    let index = snippets.len() + 1;
    let frame_style = palette.snippet_frame_style();
    let mut header = vec![
        Span::styled("─── ".to_string(), frame_style),
        Span::styled(
            language.clone(),
            palette.muted_style().add_modifier(Modifier::ITALIC),
        ),
        Span::styled(format!(" [{index}]"), palette.muted_style()),
    ];
    if copied == Some(index) {
        header.push(Span::styled(
            " copied!".to_string(),
            Style::default()
                .fg(palette.highlight_fg)
                .add_modifier(Modifier::BOLD),
        ));
    }
    header.push(Span::styled(" ───".to_string(), frame_style));
    result.push(header);

    for line in &body {
        let content = if line.is_empty() { " " } else { line.as_str() };
        result.push(vec![Span::styled(
            content.to_string(),
            palette.code_style(),
        )]);
    }
    result.push(vec![Span::styled("───".to_string(), frame_style)]);

    snippets.push(Snippet {
        language,
        code: body.join("\n"),
    });
}

fn contains_markdown_syntax(text: &str) -> bool {
    if text.contains("```") || text.contains('`') || text.contains("**") {
        return true;
    }
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') || trimmed.starts_with("- ") || trimmed.starts_with("* ") {
            return true;
        }
        if line.contains('*') {
            return true;
        }
    }
    false
}

/// Parse inline markdown: **bold**, *italic*, `code`
fn render_inline_markdown(
    text: &str,
    base_style: Style,
    bold_style: Style,
    italic_style: Style,
    code_style: Style,
) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    let mut buf = String::new();
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut i = 0;

    while i < len {
        // Inline code: `...`
        if chars[i] == '`' {
            if !buf.is_empty() {
                spans.push(Span::styled(buf.clone(), base_style));
                buf.clear();
            }
            let start = i + 1;
            if let Some(end) = chars[start..].iter().position(|&c| c == '`') {
                let code_text: String = chars[start..start + end].iter().collect();
                spans.push(Span::styled(format!(" {} ", code_text), code_style));
                i = start + end + 1;
            } else {
                buf.push('`');
                i += 1;
            }
            continue;
        }

        // Bold: **...**
        if i + 1 < len && chars[i] == '*' && chars[i + 1] == '*' {
            if !buf.is_empty() {
                spans.push(Span::styled(buf.clone(), base_style));
                buf.clear();
            }
            let start = i + 2;
            let mut end = None;
            for j in start..len.saturating_sub(1) {
                if chars[j] == '*' && chars[j + 1] == '*' {
                    end = Some(j);
                    break;
                }
            }
            if let Some(end) = end {
                let bold_text: String = chars[start..end].iter().collect();
                spans.push(Span::styled(bold_text, bold_style));
                i = end + 2;
            } else {
                buf.push('*');
                buf.push('*');
                i += 2;
            }
            continue;
        }

        // Italic: *...*
        if chars[i] == '*' {
            if !buf.is_empty() {
                spans.push(Span::styled(buf.clone(), base_style));
                buf.clear();
            }
            let start = i + 1;
            let mut end = None;
            for j in start..len {
                if chars[j] == '*' && !(j + 1 < len && chars[j + 1] == '*') {
                    end = Some(j);
                    break;
                }
            }
            if let Some(end) = end {
                let italic_text: String = chars[start..end].iter().collect();
                spans.push(Span::styled(italic_text, italic_style));
                i = end + 1;
            } else {
                buf.push('*');
                i += 1;
            }
            continue;
        }

        buf.push(chars[i]);
        i += 1;
    }

    if !buf.is_empty() {
        spans.push(Span::styled(buf, base_style));
    }

    if spans.is_empty() {
        spans.push(Span::styled(" ".to_string(), base_style));
    }

    spans
}
