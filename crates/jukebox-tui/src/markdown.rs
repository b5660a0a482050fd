use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};

/// Parse a line of text and convert **bold** and `code` markdown to styled spans
pub fn parse_markdown_line(text: &str) -> Line<'static> {
    Line::from(inline_spans(text, Style::default()))
}

fn inline_spans(text: &str, base: Style) -> Vec<Span<'static>> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();

                let mut bold_text = String::new();
                let mut found_close = false;
                while let Some(c) = chars.next() {
                    if c == '*' && chars.peek() == Some(&'*') {
                        chars.next();
                        found_close = true;
                        break;
                    }
                    bold_text.push(c);
                }

                if found_close && !bold_text.is_empty() {
                    if !current_text.is_empty() {
                        spans.push(Span::styled(std::mem::take(&mut current_text), base));
                    }
                    spans.push(Span::styled(bold_text, base.add_modifier(Modifier::BOLD)));
                } else {
                    // No closing **, treat as literal
                    current_text.push_str("**");
                    current_text.push_str(&bold_text);
                }
            }
            '`' => {
                let mut code_text = String::new();
                let mut found_close = false;
                for c in chars.by_ref() {
                    if c == '`' {
                        found_close = true;
                        break;
                    }
                    code_text.push(c);
                }

                if found_close && !code_text.is_empty() {
                    if !current_text.is_empty() {
                        spans.push(Span::styled(std::mem::take(&mut current_text), base));
                    }
                    spans.push(Span::styled(code_text, code_style()));
                } else {
                    current_text.push('`');
                    current_text.push_str(&code_text);
                    if found_close {
                        current_text.push('`');
                    }
                }
            }
            _ => current_text.push(c),
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::styled(current_text, base));
    }

    spans
}

fn code_style() -> Style {
    Style::default().fg(Color::Green)
}

fn heading_style(level: usize) -> Style {
    let color = match level {
        1 => Color::Red,
        2 => Color::LightRed,
        3 => Color::Magenta,
        _ => Color::LightMagenta,
    };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

/// `## Title` -> (2, "Title")
fn heading(line: &str) -> Option<(usize, &str)> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    line[level..].strip_prefix(' ').map(|rest| (level, rest.trim()))
}

/// `3. item` -> ("3.", "item")
fn numbered_item(line: &str) -> Option<(&str, &str)> {
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    line[digits..]
        .strip_prefix(". ")
        .map(|rest| (&line[..=digits], rest))
}

/// Render an artifact document as styled lines for the preview pane
pub fn render_markdown(text: &str) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let mut in_code_block = false;

    for raw in text.lines() {
        let trimmed = raw.trim_start();

        if trimmed.starts_with("```") {
            in_code_block = !in_code_block;
            lines.push(Line::from(Span::styled(
                "─".repeat(24),
                Style::default().fg(Color::DarkGray),
            )));
            continue;
        }

        if in_code_block {
            lines.push(Line::from(Span::styled(raw.to_string(), code_style())));
            continue;
        }

        let indent = " ".repeat(raw.len() - trimmed.len());

        let line = if let Some((level, title)) = heading(trimmed) {
            Line::from(inline_spans(title, heading_style(level)))
        } else if let Some(quoted) = trimmed.strip_prefix('>') {
            let style = Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC);
            let mut spans = vec![Span::styled("│ ", Style::default().fg(Color::DarkGray))];
            spans.extend(inline_spans(quoted.trim_start(), style));
            Line::from(spans)
        } else if let Some(item) = ["- ", "* ", "+ "]
            .iter()
            .find_map(|marker| trimmed.strip_prefix(marker))
        {
            let mut spans = vec![Span::raw(indent), Span::styled("• ", Style::default().fg(Color::Cyan))];
            spans.extend(inline_spans(item, Style::default()));
            Line::from(spans)
        } else if let Some((number, item)) = numbered_item(trimmed) {
            let mut spans = vec![
                Span::raw(indent),
                Span::styled(format!("{} ", number), Style::default().fg(Color::Cyan)),
            ];
            spans.extend(inline_spans(item, Style::default()));
            Line::from(spans)
        } else if matches!(trimmed, "---" | "***" | "___") {
            Line::from(Span::styled("─".repeat(24), Style::default().fg(Color::DarkGray)))
        } else {
            parse_markdown_line(raw)
        };

        lines.push(line);
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn plain(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn test_bold_span() {
        let line = parse_markdown_line("a **b** c");
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "b");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_unclosed_bold_is_literal() {
        assert_eq!(plain(&parse_markdown_line("a **b")), "a **b");
    }

    #[test]
    fn test_inline_code() {
        let line = parse_markdown_line("run `cargo` now");
        assert_eq!(line.spans[1].content, "cargo");
        assert_eq!(line.spans[1].style.fg, Some(Color::Green));
    }

    #[test]
    fn test_headings_drop_hashes() {
        let lines = render_markdown("# Title\n### Sub\n#nospace");
        assert_eq!(plain(&lines[0]), "Title");
        assert_eq!(lines[0].spans[0].style.fg, Some(Color::Red));
        assert_eq!(plain(&lines[1]), "Sub");
        assert_eq!(plain(&lines[2]), "#nospace");
    }

    #[test]
    fn test_lists_and_quotes() {
        let lines = render_markdown("- one\n  * two\n3. three\n> said");
        assert_eq!(plain(&lines[0]), "• one");
        assert_eq!(plain(&lines[1]), "  • two");
        assert_eq!(plain(&lines[2]), "3. three");
        assert_eq!(plain(&lines[3]), "│ said");
    }

    #[test]
    fn test_code_fence_keeps_markup_raw() {
        let lines = render_markdown("```\n# not a heading\n```\nafter");
        assert_eq!(lines.len(), 4);
        assert_eq!(plain(&lines[1]), "# not a heading");
        assert_eq!(lines[1].spans[0].style.fg, Some(Color::Green));
        assert_eq!(plain(&lines[3]), "after");
    }
}
