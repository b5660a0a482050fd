use jukebox_core::{ChatRole, ExportFormat};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{
        Block, Borders, Cell, Clear, List, ListItem, Paragraph, Row, Scrollbar,
        ScrollbarOrientation, ScrollbarState, Table, Wrap,
    },
    Frame,
};

use crate::app::{App, ArtifactTab, DialogField, FocusPane, InputMode, Screen};
use crate::markdown::{parse_markdown_line, render_markdown};

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.screen {
        Screen::List => render_list_screen(app, frame, body_area),
        Screen::Detail => render_detail_screen(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);

    // Render popups (in order of priority)
    if let Some(message) = app.alert.clone() {
        render_alert(&message, frame, area);
    } else if app.show_new_dialog {
        render_new_dialog(app, frame, area);
    } else if app.show_download_picker {
        render_download_picker(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let location = match app.screen {
        Screen::List => format!(" {} conversations", app.conversations.len()),
        Screen::Detail => format!(" {}", app.goal),
    };

    let title = Line::from(vec![
        Span::styled(" Jukebox ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(location, Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let [left, right] =
        Layout::horizontal([Constraint::Min(0), Constraint::Length(40)]).areas(area);
    frame.render_widget(Paragraph::new(title), left);
    frame.render_widget(
        Paragraph::new(Span::styled(
            format!("{} ", app.client.base_url()),
            Style::default().fg(Color::DarkGray),
        ))
        .right_aligned(),
        right,
    );
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match app.screen {
        Screen::List => " LIST ",
        Screen::Detail => " CHAT ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let keys: &[(&str, &str)] = if app.show_new_dialog {
        &[
            ("Tab", "field"),
            ("Enter", "attach/create"),
            ("Bksp", "drop file"),
            ("Esc", "cancel"),
        ]
    } else if app.show_download_picker {
        &[("j/k", "format"), ("Enter", "save"), ("Esc", "cancel")]
    } else {
        match (app.screen, app.input_mode) {
            (Screen::List, InputMode::Normal) => &[
                ("j/k", "nav"),
                ("Enter", "open"),
                ("n", "new"),
                ("/", "search"),
                ("D", "download"),
                ("r", "refresh"),
                ("q", "quit"),
            ],
            (Screen::List, InputMode::Editing) => &[("Enter", "done"), ("Esc", "done")],
            (Screen::Detail, InputMode::Normal) => &[
                ("i", "type"),
                ("Tab", "focus"),
                ("j/k", "scroll"),
                ("t", "preview/source"),
                ("D", "download"),
                ("Esc", "back"),
                ("q", "quit"),
            ],
            (Screen::Detail, InputMode::Editing) => &[("Enter", "send"), ("Esc", "stop typing")],
        }
    };

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    for (key, label) in keys {
        spans.push(Span::styled(format!(" {} ", key), key_style));
        spans.push(Span::styled(format!(" {} ", label), label_style));
    }
    if let Some(status) = &app.status {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(status.clone(), Style::default().fg(Color::Yellow)));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_list_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [search_area, table_area] =
        Layout::vertical([Constraint::Length(3), Constraint::Min(0)]).areas(area);

    let editing = app.input_mode == InputMode::Editing && !app.show_new_dialog;
    let search_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if editing { Color::Yellow } else { Color::DarkGray }))
        .title(" Search goals (/) ");

    let inner_width = search_area.width.saturating_sub(2) as usize;
    let (visible, cursor_x) = app.search_input.visible(inner_width);
    frame.render_widget(
        Paragraph::new(visible)
            .style(Style::default().fg(Color::Cyan))
            .block(search_block),
        search_area,
    );
    if editing {
        frame.set_cursor_position((search_area.x + cursor_x as u16 + 1, search_area.y + 1));
    }

    let rows: Vec<Row> = app
        .filtered_conversations()
        .into_iter()
        .map(|c| {
            Row::new(vec![
                Cell::from(c.id.clone()).style(Style::default().fg(Color::DarkGray)),
                Cell::from(c.goal.clone()),
            ])
        })
        .collect();

    let title = if app.search_input.is_blank() {
        " Conversations ".to_string()
    } else {
        format!(" Conversations matching \"{}\" ", app.search_input.text().trim())
    };

    let empty = rows.is_empty();
    let table = Table::new(rows, [Constraint::Length(10), Constraint::Min(10)])
        .header(
            Row::new(vec!["ID", "Goal"]).style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ),
        )
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(title),
        )
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(table, table_area, &mut app.list_state);

    if empty {
        let hint = Paragraph::new("No conversations yet. Press n to start one.")
            .style(Style::default().fg(Color::DarkGray))
            .centered();
        let hint_area = Rect::new(
            table_area.x + 1,
            table_area.y + table_area.height / 2,
            table_area.width.saturating_sub(2),
            1,
        );
        frame.render_widget(hint, hint_area);
    }
}

fn render_detail_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    // Chat on the left, artifact on the right
    let [chat_column, artifact_area] = Layout::horizontal([
        Constraint::Percentage(40),
        Constraint::Percentage(60),
    ])
    .areas(area);

    let [chat_area, input_area] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(3)]).areas(chat_column);

    // Store areas for mouse hit-testing
    app.chat_area = Some(chat_area);
    app.artifact_area = Some(artifact_area);

    render_chat(app, frame, chat_area);
    render_message_input(app, frame, input_area);
    render_artifact(app, frame, artifact_area);
}

fn border_color(focused: bool) -> Color {
    if focused {
        Color::Cyan
    } else {
        Color::DarkGray
    }
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Inner size minus borders, for scroll calculations
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color(app.focus == FocusPane::Chat)))
        .title(" Conversation ");

    let busy = app.is_busy();
    let text = if app.view.messages.is_empty() && !busy {
        Text::from(Span::styled(
            "No messages yet.",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for msg in &app.view.messages {
            match msg.role {
                ChatRole::User => {
                    lines.push(Line::from(Span::styled(
                        "You:",
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    )));
                    for line in msg.content.lines() {
                        lines.push(Line::from(line.to_string()));
                    }
                }
                ChatRole::Assistant => {
                    lines.push(Line::from(Span::styled(
                        "Assistant:",
                        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                    )));
                    for line in msg.content.lines() {
                        lines.push(parse_markdown_line(line));
                    }
                }
            }
            for file in &msg.files {
                lines.push(Line::from(Span::styled(
                    format!("📎 {}", file.name),
                    Style::default().fg(Color::Magenta),
                )));
            }
            lines.push(Line::default());
        }

        if busy {
            lines.push(Line::from(Span::styled(
                "Assistant:",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_message_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let busy = app.is_busy();

    let border = if busy {
        Color::DarkGray
    } else if editing || app.focus == FocusPane::Input {
        Color::Yellow
    } else {
        Color::DarkGray
    };
    let title = if busy {
        " Waiting for reply... "
    } else {
        " Message (i to type, Enter to send) "
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .title(title);

    let inner_width = area.width.saturating_sub(2) as usize;
    let (visible, cursor_x) = app.message_input.visible(inner_width);

    let input = Paragraph::new(visible)
        .style(Style::default().fg(if busy { Color::DarkGray } else { Color::Cyan }))
        .block(block);
    frame.render_widget(input, area);

    // Show cursor when editing
    if editing {
        frame.set_cursor_position((area.x + cursor_x as u16 + 1, area.y + 1));
    }
}

fn render_artifact(app: &mut App, frame: &mut Frame, area: Rect) {
    let tab_style = |tab: ArtifactTab| {
        if app.artifact_tab == tab {
            Style::default().fg(Color::Black).bg(Color::Cyan).bold()
        } else {
            Style::default().fg(Color::DarkGray)
        }
    };

    let title = Line::from(vec![
        Span::raw(" "),
        Span::styled(" Preview ", tab_style(ArtifactTab::Preview)),
        Span::raw(" "),
        Span::styled(" Source ", tab_style(ArtifactTab::Source)),
        Span::raw(" "),
    ]);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color(app.focus == FocusPane::Artifact)))
        .title(title);

    let inner = block.inner(area);
    app.artifact_height = inner.height;

    let text = if app.view.artifact.is_empty() {
        Text::from(Span::styled(
            "No artifact yet.",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        match app.artifact_tab {
            ArtifactTab::Preview => Text::from(render_markdown(&app.view.artifact)),
            ArtifactTab::Source => Text::from(
                app.view
                    .artifact
                    .lines()
                    .map(|l| Line::from(l.to_string()))
                    .collect::<Vec<_>>(),
            ),
        }
    };

    app.artifact_lines = wrapped_height(&text, inner.width);
    let paragraph = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.artifact_scroll, 0));

    frame.render_widget(paragraph, area);

    if app.artifact_lines > app.artifact_height {
        let mut scrollbar_state = ScrollbarState::new(
            app.artifact_lines.saturating_sub(app.artifact_height) as usize,
        )
        .position(app.artifact_scroll as usize);
        frame.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight),
            area,
            &mut scrollbar_state,
        );
    }
}

/// Rows `text` takes up when wrapped at `width` columns
fn wrapped_height(text: &Text, width: u16) -> u16 {
    let width = width.max(1) as usize;
    let rows: usize = text
        .lines
        .iter()
        .map(|line| line.width().max(1).div_ceil(width))
        .sum();
    rows.min(u16::MAX as usize) as u16
}

/// A centered rectangle of at most `width` x `height` inside `area`
fn popup_rect(area: Rect, width: u16, height: u16) -> Rect {
    let popup_width = width.min(area.width.saturating_sub(4));
    let popup_height = height.min(area.height.saturating_sub(4));

    let popup_x = area.x + (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = area.y + (area.height.saturating_sub(popup_height)) / 2;

    Rect::new(popup_x, popup_y, popup_width, popup_height)
}

fn render_alert(message: &str, frame: &mut Frame, area: Rect) {
    let popup_area = popup_rect(area, 60, 7);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(" Error (Enter to dismiss) ");

    let alert = Paragraph::new(message.to_string())
        .block(block)
        .wrap(Wrap { trim: true });

    frame.render_widget(alert, popup_area);
}

fn render_new_dialog(app: &App, frame: &mut Frame, area: Rect) {
    let file_rows = app.pending_files.len().min(5) as u16;
    let popup_area = popup_rect(area, 70, 10 + file_rows);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" New conversation ");

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let [goal_label, goal_area, _, file_label, file_area, files_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Min(0),
    ])
    .areas(inner);

    let label_style = |field: DialogField| {
        if app.dialog_field == field {
            Style::default().fg(Color::Yellow).bold()
        } else {
            Style::default().fg(Color::DarkGray)
        }
    };

    frame.render_widget(
        Paragraph::new(Span::styled("Goal", label_style(DialogField::Goal))),
        goal_label,
    );
    frame.render_widget(
        Paragraph::new(Span::styled(
            "Attach file (path, Enter to add)",
            label_style(DialogField::Attachment),
        )),
        file_label,
    );

    let width = inner.width as usize;
    let (goal_text, goal_cursor) = app.goal_input.visible(width);
    let (file_text, file_cursor) = app.attachment_input.visible(width);
    frame.render_widget(
        Paragraph::new(goal_text).style(Style::default().fg(Color::Cyan)),
        goal_area,
    );
    frame.render_widget(
        Paragraph::new(file_text).style(Style::default().fg(Color::Cyan)),
        file_area,
    );

    let (cursor_area, cursor_x) = match app.dialog_field {
        DialogField::Goal => (goal_area, goal_cursor),
        DialogField::Attachment => (file_area, file_cursor),
    };
    frame.set_cursor_position((cursor_area.x + cursor_x as u16, cursor_area.y));

    let mut file_lines: Vec<Line> = app
        .pending_files
        .iter()
        .rev()
        .take(5)
        .rev()
        .map(|f| {
            Line::from(vec![
                Span::styled("📎 ", Style::default().fg(Color::Magenta)),
                Span::raw(f.name.clone()),
                Span::styled(
                    format!(" ({} chars)", f.contents.chars().count()),
                    Style::default().fg(Color::DarkGray),
                ),
            ])
        })
        .collect();
    if file_lines.is_empty() {
        file_lines.push(Line::from(Span::styled(
            "No files attached",
            Style::default().fg(Color::DarkGray),
        )));
    }
    let files = Paragraph::new(file_lines).block(Block::default().borders(Borders::TOP));
    frame.render_widget(files, files_area);
}

fn render_download_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let formats = ExportFormat::all();
    let popup_area = popup_rect(area, 40, formats.len() as u16 + 2);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Download artifact ");

    let items: Vec<ListItem> = formats
        .iter()
        .map(|format| {
            let style = if app.exporter.supports(*format) {
                Style::default()
            } else {
                Style::default().fg(Color::DarkGray)
            };
            ListItem::new(format!(" {} ", format.display_name())).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.download_state);
}
