use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;

use crate::app::{App, DialogField, FocusPane, InputMode, Screen};
use crate::input::TextInput;
use crate::tui::AppEvent;

const MOUSE_SCROLL_LINES: i32 = 3;

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key).await?,
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Paste(text) => handle_paste(app, &text),
        AppEvent::Resize => {}
        AppEvent::Tick => {
            app.tick_animation();
            app.poll_send_task().await;
        }
    }
    Ok(())
}

async fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return Ok(());
    }

    // Popups take every key until dismissed
    if app.alert.is_some() {
        if matches!(key.code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char('q')) {
            app.alert = None;
        }
        return Ok(());
    }
    if app.show_new_dialog {
        handle_new_dialog(app, key).await;
        return Ok(());
    }
    if app.show_download_picker {
        handle_download_picker(app, key).await;
        return Ok(());
    }

    match (app.screen, app.input_mode) {
        (Screen::List, InputMode::Normal) => handle_list_normal(app, key).await,
        (Screen::List, InputMode::Editing) => handle_search_editing(app, key),
        (Screen::Detail, InputMode::Normal) => handle_detail_normal(app, key),
        (Screen::Detail, InputMode::Editing) => handle_message_editing(app, key),
    }

    Ok(())
}

/// Cursor movement and editing shared by every text field.
/// Returns false for keys a field does not handle.
fn edit_text(input: &mut TextInput, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Backspace => input.backspace(),
        KeyCode::Delete => input.delete(),
        KeyCode::Left => input.left(),
        KeyCode::Right => input.right(),
        KeyCode::Home => input.home(),
        KeyCode::End => input.end(),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => input.insert(c),
        _ => return false,
    }
    true
}

async fn handle_list_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        KeyCode::Char('j') | KeyCode::Down => app.list_down(),
        KeyCode::Char('k') | KeyCode::Up => app.list_up(),
        KeyCode::Char('g') => app.list_first(),
        KeyCode::Char('G') => app.list_last(),

        KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right => {
            if let Some(conversation) = app.selected_conversation().cloned() {
                app.open_conversation(conversation.id, conversation.goal);
            }
        }

        KeyCode::Char('/') | KeyCode::Char('s') => app.input_mode = InputMode::Editing,
        KeyCode::Esc => {
            app.search_input.clear();
            app.reset_selection();
        }

        KeyCode::Char('n') => app.open_new_dialog(),
        KeyCode::Char('r') => app.refresh_conversations().await,
        KeyCode::Char('D') => app.open_download_picker(),
        _ => {}
    }
}

fn handle_search_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Enter => app.input_mode = InputMode::Normal,
        _ => {
            if edit_text(&mut app.search_input, key) {
                app.reset_selection();
            }
        }
    }
}

fn handle_detail_normal(app: &mut App, key: KeyEvent) {
    let half_page = |height: u16| (height / 2).max(1) as i32;

    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Esc | KeyCode::Char('h') | KeyCode::Left => app.close_conversation(),

        KeyCode::Tab => app.cycle_focus(),
        KeyCode::Char('i') | KeyCode::Enter => {
            app.focus = FocusPane::Input;
            app.input_mode = InputMode::Editing;
        }

        KeyCode::Char('j') | KeyCode::Down => scroll_focused(app, 1),
        KeyCode::Char('k') | KeyCode::Up => scroll_focused(app, -1),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            let step = half_page(focused_height(app));
            scroll_focused(app, step);
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            let step = half_page(focused_height(app));
            scroll_focused(app, -step);
        }
        KeyCode::Char('g') => scroll_focused(app, -(u16::MAX as i32)),
        KeyCode::Char('G') => scroll_focused(app, u16::MAX as i32),

        KeyCode::Char('t') => app.toggle_artifact_tab(),
        KeyCode::Char('D') => app.open_download_picker(),
        _ => {}
    }
}

fn focused_height(app: &App) -> u16 {
    match app.focus {
        FocusPane::Artifact => app.artifact_height,
        FocusPane::Chat | FocusPane::Input => app.chat_height,
    }
}

fn scroll_focused(app: &mut App, delta: i32) {
    match app.focus {
        FocusPane::Artifact => app.scroll_artifact(delta),
        FocusPane::Chat | FocusPane::Input => app.scroll_chat(delta),
    }
}

fn handle_message_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.input_mode = InputMode::Normal,
        KeyCode::Enter => app.submit_message(),
        _ => {
            edit_text(&mut app.message_input, key);
        }
    }
}

async fn handle_new_dialog(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.close_new_dialog(),
        KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
            app.toggle_dialog_field()
        }
        KeyCode::Enter => {
            if app.dialog_field == DialogField::Attachment && !app.attachment_input.is_blank() {
                app.attach_file().await;
            } else {
                app.create_conversation().await;
            }
        }
        KeyCode::Backspace
            if app.dialog_field == DialogField::Attachment
                && app.attachment_input.text().is_empty() =>
        {
            app.remove_last_attachment();
        }
        _ => {
            edit_text(app.dialog_input(), key);
        }
    }
}

async fn handle_download_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => {
            app.show_download_picker = false;
            app.download_target = None;
        }
        KeyCode::Char('j') | KeyCode::Down => app.download_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.download_nav_up(),
        KeyCode::Enter => app.download_selected().await,
        _ => {}
    }
}

fn handle_paste(app: &mut App, text: &str) {
    if app.show_new_dialog {
        app.dialog_input().insert_str(text);
        return;
    }
    if app.input_mode != InputMode::Editing {
        return;
    }
    match app.screen {
        Screen::List => {
            app.search_input.insert_str(text);
            app.reset_selection();
        }
        Screen::Detail => app.message_input.insert_str(text),
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let delta = match mouse.kind {
        MouseEventKind::ScrollDown => 1,
        MouseEventKind::ScrollUp => -1,
        _ => return,
    };

    match app.screen {
        Screen::List => {
            if delta > 0 {
                app.list_down();
            } else {
                app.list_up();
            }
        }
        Screen::Detail => {
            let (x, y) = (mouse.column, mouse.row);
            let in_chat = app.chat_area.is_some_and(|r| point_in_rect(x, y, r));
            let in_artifact = app.artifact_area.is_some_and(|r| point_in_rect(x, y, r));

            if in_chat {
                app.scroll_chat(delta * MOUSE_SCROLL_LINES);
            } else if in_artifact {
                app.scroll_artifact(delta * MOUSE_SCROLL_LINES);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;
    use crossterm::event::KeyEventKind;
    use jukebox_core::{ApiClient, Config, ConversationSummary};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    fn app() -> App {
        let mut app = App::new(ApiClient::new("http://127.0.0.1:9"), &Config::new());
        app.conversations = vec![
            ConversationSummary {
                id: "1".to_string(),
                goal: "alpha".to_string(),
            },
            ConversationSummary {
                id: "2".to_string(),
                goal: "beta".to_string(),
            },
        ];
        app.reset_selection();
        app
    }

    #[test]
    fn test_point_in_rect() {
        let rect = Rect::new(2, 2, 3, 3);
        assert!(point_in_rect(2, 2, rect));
        assert!(point_in_rect(4, 4, rect));
        assert!(!point_in_rect(5, 4, rect));
        assert!(!point_in_rect(1, 3, rect));
    }

    #[test]
    fn test_edit_text_ignores_control_chords() {
        let mut input = TextInput::new();
        assert!(edit_text(&mut input, key(KeyCode::Char('a'))));
        let chord = KeyEvent::new(KeyCode::Char('w'), KeyModifiers::CONTROL);
        assert!(!edit_text(&mut input, chord));
        assert_eq!(input.text(), "a");
    }

    #[tokio::test]
    async fn test_search_typing_filters_list() {
        let mut app = app();
        handle_key(&mut app, key(KeyCode::Char('/'))).await.unwrap();
        assert_eq!(app.input_mode, InputMode::Editing);

        for c in "bet".chars() {
            handle_key(&mut app, key(KeyCode::Char(c))).await.unwrap();
        }
        handle_key(&mut app, key(KeyCode::Enter)).await.unwrap();

        assert_eq!(app.input_mode, InputMode::Normal);
        assert_eq!(app.selected_conversation().map(|c| c.id.as_str()), Some("2"));
    }

    #[tokio::test]
    async fn test_alert_swallows_keys_until_dismissed() {
        let mut app = app();
        app.alert = Some("boom".to_string());

        handle_key(&mut app, key(KeyCode::Char('j'))).await.unwrap();
        assert_eq!(app.list_state.selected(), Some(0));
        assert!(app.alert.is_some());

        handle_key(&mut app, key(KeyCode::Esc)).await.unwrap();
        assert!(app.alert.is_none());
        assert!(!app.should_quit);
    }

    #[tokio::test]
    async fn test_blank_goal_is_rejected_locally() {
        let mut app = app();
        handle_key(&mut app, key(KeyCode::Char('n'))).await.unwrap();
        assert!(app.show_new_dialog);

        handle_key(&mut app, key(KeyCode::Char(' '))).await.unwrap();
        handle_key(&mut app, key(KeyCode::Enter)).await.unwrap();

        assert_eq!(app.alert.as_deref(), Some("Goal cannot be empty"));
        assert!(app.show_new_dialog);
    }

    #[tokio::test]
    async fn test_paste_goes_to_message_input() {
        let mut app = app();
        app.screen = Screen::Detail;
        app.input_mode = InputMode::Editing;
        handle_event(&mut app, AppEvent::Paste("hello\nworld".to_string()))
            .await
            .unwrap();
        assert_eq!(app.message_input.text(), "helloworld");
    }
}
