use std::path::PathBuf;
use std::sync::Arc;

use jukebox_core::{
    download_artifact, ApiClient, ApiError, AttachedFile, Config, ConversationSession,
    ConversationState, ConversationSummary, ExportFormat, Exporter, OpenOutcome,
    PlainTextExtractor, SendOutcome, StreamEnd,
};
use ratatui::layout::Rect;
use ratatui::widgets::{ListState, TableState};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::input::TextInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    List,
    Detail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Chat,
    Artifact,
    Input,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArtifactTab {
    #[default]
    Preview,
    Source,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialogField {
    #[default]
    Goal,
    Attachment,
}

/// What a background conversation task finished with
#[derive(Debug)]
pub enum TaskOutcome {
    Opened(OpenOutcome),
    Sent(SendOutcome),
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,
    pub focus: FocusPane,

    // Conversation list
    pub conversations: Vec<ConversationSummary>,
    pub list_state: TableState,
    pub search_input: TextInput,

    // New conversation dialog
    pub show_new_dialog: bool,
    pub dialog_field: DialogField,
    pub goal_input: TextInput,
    pub attachment_input: TextInput,
    pub pending_files: Vec<AttachedFile>,

    // Download picker
    pub show_download_picker: bool,
    pub download_state: ListState,
    pub download_target: Option<(String, String)>, // (id, goal)

    // Messages for the user
    pub alert: Option<String>,
    pub status: Option<String>,

    // Open conversation
    pub session: Option<ConversationSession<ApiClient>>,
    pub goal: String,
    pub view: ConversationState,
    pub message_input: TextInput,
    pub send_task: Option<JoinHandle<Result<TaskOutcome, ApiError>>>,
    pub artifact_tab: ArtifactTab,

    // Scrolling
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub artifact_scroll: u16,
    pub artifact_height: u16,
    pub artifact_lines: u16,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Panel areas for mouse hit-testing (updated during render)
    pub chat_area: Option<Rect>,
    pub artifact_area: Option<Rect>,

    // Services
    pub client: Arc<ApiClient>,
    pub exporter: Exporter,
    pub download_dir: PathBuf,
}

impl App {
    pub fn new(client: ApiClient, config: &Config) -> Self {
        Self {
            should_quit: false,
            screen: Screen::List,
            input_mode: InputMode::Normal,
            focus: FocusPane::Input,

            conversations: Vec::new(),
            list_state: TableState::default(),
            search_input: TextInput::new(),

            show_new_dialog: false,
            dialog_field: DialogField::default(),
            goal_input: TextInput::new(),
            attachment_input: TextInput::new(),
            pending_files: Vec::new(),

            show_download_picker: false,
            download_state: ListState::default(),
            download_target: None,

            alert: None,
            status: None,

            session: None,
            goal: String::new(),
            view: ConversationState::default(),
            message_input: TextInput::new(),
            send_task: None,
            artifact_tab: ArtifactTab::default(),

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            artifact_scroll: 0,
            artifact_height: 0,
            artifact_lines: 0,

            animation_frame: 0,

            chat_area: None,
            artifact_area: None,

            client: Arc::new(client),
            exporter: Exporter::new(),
            download_dir: config.download_dir(),
        }
    }

    fn show_error(&mut self, context: &str, err: &ApiError) {
        warn!(error = %err, "{}", context);
        self.alert = Some(err.user_message());
    }

    // Conversation list

    /// Conversations whose goal contains the search text, ignoring case
    pub fn filtered_conversations(&self) -> Vec<&ConversationSummary> {
        let query = self.search_input.text().trim().to_lowercase();
        self.conversations
            .iter()
            .filter(|c| query.is_empty() || c.goal.to_lowercase().contains(&query))
            .collect()
    }

    pub fn selected_conversation(&self) -> Option<&ConversationSummary> {
        let i = self.list_state.selected()?;
        self.filtered_conversations().get(i).copied()
    }

    /// Keep the selection inside the filtered list
    pub fn reset_selection(&mut self) {
        let len = self.filtered_conversations().len();
        self.list_state.select(if len == 0 { None } else { Some(0) });
    }

    pub fn list_down(&mut self) {
        let len = self.filtered_conversations().len();
        if len > 0 {
            let i = self.list_state.selected().unwrap_or(0);
            self.list_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn list_up(&mut self) {
        let i = self.list_state.selected().unwrap_or(0);
        self.list_state.select(Some(i.saturating_sub(1)));
    }

    pub fn list_first(&mut self) {
        self.reset_selection();
    }

    pub fn list_last(&mut self) {
        let len = self.filtered_conversations().len();
        if len > 0 {
            self.list_state.select(Some(len - 1));
        }
    }

    pub async fn refresh_conversations(&mut self) {
        match self.client.list_conversations().await {
            Ok(conversations) => {
                info!(count = conversations.len(), "conversations loaded");
                self.conversations = conversations;
                self.reset_selection();
            }
            Err(e) => self.show_error("listing conversations failed", &e),
        }
    }

    // New conversation dialog

    pub fn open_new_dialog(&mut self) {
        self.show_new_dialog = true;
        self.dialog_field = DialogField::Goal;
        self.goal_input.clear();
        self.attachment_input.clear();
        self.pending_files.clear();
        self.input_mode = InputMode::Editing;
    }

    pub fn close_new_dialog(&mut self) {
        self.show_new_dialog = false;
        self.input_mode = InputMode::Normal;
    }

    pub fn dialog_input(&mut self) -> &mut TextInput {
        match self.dialog_field {
            DialogField::Goal => &mut self.goal_input,
            DialogField::Attachment => &mut self.attachment_input,
        }
    }

    pub fn toggle_dialog_field(&mut self) {
        self.dialog_field = match self.dialog_field {
            DialogField::Goal => DialogField::Attachment,
            DialogField::Attachment => DialogField::Goal,
        };
    }

    /// Read the file named in the attachment field and queue it
    pub async fn attach_file(&mut self) {
        if self.attachment_input.is_blank() {
            return;
        }
        let path = self.attachment_input.text().trim().to_string();
        match AttachedFile::from_path(&path, &PlainTextExtractor).await {
            Ok(file) => {
                info!(name = %file.name, size = file.contents.len(), "file attached");
                self.pending_files.push(file);
                self.attachment_input.clear();
            }
            Err(e) => self.show_error("attaching file failed", &e),
        }
    }

    pub fn remove_last_attachment(&mut self) {
        self.pending_files.pop();
    }

    /// Create the conversation described by the dialog and open it
    pub async fn create_conversation(&mut self) {
        if self.goal_input.is_blank() {
            self.alert = Some("Goal cannot be empty".to_string());
            return;
        }

        let goal = self.goal_input.text().trim().to_string();
        match self
            .client
            .create_conversation(&goal, &self.pending_files)
            .await
        {
            Ok(id) => {
                info!(conversation = %id, "conversation created");
                self.close_new_dialog();
                self.pending_files.clear();
                self.refresh_conversations().await;
                self.open_conversation(id, goal);
            }
            Err(e) => self.show_error("creating conversation failed", &e),
        }
    }

    // Conversation detail

    /// Switch to the detail screen and load the conversation in the background.
    /// An empty conversation sends its goal as the first message.
    pub fn open_conversation(&mut self, id: String, goal: String) {
        self.abort_send_task();

        let session = ConversationSession::new(id, Arc::clone(&self.client));
        let task_session = session.clone();
        self.send_task = Some(tokio::spawn(async move {
            task_session.open().await.map(TaskOutcome::Opened)
        }));

        self.session = Some(session);
        self.goal = goal;
        self.view = ConversationState::default();
        self.message_input.clear();
        self.artifact_tab = ArtifactTab::Preview;
        self.chat_scroll = 0;
        self.artifact_scroll = 0;
        self.status = None;
        self.screen = Screen::Detail;
        self.focus = FocusPane::Input;
        self.input_mode = InputMode::Normal;
    }

    pub fn close_conversation(&mut self) {
        self.abort_send_task();
        self.session = None;
        self.view = ConversationState::default();
        self.goal.clear();
        self.status = None;
        self.screen = Screen::List;
        self.input_mode = InputMode::Normal;
        self.chat_area = None;
        self.artifact_area = None;
    }

    /// Leaving a conversation stops its stream; whatever arrived stays on the server side
    fn abort_send_task(&mut self) {
        if let Some(task) = self.send_task.take() {
            task.abort();
        }
    }

    /// A send (or the initial load) is still running
    pub fn is_busy(&self) -> bool {
        self.send_task.is_some() || self.session.as_ref().is_some_and(|s| s.is_sending())
    }

    /// Send the input box contents. Ignored while a reply is still streaming.
    pub fn submit_message(&mut self) {
        if self.message_input.is_blank() {
            return;
        }
        if self.is_busy() {
            self.status = Some("Wait for the reply to finish".to_string());
            return;
        }
        let Some(session) = self.session.clone() else {
            return;
        };

        let message = self.message_input.take();
        self.status = None;
        self.send_task = Some(tokio::spawn(async move {
            session
                .send_message(&message, Vec::new())
                .await
                .map(TaskOutcome::Sent)
        }));
        self.scroll_chat_to_bottom();
    }

    /// Pick up the result of a finished background task
    pub async fn poll_send_task(&mut self) {
        let finished = self.send_task.as_ref().is_some_and(|t| t.is_finished());
        if !finished {
            return;
        }
        let Some(task) = self.send_task.take() else {
            return;
        };

        match task.await {
            Ok(Ok(outcome)) => {
                let end = match outcome {
                    TaskOutcome::Opened(OpenOutcome::Loaded { .. }) => None,
                    TaskOutcome::Opened(OpenOutcome::Started(send)) | TaskOutcome::Sent(send) => {
                        Some(send.end)
                    }
                };
                if end == Some(StreamEnd::Interrupted) {
                    self.status = Some("Reply interrupted".to_string());
                }
            }
            Ok(Err(e)) => self.show_error("conversation request failed", &e),
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                warn!(error = %e, "conversation task panicked");
                self.alert = Some(format!("Request failed: {}", e));
            }
        }
        self.sync_view();
    }

    /// Copy the session state into the view if it changed since the last frame
    pub fn sync_view(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        if session.revision() == self.view.revision {
            return;
        }
        let snapshot = session.snapshot();
        let artifact_changed = snapshot.artifact != self.view.artifact;
        self.view = snapshot;
        if artifact_changed {
            self.artifact_scroll = 0;
        }
        self.scroll_chat_to_bottom();
    }

    pub fn toggle_artifact_tab(&mut self) {
        self.artifact_tab = match self.artifact_tab {
            ArtifactTab::Preview => ArtifactTab::Source,
            ArtifactTab::Source => ArtifactTab::Preview,
        };
        self.artifact_scroll = 0;
    }

    pub fn cycle_focus(&mut self) {
        self.focus = match self.focus {
            FocusPane::Input => FocusPane::Chat,
            FocusPane::Chat => FocusPane::Artifact,
            FocusPane::Artifact => FocusPane::Input,
        };
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Scrolling

    /// Wrapped line count of the chat pane, including the "Thinking..." rows
    pub fn chat_line_count(&self) -> u16 {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: usize = 0;
        for msg in &self.view.messages {
            // Role line, content, attachments, blank line
            let content: usize = msg
                .content
                .lines()
                .map(|line| line.chars().count().max(1).div_ceil(wrap_width))
                .fold(0, usize::saturating_add);
            total_lines = total_lines
                .saturating_add(2)
                .saturating_add(content)
                .saturating_add(msg.files.len());
        }
        if self.is_busy() {
            total_lines = total_lines.saturating_add(2);
        }
        total_lines.min(u16::MAX as usize) as u16
    }

    pub fn scroll_chat_to_bottom(&mut self) {
        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };
        self.chat_scroll = self.chat_line_count().saturating_sub(visible_height);
    }

    pub fn scroll_chat(&mut self, delta: i32) {
        let max = self.chat_line_count().saturating_sub(self.chat_height);
        self.chat_scroll = scrolled(self.chat_scroll, delta, max);
    }

    pub fn scroll_artifact(&mut self, delta: i32) {
        let max = self.artifact_lines.saturating_sub(self.artifact_height);
        self.artifact_scroll = scrolled(self.artifact_scroll, delta, max);
    }

    // Download picker

    /// Offer formats for the open conversation, or the selected row on the list
    pub fn open_download_picker(&mut self) {
        let target = match self.screen {
            Screen::Detail => self
                .session
                .as_ref()
                .map(|s| (s.id().to_string(), self.goal.clone())),
            Screen::List => self
                .selected_conversation()
                .map(|c| (c.id.clone(), c.goal.clone())),
        };
        if target.is_none() {
            return;
        }
        self.download_target = target;
        self.show_download_picker = true;
        let markdown = ExportFormat::all()
            .iter()
            .position(|f| *f == ExportFormat::Markdown);
        self.download_state.select(markdown);
    }

    pub fn download_nav_down(&mut self) {
        let len = ExportFormat::all().len();
        let i = self.download_state.selected().unwrap_or(0);
        self.download_state.select(Some((i + 1).min(len - 1)));
    }

    pub fn download_nav_up(&mut self) {
        let i = self.download_state.selected().unwrap_or(0);
        self.download_state.select(Some(i.saturating_sub(1)));
    }

    pub fn selected_format(&self) -> Option<ExportFormat> {
        self.download_state
            .selected()
            .and_then(|i| ExportFormat::all().get(i).copied())
    }

    /// Render the latest artifact in the picked format and write it to disk
    pub async fn download_selected(&mut self) {
        let (Some(format), Some((id, _))) = (self.selected_format(), self.download_target.take())
        else {
            return;
        };
        self.show_download_picker = false;

        let result = match download_artifact(&self.client, &id, format, &self.exporter).await {
            Ok(download) => download.save_to(&self.download_dir).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(path) => {
                info!(path = %path.display(), "artifact saved");
                self.status = Some(format!("Saved {}", path.display()));
            }
            Err(e) => self.show_error("download failed", &e),
        }
    }
}

fn scrolled(current: u16, delta: i32, max: u16) -> u16 {
    let next = (current as i32 + delta).clamp(0, max as i32);
    next as u16
}
