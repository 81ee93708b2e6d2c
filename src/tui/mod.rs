use crate::app::{QueryLimits, Workbench};
use crate::credentials::{CredentialStore, Credentials};
use crate::db::sql::TableFilter;
use crate::db::{CellValue, ConnectionManager, Driver, QueryResult};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    Frame, Terminal,
    backend::Backend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Row, Table, TableState},
};
use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use zeroize::{Zeroize, ZeroizeOnDrop};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppState {
    ConnectionSelection,
    ProfileForm,
    TableList,
    Results,
    QueryEditor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    pub message: String,
    pub is_error: bool,
}

const FORM_LABELS: [&str; 6] = ["Name", "Host", "Port", "Username", "Password", "Database"];
const PASSWORD_FIELD: usize = 4;

/// Input form for creating or editing a profile.
#[derive(Default, Zeroize, ZeroizeOnDrop)]
pub struct ProfileForm {
    pub fields: [String; 6],
    pub focus: usize,
    /// Name of the profile being edited, `None` for a new one.
    pub editing: Option<String>,
}

impl ProfileForm {
    pub fn from_credentials(creds: &Credentials, editing: Option<String>) -> Self {
        ProfileForm {
            fields: [
                creds.name.clone(),
                creds.host.clone(),
                creds.port.clone(),
                creds.username.clone(),
                creds.password.clone(),
                creds.database.clone(),
            ],
            focus: 0,
            editing,
        }
    }

    pub fn to_credentials(&self) -> Credentials {
        Credentials {
            name: self.fields[0].trim().to_string(),
            host: self.fields[1].trim().to_string(),
            port: self.fields[2].trim().to_string(),
            username: self.fields[3].trim().to_string(),
            password: self.fields[4].clone(),
            database: self.fields[5].trim().to_string(),
        }
    }

    pub fn next_field(&mut self) {
        self.focus = (self.focus + 1) % FORM_LABELS.len();
    }

    pub fn previous_field(&mut self) {
        self.focus = (self.focus + FORM_LABELS.len() - 1) % FORM_LABELS.len();
    }

    pub fn push(&mut self, c: char) {
        self.fields[self.focus].push(c);
    }

    pub fn pop(&mut self) {
        self.fields[self.focus].pop();
    }
}

pub struct App<D: Driver> {
    pub state: AppState,
    pub bench: Workbench<D>,
    status: Rc<RefCell<Option<StatusLine>>>,
    pub connections: Vec<String>,
    pub connections_list_state: ListState,
    pub tables: Vec<String>,
    pub tables_list_state: ListState,
    /// Columns of the highlighted table.
    pub table_columns: Vec<(String, String)>,
    pub result: Option<QueryResult>,
    pub result_title: String,
    pub result_state: TableState,
    pub current_page: u32,
    pub max_page: u32,
    pub items_per_page: u32,
    pub query_input: String,
    pub form: ProfileForm,
    pub max_cell_length: usize,
}

impl<D: Driver> App<D> {
    pub fn new(
        store: CredentialStore,
        manager: ConnectionManager<D>,
        limits: QueryLimits,
        max_cell_length: usize,
    ) -> App<D> {
        let status = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&status);
        let bench = Workbench::new(
            store,
            manager,
            limits,
            Box::new(move |message: &str, is_error: bool| {
                *sink.borrow_mut() = Some(StatusLine {
                    message: message.to_string(),
                    is_error,
                });
            }),
        );

        App {
            state: AppState::ConnectionSelection,
            bench,
            status,
            connections: Vec::new(),
            connections_list_state: ListState::default(),
            tables: Vec::new(),
            tables_list_state: ListState::default(),
            table_columns: Vec::new(),
            result: None,
            result_title: String::new(),
            result_state: TableState::default(),
            current_page: 0,
            max_page: 0,
            items_per_page: 20,
            query_input: String::new(),
            form: ProfileForm::default(),
            max_cell_length,
        }
    }

    /// Loads saved profiles and highlights the preferred one.
    pub fn init(&mut self) {
        self.refresh_connections();
        let preferred = self
            .bench
            .store()
            .preferred()
            .and_then(|name| self.connections.iter().position(|c| *c == name));
        if preferred.is_some() {
            self.connections_list_state.select(preferred);
        }
    }

    fn refresh_connections(&mut self) {
        self.connections = self.bench.load_profiles();
        let selected = self
            .connections_list_state
            .selected()
            .filter(|i| *i < self.connections.len())
            .or(if self.connections.is_empty() { None } else { Some(0) });
        self.connections_list_state.select(selected);
    }

    pub fn status(&self) -> Option<StatusLine> {
        self.status.borrow().clone()
    }

    fn selected_connection(&self) -> Option<String> {
        self.connections_list_state
            .selected()
            .and_then(|i| self.connections.get(i).cloned())
    }

    fn selected_table(&self) -> Option<String> {
        self.tables_list_state
            .selected()
            .and_then(|i| self.tables.get(i).cloned())
    }

    pub async fn connect_to_selected(&mut self) {
        if let Some(name) = self.selected_connection() {
            self.connect_to_saved_connection(&name).await;
        }
    }

    pub async fn connect_to_saved_connection(&mut self, name: &str) {
        if self.bench.connect_profile(name).await {
            self.load_tables().await;
            self.state = AppState::TableList;
            self.leave_if_disconnected();
        }
    }

    /// Falls back to the connection list once the session is gone.
    fn leave_if_disconnected(&mut self) {
        let online_view = !matches!(
            self.state,
            AppState::ConnectionSelection | AppState::ProfileForm
        );
        if online_view && !self.bench.is_connected() {
            self.back_to_connections();
        }
    }

    pub async fn load_tables(&mut self) {
        self.tables = self.bench.list_tables().await;
        self.tables_list_state
            .select(if self.tables.is_empty() { None } else { Some(0) });
        self.load_columns().await;
    }

    async fn load_columns(&mut self) {
        self.table_columns = match self.selected_table() {
            Some(table) => self.bench.columns(&table).await,
            None => Vec::new(),
        };
    }

    pub async fn open_selected_table(&mut self) {
        let Some(table) = self.selected_table() else {
            return;
        };
        if let Some(result) = self.bench.browse_table(&table, &TableFilter::default()).await {
            self.show_result(result, format!("Table: {}", table));
        } else if !self.bench.is_connected() {
            self.back_to_connections();
        }
    }

    pub async fn run_query_input(&mut self) {
        let query = self.query_input.clone();
        if let Some(result) = self.bench.run_query(&query).await {
            self.show_result(result, "Query results".to_string());
        } else if !self.bench.is_connected() {
            self.back_to_connections();
        }
    }

    fn show_result(&mut self, result: QueryResult, title: String) {
        let rows = result.rows.len() as u32;
        self.result = Some(result);
        self.result_title = title;
        self.current_page = 0;
        self.max_page = rows.div_ceil(self.items_per_page).max(1);
        self.result_state
            .select(if rows == 0 { None } else { Some(0) });
        self.state = AppState::Results;
    }

    pub fn disconnect(&mut self) {
        self.bench.disconnect();
        self.back_to_connections();
    }

    fn back_to_connections(&mut self) {
        self.tables.clear();
        self.tables_list_state.select(None);
        self.table_columns.clear();
        self.result = None;
        self.state = AppState::ConnectionSelection;
    }

    pub fn open_new_form(&mut self) {
        self.form = ProfileForm::from_credentials(&Credentials::default(), None);
        self.state = AppState::ProfileForm;
    }

    pub fn open_edit_form(&mut self) {
        let Some(name) = self.selected_connection() else {
            return;
        };
        if let Some(creds) = self.bench.profile(&name) {
            self.form = ProfileForm::from_credentials(&creds, Some(name));
            self.state = AppState::ProfileForm;
        }
    }

    /// Saves the form; a renamed profile replaces the old entry.
    pub fn save_form(&mut self) {
        let creds = self.form.to_credentials();
        if !self.bench.save_profile(&creds) {
            return;
        }
        if let Some(old) = self.form.editing.clone()
            && old != creds.name
        {
            self.bench.delete_profile(&old);
        }
        self.refresh_connections();
        if let Some(index) = self.connections.iter().position(|c| *c == creds.name) {
            self.connections_list_state.select(Some(index));
        }
        self.form = ProfileForm::default();
        self.state = AppState::ConnectionSelection;
    }

    pub fn delete_selected(&mut self) {
        if let Some(name) = self.selected_connection()
            && self.bench.delete_profile(&name)
        {
            self.refresh_connections();
        }
    }

    pub fn next_connection(&mut self) {
        let i = step(self.connections_list_state.selected(), self.connections.len(), true);
        self.connections_list_state.select(i);
    }

    pub fn previous_connection(&mut self) {
        let i = step(self.connections_list_state.selected(), self.connections.len(), false);
        self.connections_list_state.select(i);
    }

    pub fn next_table(&mut self) {
        let i = step(self.tables_list_state.selected(), self.tables.len(), true);
        self.tables_list_state.select(i);
    }

    pub fn previous_table(&mut self) {
        let i = step(self.tables_list_state.selected(), self.tables.len(), false);
        self.tables_list_state.select(i);
    }

    /// Rows of the current result page.
    pub fn page_rows(&self) -> &[Vec<CellValue>] {
        let Some(result) = &self.result else {
            return &[];
        };
        let start = (self.current_page * self.items_per_page) as usize;
        let end = (start + self.items_per_page as usize).min(result.rows.len());
        if start >= end {
            &[]
        } else {
            &result.rows[start..end]
        }
    }

    pub fn next_row(&mut self) {
        let i = step(self.result_state.selected(), self.page_rows().len(), true);
        self.result_state.select(i);
    }

    pub fn previous_row(&mut self) {
        let i = step(self.result_state.selected(), self.page_rows().len(), false);
        self.result_state.select(i);
    }

    pub fn next_page(&mut self) {
        if self.current_page + 1 < self.max_page {
            self.current_page += 1;
            self.result_state.select(Some(0));
        }
    }

    pub fn previous_page(&mut self) {
        if self.current_page > 0 {
            self.current_page -= 1;
            self.result_state.select(Some(0));
        }
    }

    /// Applies one key press. Returns `true` when the user asked to quit.
    pub async fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return true;
        }

        match self.state {
            AppState::ConnectionSelection => match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return true,
                KeyCode::Down => self.next_connection(),
                KeyCode::Up => self.previous_connection(),
                KeyCode::Enter => self.connect_to_selected().await,
                KeyCode::Char('n') => self.open_new_form(),
                KeyCode::Char('e') => self.open_edit_form(),
                KeyCode::Char('d') => self.delete_selected(),
                _ => {}
            },
            AppState::ProfileForm => match key.code {
                KeyCode::Esc => {
                    self.form = ProfileForm::default();
                    self.state = AppState::ConnectionSelection;
                }
                KeyCode::Enter => self.save_form(),
                KeyCode::Tab | KeyCode::Down => self.form.next_field(),
                KeyCode::BackTab | KeyCode::Up => self.form.previous_field(),
                KeyCode::Backspace => self.form.pop(),
                KeyCode::Char(c) => self.form.push(c),
                _ => {}
            },
            AppState::TableList => match key.code {
                KeyCode::Char('q') => return true,
                KeyCode::Esc | KeyCode::Char('c') => self.disconnect(),
                KeyCode::Down => {
                    self.next_table();
                    self.load_columns().await;
                }
                KeyCode::Up => {
                    self.previous_table();
                    self.load_columns().await;
                }
                KeyCode::Enter => self.open_selected_table().await,
                KeyCode::Char('r') => self.load_tables().await,
                KeyCode::Char('/') => self.state = AppState::QueryEditor,
                _ => {}
            },
            AppState::Results => match key.code {
                KeyCode::Char('q') => return true,
                KeyCode::Esc | KeyCode::Char('t') => self.state = AppState::TableList,
                KeyCode::Char('/') => self.state = AppState::QueryEditor,
                KeyCode::Down => self.next_row(),
                KeyCode::Up => self.previous_row(),
                KeyCode::PageDown => self.next_page(),
                KeyCode::PageUp => self.previous_page(),
                _ => {}
            },
            AppState::QueryEditor => match key.code {
                KeyCode::Esc => self.state = AppState::TableList,
                KeyCode::Enter => self.run_query_input().await,
                KeyCode::Backspace => {
                    self.query_input.pop();
                }
                KeyCode::Char(c) => self.query_input.push(c),
                _ => {}
            },
        }
        self.leave_if_disconnected();
        false
    }
}

/// Moves a list selection one step, wrapping at both ends.
fn step(selected: Option<usize>, len: usize, forward: bool) -> Option<usize> {
    if len == 0 {
        return None;
    }
    Some(match (selected, forward) {
        (Some(i), true) if i + 1 < len => i + 1,
        (Some(_), true) => 0,
        (Some(0), false) => len - 1,
        (Some(i), false) => (i - 1).min(len - 1),
        (None, _) => 0,
    })
}

pub async fn run_app<B: Backend, D: Driver>(
    terminal: &mut Terminal<B>,
    mut app: App<D>,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, &mut app))?;

        if let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
            && app.handle_key(key).await
        {
            return Ok(());
        }
    }
}

fn ui<D: Driver>(f: &mut Frame, app: &mut App<D>) {
    let size = f.area();

    let content_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0), Constraint::Length(1)].as_ref())
        .split(size);

    render_status(f, app, content_chunks[0]);

    let main_area = content_chunks[1];
    match app.state {
        AppState::ConnectionSelection => render_connection_selection(f, app, main_area),
        AppState::ProfileForm => render_profile_form(f, app, main_area),
        AppState::TableList => render_table_list(f, app, main_area),
        AppState::Results => render_results(f, app, main_area),
        AppState::QueryEditor => render_query_editor(f, app, main_area),
    }

    let help = match app.state {
        AppState::ConnectionSelection => {
            "↑↓ navigate, Enter connect, 'n' new, 'e' edit, 'd' delete, 'q' quit"
        }
        AppState::ProfileForm => "Tab/↑↓ move between fields, Enter save, ESC cancel",
        AppState::TableList => {
            "↑↓ navigate, Enter browse, '/' query, 'r' refresh, ESC disconnect, 'q' quit"
        }
        AppState::Results => {
            "↑↓ rows, PageUp/PageDown pages, '/' query, 't' or ESC tables, 'q' quit"
        }
        AppState::QueryEditor => "Type a statement, Enter run, ESC back",
    };
    let help_text = Paragraph::new(Span::raw(help))
        .style(Style::default().add_modifier(Modifier::ITALIC));
    f.render_widget(help_text, content_chunks[2]);
}

fn render_status<D: Driver>(f: &mut Frame, app: &App<D>, area: Rect) {
    let (text, color) = match app.status() {
        Some(StatusLine {
            message,
            is_error: true,
        }) => (message, Color::Red),
        Some(StatusLine { message, .. }) => (message, Color::Green),
        None => (String::new(), Color::Green),
    };
    let endpoint = match app.bench.endpoint() {
        Some(endpoint) => format!("[ONLINE {}] ", endpoint),
        None => "[OFFLINE] ".to_string(),
    };
    // Only the first line fits the status bar
    let first_line = text.lines().next().unwrap_or_default().to_string();
    let line = Line::from(vec![
        Span::styled(endpoint, Style::default().add_modifier(Modifier::BOLD)),
        Span::styled(first_line, Style::default().fg(color)),
    ]);
    f.render_widget(Paragraph::new(line), area);
}

fn render_connection_selection<D: Driver>(f: &mut Frame, app: &mut App<D>, area: Rect) {
    let items: Vec<ListItem> = app
        .connections
        .iter()
        .map(|name| ListItem::new(name.as_str()))
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Select Connection"),
        )
        .highlight_style(
            Style::default()
                .bg(Color::LightGreen)
                .add_modifier(Modifier::BOLD),
        );

    f.render_stateful_widget(list, area, &mut app.connections_list_state);
}

fn render_profile_form<D: Driver>(f: &mut Frame, app: &mut App<D>, area: Rect) {
    let lines: Vec<Line> = FORM_LABELS
        .iter()
        .enumerate()
        .map(|(i, label)| {
            let value = if i == PASSWORD_FIELD {
                "*".repeat(app.form.fields[i].chars().count())
            } else {
                app.form.fields[i].clone()
            };
            let style = if i == app.form.focus {
                Style::default().fg(Color::Black).bg(Color::LightGreen)
            } else {
                Style::default()
            };
            Line::from(vec![
                Span::styled(format!("{:>9}: ", label), Style::default().add_modifier(Modifier::BOLD)),
                Span::styled(value, style),
            ])
        })
        .collect();

    let title = match &app.form.editing {
        Some(name) => format!("Edit Connection '{}'", name),
        None => "New Connection".to_string(),
    };
    let form = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(form, area);
}

fn render_table_list<D: Driver>(f: &mut Frame, app: &mut App<D>, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)].as_ref())
        .split(area);

    let items: Vec<ListItem> = app
        .tables
        .iter()
        .map(|name| ListItem::new(format!("[T] {}", name)))
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title("Tables"))
        .highlight_style(
            Style::default()
                .bg(Color::LightGreen)
                .add_modifier(Modifier::BOLD),
        );
    f.render_stateful_widget(list, chunks[0], &mut app.tables_list_state);

    let columns: Vec<ListItem> = app
        .table_columns
        .iter()
        .map(|(name, type_name)| {
            ListItem::new(Line::from(vec![
                Span::styled(name.as_str(), Style::default().fg(Color::Green)),
                Span::raw("  "),
                Span::styled(type_name.as_str(), Style::default().add_modifier(Modifier::ITALIC)),
            ]))
        })
        .collect();
    let columns = List::new(columns).block(Block::default().borders(Borders::ALL).title("Columns"));
    f.render_widget(columns, chunks[1]);
}

fn render_results<D: Driver>(f: &mut Frame, app: &mut App<D>, area: Rect) {
    let Some(result) = &app.result else {
        return;
    };

    let header_names: Vec<Span> = result
        .columns
        .iter()
        .map(|c| Span::raw(c.name.as_str()))
        .collect();
    let header_types: Vec<Span> = result
        .columns
        .iter()
        .map(|c| Span::raw(c.type_name.as_str()))
        .collect();

    let header_row_names = Row::new(header_names)
        .height(1)
        .style(Style::default().add_modifier(Modifier::BOLD));
    let header_row_types = Row::new(header_types)
        .height(1)
        .style(Style::default().add_modifier(Modifier::ITALIC));

    let max_len = app.max_cell_length;
    let selected = app.result_state.selected();
    let rows: Vec<Row> = app
        .page_rows()
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let cells: Vec<String> = row.iter().map(|cell| cell.render(max_len)).collect();
            let mut row = Row::new(cells).height(1);
            if Some(i) == selected {
                row = row.style(Style::default().bg(Color::LightBlue));
            }
            row
        })
        .collect();

    let mut table_rows = Vec::new();
    table_rows.push(header_row_names);
    table_rows.push(header_row_types);
    table_rows.extend(rows);

    let widths: Vec<Constraint> = result
        .columns
        .iter()
        .map(|_| Constraint::Percentage(100 / result.columns.len().max(1) as u16))
        .collect();

    let title = format!(
        "{} ({} rows, page {}/{})",
        app.result_title,
        result.rows.len(),
        app.current_page + 1,
        app.max_page
    );
    let table = Table::new(table_rows, widths).block(Block::default().borders(Borders::ALL).title(title));

    // Selection is drawn by hand above, the widget state is not needed here
    f.render_widget(table, area);
}

fn render_query_editor<D: Driver>(f: &mut Frame, app: &mut App<D>, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(0)].as_ref())
        .split(area);

    let input = Paragraph::new(format!("{}_", app.query_input))
        .block(Block::default().borders(Borders::ALL).title("Query"))
        .style(Style::default().fg(Color::Yellow));
    f.render_widget(input, chunks[0]);

    let tables: Vec<ListItem> = app
        .tables
        .iter()
        .map(|name| ListItem::new(name.as_str()))
        .collect();
    let tables = List::new(tables).block(Block::default().borders(Borders::ALL).title("Tables"));
    f.render_widget(tables, chunks[1]);
}
