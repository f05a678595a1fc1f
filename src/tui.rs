use crate::api::{Backend, History, HttpBackend, PortfolioRegistry, Row};
use crate::coordinator::{
    run_upload, FetchRequest, HistoryRequest, InputCoordinator, StatusKind,
};
use crate::error::ClientResult;
use crate::fields;
use crate::format::{FieldFormatter, Sentiment};
use crate::state::{ActiveSource, FetchTicket};
use crate::views::{ChartView, DetailView, TableView};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Cell, Chart, Clear, Dataset, GraphType, Paragraph, Row as TableRow, Table, Wrap},
    Frame, Terminal,
};
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;
use tui_big_text::{BigText, PixelSize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Table,
    Manual,
    Portfolio,
    File,
}

impl Focus {
    fn all() -> &'static [Focus] {
        &[Focus::Table, Focus::Manual, Focus::Portfolio, Focus::File]
    }

    fn next(self, forward: bool) -> Focus {
        let all = Focus::all();
        let i = all.iter().position(|&f| f == self).unwrap_or(0);
        let n = all.len();
        if forward {
            all[(i + 1) % n]
        } else {
            all[(i + n - 1) % n]
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppMode {
    Normal,
    /// Typing into the focused source field.
    Editing,
    SaveName,
    ConfirmDelete(String),
}

/// Responses delivered from background requests back to the UI loop.
pub enum Message {
    Portfolios(ClientResult<PortfolioRegistry>),
    Rows(FetchTicket, ClientResult<Vec<Row>>),
    Uploaded(ClientResult<Vec<String>>),
    History(HistoryRequest, ClientResult<History>),
    Saved(String, ClientResult<()>),
    Deleted(String, ClientResult<()>),
}

pub struct App {
    pub coordinator: InputCoordinator<HttpBackend>,
    pub formatter: FieldFormatter,
    pub focus: Focus,
    pub mode: AppMode,
    pub cursor: usize,
    pub edit_input: String,
    pub should_quit: bool,
    pub pending: usize,
    sender: mpsc::UnboundedSender<Message>,
    receiver: mpsc::UnboundedReceiver<Message>,
}

impl App {
    pub fn new(coordinator: InputCoordinator<HttpBackend>, formatter: FieldFormatter) -> App {
        let (sender, receiver) = mpsc::unbounded_channel();
        App {
            coordinator,
            formatter,
            focus: Focus::Table,
            mode: AppMode::Normal,
            cursor: 0,
            edit_input: String::new(),
            should_quit: false,
            pending: 0,
            sender,
            receiver,
        }
    }

    fn spawn<F>(&mut self, request: F)
    where
        F: Future<Output = Message> + Send + 'static,
    {
        self.pending += 1;
        let sender = self.sender.clone();
        tokio::spawn(async move {
            // receiver gone means the UI already quit
            let _ = sender.send(request.await);
        });
    }

    fn backend(&self) -> HttpBackend {
        self.coordinator.backend().clone()
    }

    pub fn refresh_portfolios(&mut self) {
        let backend = self.backend();
        self.spawn(async move { Message::Portfolios(backend.portfolios().await) });
    }

    fn spawn_fetch(&mut self, request: FetchRequest) {
        let backend = self.backend();
        self.spawn(async move {
            let result = backend.tickers(&request.tickers).await;
            Message::Rows(request.ticket, result)
        });
    }

    fn spawn_history(&mut self, request: HistoryRequest) {
        let backend = self.backend();
        self.spawn(async move {
            let result = backend
                .history(&request.ticker, request.indicator, request.fallback)
                .await;
            Message::History(request, result)
        });
    }

    /// Applies every response that has arrived since the last frame.
    pub fn drain_messages(&mut self) -> bool {
        let mut changed = false;
        while let Ok(message) = self.receiver.try_recv() {
            self.pending = self.pending.saturating_sub(1);
            self.apply(message);
            changed = true;
        }
        changed
    }

    fn apply(&mut self, message: Message) {
        match message {
            Message::Portfolios(result) => self.coordinator.finish_registry(result),
            Message::Rows(ticket, result) => {
                self.coordinator.finish_fetch(ticket, result);
                let len = self.coordinator.state().rows().len();
                self.cursor = self.cursor.min(len.saturating_sub(1));
            }
            Message::Uploaded(result) => {
                if let Some(request) = self.coordinator.finish_upload(result) {
                    self.spawn_fetch(request);
                }
            }
            Message::History(request, result) => self.coordinator.finish_history(request, result),
            Message::Saved(name, result) => {
                if self.coordinator.finish_save(&name, result) {
                    self.refresh_portfolios();
                }
            }
            Message::Deleted(name, result) => {
                if self.coordinator.finish_delete(&name, result) {
                    self.refresh_portfolios();
                }
            }
        }
    }

    fn cycle_portfolio(&mut self, forward: bool) {
        let names: Vec<String> = self.coordinator.registry().keys().cloned().collect();
        if names.is_empty() {
            return;
        }
        let current = self.coordinator.inputs().portfolio.clone();
        let next = match current.and_then(|c| names.iter().position(|n| *n == c)) {
            None => 0,
            Some(i) if forward => (i + 1) % names.len(),
            Some(i) => (i + names.len() - 1) % names.len(),
        };
        self.coordinator.inputs_mut().portfolio = Some(names[next].clone());
    }

    fn cycle_indicator(&mut self, forward: bool) {
        let current = self.coordinator.state().selected_indicator().key;
        let next = fields::cycle_indicator(current, forward);
        if let Some(request) = self.coordinator.select_indicator(next.key) {
            self.spawn_history(request);
        }
    }

    fn start_editing(&mut self, focus: Focus) {
        self.focus = focus;
        self.edit_input = match focus {
            Focus::Manual => self.coordinator.inputs().manual.clone(),
            Focus::File => self.coordinator.inputs().file.clone(),
            Focus::Table | Focus::Portfolio => return,
        };
        self.mode = AppMode::Editing;
    }

    fn activate(&mut self) {
        match self.focus {
            Focus::Table => {
                let ticker = self
                    .coordinator
                    .state()
                    .rows()
                    .get(self.cursor)
                    .and_then(|r| r.ticker())
                    .map(str::to_string);
                if let Some(ticker) = ticker {
                    if let Some(request) = self.coordinator.select_ticker(&ticker) {
                        self.spawn_history(request);
                    }
                }
            }
            Focus::Portfolio => {
                let name = self.coordinator.inputs().portfolio.clone();
                if let Some(request) = self.coordinator.begin_portfolio(name.as_deref()) {
                    self.spawn_fetch(request);
                }
            }
            Focus::Manual | Focus::File => self.start_editing(self.focus),
        }
    }

    fn submit_edit(&mut self) {
        let text = std::mem::take(&mut self.edit_input);
        let mode = std::mem::replace(&mut self.mode, AppMode::Normal);
        match (mode, self.focus) {
            (AppMode::SaveName, _) => {
                if let Some(request) = self.coordinator.begin_save(&text) {
                    let backend = self.backend();
                    self.spawn(async move {
                        let result = backend.save_portfolio(&request.name, &request.tickers).await;
                        Message::Saved(request.name, result)
                    });
                }
            }
            (_, Focus::Manual) => {
                if let Some(request) = self.coordinator.begin_manual(&text) {
                    self.spawn_fetch(request);
                }
            }
            (_, Focus::File) => {
                if let Some(request) = self.coordinator.begin_upload(&text) {
                    let backend = self.backend();
                    self.spawn(async move { Message::Uploaded(run_upload(&backend, &request).await) });
                }
            }
            _ => {}
        }
    }

    pub fn handle_key(&mut self, code: KeyCode) {
        match self.mode.clone() {
            AppMode::Normal => self.handle_normal_key(code),
            AppMode::Editing | AppMode::SaveName => match code {
                KeyCode::Esc => {
                    self.mode = AppMode::Normal;
                    self.edit_input.clear();
                }
                KeyCode::Enter => self.submit_edit(),
                KeyCode::Backspace => {
                    self.edit_input.pop();
                }
                KeyCode::Char(c) => self.edit_input.push(c),
                _ => {}
            },
            AppMode::ConfirmDelete(name) => match code {
                KeyCode::Char('y') | KeyCode::Char('Y') => {
                    self.mode = AppMode::Normal;
                    let backend = self.backend();
                    self.spawn(async move {
                        let result = backend.delete_portfolio(&name).await;
                        Message::Deleted(name, result)
                    });
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    self.mode = AppMode::Normal;
                }
                _ => {}
            },
        }
    }

    fn handle_normal_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Tab => self.focus = self.focus.next(true),
            KeyCode::BackTab => self.focus = self.focus.next(false),
            KeyCode::Char('j') | KeyCode::Down => match self.focus {
                Focus::Portfolio => self.cycle_portfolio(true),
                _ => {
                    let len = self.coordinator.state().rows().len();
                    if self.cursor + 1 < len {
                        self.cursor += 1;
                    }
                }
            },
            KeyCode::Char('k') | KeyCode::Up => match self.focus {
                Focus::Portfolio => self.cycle_portfolio(false),
                _ => self.cursor = self.cursor.saturating_sub(1),
            },
            KeyCode::Enter => self.activate(),
            KeyCode::Char('m') => self.start_editing(Focus::Manual),
            KeyCode::Char('f') => self.start_editing(Focus::File),
            KeyCode::Char('p') => self.focus = Focus::Portfolio,
            KeyCode::Char('t') => self.focus = Focus::Table,
            KeyCode::Char(']') => self.cycle_indicator(true),
            KeyCode::Char('[') => self.cycle_indicator(false),
            KeyCode::Char('s') => {
                self.edit_input.clear();
                self.mode = AppMode::SaveName;
            }
            KeyCode::Char('d') => {
                if let Some(name) = self.coordinator.begin_delete() {
                    self.mode = AppMode::ConfirmDelete(name);
                }
            }
            KeyCode::Char('r') => {
                self.refresh_portfolios();
                if let Some(request) = self.coordinator.begin_refetch() {
                    self.spawn_fetch(request);
                }
            }
            _ => {}
        }
    }
}

pub async fn run_tui(mut app: App) -> io::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    app.refresh_portfolios();
    let res = run_app(&mut terminal, &mut app).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = &res {
        println!("{err:?}");
    }

    res
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if app.drain_messages() {
            debug!(pending = app.pending, "applied background responses");
        }

        // Poll with a timeout so responses keep landing while idle
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key.code);
                }
            }
        }

        // Let spawned requests make progress between frames
        tokio::task::yield_now().await;

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

fn sentiment_color(sentiment: Sentiment) -> Color {
    match sentiment {
        Sentiment::Positive => Color::Green,
        Sentiment::Negative => Color::Red,
        Sentiment::None => Color::White,
    }
}

fn focused_block(title: String, focused: bool) -> Block<'static> {
    let color = if focused { Color::Yellow } else { Color::Gray };
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color))
        .title(title)
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(14),
            Constraint::Length(1),
        ])
        .split(f.area());

    render_inputs(f, chunks[0], app);

    let main = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(68), Constraint::Percentage(32)])
        .split(chunks[1]);
    render_table(f, main[0], app);
    render_detail(f, main[1], app);
    render_chart(f, chunks[2], app);
    render_status(f, chunks[3], app);

    match &app.mode {
        AppMode::SaveName => render_prompt(f, "Save loaded tickers as", &app.edit_input, true),
        AppMode::ConfirmDelete(name) => {
            render_prompt(
                f,
                "Confirm",
                &format!("Delete portfolio '{name}'? (y/n)"),
                false,
            )
        }
        AppMode::Normal | AppMode::Editing => {}
    }
}

fn render_inputs(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(40),
            Constraint::Percentage(30),
            Constraint::Percentage(30),
        ])
        .split(area);

    let inputs = app.coordinator.inputs();
    let active = app.coordinator.state().active_source();
    let marker = |source: ActiveSource| if active == source { "● " } else { "" };
    let editing = app.mode == AppMode::Editing;
    let field_text = |focus: Focus, value: &str| {
        if editing && app.focus == focus {
            format!("{}█", app.edit_input)
        } else {
            value.to_string()
        }
    };

    let manual = Paragraph::new(field_text(Focus::Manual, &inputs.manual)).block(focused_block(
        format!(" {}Tickers [m] ", marker(ActiveSource::Manual)),
        app.focus == Focus::Manual,
    ));
    f.render_widget(manual, chunks[0]);

    let portfolio_text = match &inputs.portfolio {
        Some(name) => format!("◀ {name} ▶"),
        None if app.coordinator.registry().is_empty() => "No portfolios".to_string(),
        None => "Select... (j/k)".to_string(),
    };
    let portfolio = Paragraph::new(portfolio_text).block(focused_block(
        format!(
            " {}Portfolio [p] ({}) ",
            marker(ActiveSource::Portfolio),
            app.coordinator.registry().len()
        ),
        app.focus == Focus::Portfolio,
    ));
    f.render_widget(portfolio, chunks[1]);

    let file = Paragraph::new(field_text(Focus::File, &inputs.file)).block(focused_block(
        format!(" {}File [f] ", marker(ActiveSource::File)),
        app.focus == Focus::File,
    ));
    f.render_widget(file, chunks[2]);
}

fn render_table(f: &mut Frame, area: Rect, app: &App) {
    let view = TableView::project(app.coordinator.state(), &app.formatter);
    let block = focused_block(" Valuation ".to_string(), app.focus == Focus::Table);

    if view.is_empty() {
        let placeholder = Paragraph::new("Load tickers, a portfolio or a file to start")
            .block(block)
            .style(Style::default().fg(Color::Gray))
            .alignment(Alignment::Center);
        f.render_widget(placeholder, area);
        return;
    }

    let header_cells = view.headers.iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });
    let header = TableRow::new(header_cells).height(1).bottom_margin(1);

    let rows = view.rows.iter().enumerate().map(|(i, row)| {
        let cells = row.cells.iter().enumerate().map(|(c, value)| {
            let text = if c == 0 && row.selected {
                format!("▶ {}", value.text)
            } else {
                value.text.clone()
            };
            Cell::from(text).style(Style::default().fg(sentiment_color(value.sentiment)))
        });

        let mut style = Style::default();
        if i == app.cursor && app.focus == Focus::Table {
            style = style.bg(Color::DarkGray);
        }
        if row.selected {
            style = style.add_modifier(Modifier::BOLD);
        }
        TableRow::new(cells).height(1).style(style)
    });

    let widths: Vec<Constraint> = view
        .headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            if i == 0 {
                Constraint::Length(9)
            } else {
                Constraint::Min(h.chars().count().max(8) as u16)
            }
        })
        .collect();

    let table = Table::new(rows, widths)
        .header(header)
        .block(block)
        .style(Style::default().fg(Color::White));
    f.render_widget(table, area);
}

fn render_detail(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default().borders(Borders::ALL).title(" Details ");
    let Some(detail) = DetailView::project(app.coordinator.state(), &app.formatter) else {
        let hint = Paragraph::new("Select a ticker with Enter")
            .block(block)
            .style(Style::default().fg(Color::Gray))
            .alignment(Alignment::Center);
        f.render_widget(hint, area);
        return;
    };

    let inner = block.inner(area);
    f.render_widget(block, area);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(0)])
        .split(inner);

    let big_text = BigText::builder()
        .pixel_size(PixelSize::Quadrant)
        .style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .lines(vec![detail.ticker.clone().into()])
        .build();
    f.render_widget(big_text, chunks[0]);

    let lines: Vec<Line> = detail
        .entries
        .iter()
        .skip(1)
        .map(|entry| {
            Line::from(vec![
                Span::styled(
                    format!("{}: ", entry.label),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
                Span::styled(
                    entry.value.text.clone(),
                    Style::default().fg(sentiment_color(entry.value.sentiment)),
                ),
            ])
        })
        .collect();
    f.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), chunks[1]);
}

fn render_chart(f: &mut Frame, area: Rect, app: &App) {
    let state = app.coordinator.state();
    let indicator = state.selected_indicator();
    let title = format!(" History · {} ([ / ] to change) ", indicator.label);

    let Some(view) = ChartView::project(state, app.coordinator.history(), &app.formatter) else {
        let text = match state.selected_ticker() {
            Some(ticker) => format!("Loading history for {ticker}..."),
            None => "No ticker selected".to_string(),
        };
        let placeholder = Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL).title(title))
            .style(Style::default().fg(Color::Gray))
            .alignment(Alignment::Center);
        f.render_widget(placeholder, area);
        return;
    };

    let mut datasets = vec![Dataset::default()
        .name(view.price.name.clone())
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(Color::White))
        .data(&view.price.points)];
    if let Some(overlay) = &view.overlay {
        datasets.push(
            Dataset::default()
                .name(overlay.name.clone())
                .marker(symbols::Marker::Dot)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(Color::LightRed))
                .data(&overlay.points),
        );
    }

    let y_labels = vec![
        app.formatter.currency_text(view.y_bounds[0]),
        app.formatter.currency_text(view.y_bounds[1]),
    ];
    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {}{}", view.ticker, title)),
        )
        .x_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds(view.x_bounds)
                .labels(view.x_labels.clone()),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds(view.y_bounds)
                .labels(y_labels),
        );
    f.render_widget(chart, area);
}

fn render_status(f: &mut Frame, area: Rect, app: &App) {
    let status = app.coordinator.status();
    let color = match status.kind {
        StatusKind::Info => Color::Yellow,
        StatusKind::Success => Color::Green,
        StatusKind::Error => Color::Red,
    };
    let help = match app.mode {
        AppMode::Normal => {
            "Tab focus | j/k move | Enter select/load | s save | d delete | r refresh | q quit"
        }
        AppMode::Editing | AppMode::SaveName => "Enter submit | Esc cancel",
        AppMode::ConfirmDelete(_) => "y confirm | n cancel",
    };
    let spinner = if app.pending > 0 { "⟳ " } else { "" };
    let line = Line::from(vec![
        Span::styled(
            format!("{spinner}{}", status.message),
            Style::default().fg(color),
        ),
        Span::styled(format!("  ·  {help}"), Style::default().fg(Color::DarkGray)),
    ]);
    f.render_widget(Paragraph::new(line), area);
}

fn render_prompt(f: &mut Frame, title: &str, text: &str, show_cursor: bool) {
    let popup_area = centered_rect(50, 20, f.area());
    f.render_widget(Clear, popup_area);

    let content = if show_cursor {
        format!("{text}█")
    } else {
        text.to_string()
    };
    let prompt = Paragraph::new(content)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(format!(" {title} "))
                .title_alignment(Alignment::Center)
                .style(Style::default().bg(Color::Black)),
        )
        .style(Style::default().fg(Color::White))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    f.render_widget(prompt, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
