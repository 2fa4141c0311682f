use crate::api::models::TradeReceipt;
use crate::api::{BackendRestClient, ChannelHandle, LiveChannel};
use crate::chart::{candle_at, ChartLayout};
use crate::config::Config;
use crate::data::Interval;
use crate::error::OrderError;
use crate::market::{ManagerSettings, Phase, SubscriptionManager};
use crate::storage::JsonFileStore;
use crate::trading::order::{InvestmentAccount, OrderGateway, OrderSide};
use crate::ui::charts::{visible_candles, ChartCache, PriceChart};
use crate::ui::dialogs::{HelpOverlay, OrderDialog};
use crate::ui::input::{DialogType, InputMode, InputState, OrderDialogField, OrderDialogState};
use crate::ui::widgets::{StatusWidget, TooltipWidget, WatchlistWidget};
use anyhow::Result;
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame, Terminal,
};
use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{info, warn};

const NOTICE_TTL: Duration = Duration::from_secs(6);

#[derive(Debug, Clone, Copy, PartialEq)]
enum NoticeLevel {
    Info,
    Error,
}

/// Non-fatal banner shown in the footer until it expires.
struct Notice {
    message: String,
    level: NoticeLevel,
    shown_at: Instant,
}

/// Results of background order-service calls
enum OrderUpdate {
    Account(Result<Option<InvestmentAccount>, OrderError>),
    Executed {
        side: OrderSide,
        result: Result<TradeReceipt, OrderError>,
    },
}

pub struct App {
    config: Config,
    manager: SubscriptionManager,
    channel: ChannelHandle,
    gateway: Arc<dyn OrderGateway>,
    input: InputState,
    order_dialog: Option<OrderDialogState>,
    account: Option<InvestmentAccount>,
    order_tx: mpsc::UnboundedSender<OrderUpdate>,
    order_rx: mpsc::UnboundedReceiver<OrderUpdate>,
    notice: Option<Notice>,
    pointer: Option<(u16, u16)>,
    /// Chart area of the last frame, for hit-testing the pointer
    chart_area: Rect,
    chart_layout: ChartLayout,
    chart_cache: ChartCache,
    should_quit: bool,
}

impl App {
    /// Wires the backend client, the live channel and the subscription
    /// manager. Must be called from within the runtime.
    pub fn new(config: Config) -> Result<Self> {
        let client = Arc::new(BackendRestClient::new(&config.backend)?);
        let channel = LiveChannel::new(&config.backend.ws_url(), config.market.reconnect_delay()).spawn();

        let mut manager = SubscriptionManager::new(
            client.clone(),
            channel.registry(),
            ManagerSettings::from(&config.market),
        );
        if let Some(path) = &config.session.path {
            manager = manager.with_store(Box::new(JsonFileStore::new(path)));
        }
        manager.restore(&config.market.watchlist);

        let (order_tx, order_rx) = mpsc::unbounded_channel();

        let mut app = Self {
            config,
            manager,
            channel,
            gateway: client,
            input: InputState::new(),
            order_dialog: None,
            account: None,
            order_tx,
            order_rx,
            notice: None,
            pointer: None,
            chart_area: Rect::default(),
            chart_layout: ChartLayout::terminal(),
            chart_cache: ChartCache::new(),
            should_quit: false,
        };
        app.request_account();
        Ok(app)
    }

    pub fn select(&mut self, symbol: &str, interval: Interval) {
        self.manager.select(symbol, interval);
    }

    pub fn set_interval(&mut self, interval: Interval) {
        self.manager.set_interval(interval);
    }

    pub async fn run(&mut self) -> Result<()> {
        // Setup terminal
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.event_loop(&mut terminal).await;

        // Restore terminal
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        result
    }

    async fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let tick_rate = Duration::from_millis(self.config.ui.refresh_rate_ms.max(10));

        loop {
            self.manager.drain();
            self.drain_order_updates();
            self.collect_notices();

            terminal.draw(|f| self.draw(f))?;

            // Wait up to one tick for market activity, then take whatever
            // input arrived meanwhile
            let _ = tokio::time::timeout(tick_rate, self.manager.step()).await;
            while event::poll(Duration::ZERO)? {
                self.handle_event(event::read()?);
            }

            if self.should_quit {
                break;
            }
        }

        info!("Shutting down");
        Ok(())
    }

    fn notify(&mut self, level: NoticeLevel, message: impl Into<String>) {
        self.notice = Some(Notice {
            message: message.into(),
            level,
            shown_at: Instant::now(),
        });
    }

    fn collect_notices(&mut self) {
        if let Some(message) = self.manager.take_notices().pop() {
            self.notify(NoticeLevel::Error, message);
        }
        if self
            .notice
            .as_ref()
            .is_some_and(|n| n.shown_at.elapsed() > NOTICE_TTL)
        {
            self.notice = None;
        }
    }

    fn request_account(&self) {
        let gateway = Arc::clone(&self.gateway);
        let tx = self.order_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(OrderUpdate::Account(gateway.investment_account().await));
        });
    }

    fn drain_order_updates(&mut self) {
        while let Ok(update) = self.order_rx.try_recv() {
            match update {
                OrderUpdate::Account(Ok(Some(account))) => {
                    info!("Investment account {} balance {}", account.id, account.balance);
                    self.account = Some(account);
                }
                OrderUpdate::Account(Ok(None)) => {
                    warn!("No investment account found");
                    self.account = None;
                }
                OrderUpdate::Account(Err(e)) => {
                    warn!("Failed to load investment account: {}", e);
                }
                OrderUpdate::Executed {
                    side,
                    result: Ok(receipt),
                } => {
                    self.notify(
                        NoticeLevel::Info,
                        format!(
                            "{} {} x{} @ {:.2} (total {:.2})",
                            side, receipt.symbol, receipt.quantity, receipt.price_per_unit, receipt.total
                        ),
                    );
                    self.close_dialog();
                    self.request_account();
                }
                OrderUpdate::Executed {
                    side: _,
                    result: Err(e),
                } => {
                    let message = e.to_string();
                    match self.order_dialog.as_mut() {
                        Some(dialog) => {
                            dialog.submitting = false;
                            dialog.set_error(&message);
                        }
                        None => self.notify(NoticeLevel::Error, message),
                    }
                }
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => match self.input.mode.clone() {
                InputMode::Normal => self.handle_normal_key(key),
                InputMode::AddSymbol => self.handle_symbol_key(key),
                InputMode::Dialog(DialogType::Help) => self.input.close_dialog(),
                InputMode::Dialog(DialogType::Order) => self.handle_order_key(key),
            },
            Event::Mouse(mouse) => match mouse.kind {
                MouseEventKind::Moved | MouseEventKind::Drag(_) => {
                    self.pointer = Some((mouse.column, mouse.row));
                }
                _ => {}
            },
            _ => {}
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Char('?') => self.input.show_help(),
            KeyCode::Tab | KeyCode::Down => self.cycle_symbol(1),
            KeyCode::BackTab | KeyCode::Up => self.cycle_symbol(-1),
            KeyCode::Char(']') => {
                let interval = self.manager.current_interval().next();
                self.manager.set_interval(interval);
            }
            KeyCode::Char('[') => {
                let interval = self.manager.current_interval().prev();
                self.manager.set_interval(interval);
            }
            KeyCode::Char('r') => {
                if self.manager.refresh() {
                    self.notify(NoticeLevel::Info, "Reloading chart");
                }
            }
            KeyCode::Char('a') => {
                let on = self.manager.toggle_auto_refresh();
                self.notify(
                    NoticeLevel::Info,
                    format!("Auto-refresh {}", if on { "on" } else { "off" }),
                );
            }
            KeyCode::Char('/') => self.input.enter_add_symbol(),
            KeyCode::Char('d') | KeyCode::Delete => {
                if let Some(symbol) = self.manager.active_symbol().map(str::to_string) {
                    self.manager.remove_from_watchlist(&symbol);
                    self.notify(NoticeLevel::Info, format!("Removed {}", symbol));
                }
            }
            KeyCode::Char('b') => self.open_order(OrderSide::Buy),
            KeyCode::Char('s') => self.open_order(OrderSide::Sell),
            _ => {}
        }
    }

    fn handle_symbol_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter => {
                if let Some(symbol) = self.input.finish_add_symbol() {
                    let interval = self.manager.current_interval();
                    self.manager.add_to_watchlist(&symbol);
                    self.manager.select(&symbol, interval);
                }
            }
            KeyCode::Esc => {
                self.input.symbol_query.clear();
                self.input.finish_add_symbol();
            }
            KeyCode::Backspace => {
                self.input.symbol_query.pop();
            }
            KeyCode::Char(c) => self.input.push_symbol_char(c),
            _ => {}
        }
    }

    fn handle_order_key(&mut self, key: KeyEvent) {
        let Some(dialog) = self.order_dialog.as_mut() else {
            self.input.close_dialog();
            return;
        };
        // Locked while an execution is in flight
        if dialog.submitting {
            return;
        }

        match key.code {
            KeyCode::Esc => self.close_dialog(),
            KeyCode::Tab | KeyCode::Down => dialog.focus_next(),
            KeyCode::BackTab | KeyCode::Up => dialog.focus_prev(),
            KeyCode::Left | KeyCode::Right => dialog.toggle_side(),
            KeyCode::Backspace => dialog.pop_digit(),
            KeyCode::Char(c) if c.is_ascii_digit() => dialog.push_digit(c),
            KeyCode::Enter => match dialog.focused_field {
                OrderDialogField::Cancel => self.close_dialog(),
                OrderDialogField::Quantity | OrderDialogField::Submit => self.submit_order(),
            },
            _ => {}
        }
    }

    fn cycle_symbol(&mut self, delta: isize) {
        let symbols = self.manager.symbols();
        if symbols.is_empty() {
            return;
        }
        let len = symbols.len() as isize;
        let current = self
            .manager
            .active_symbol()
            .and_then(|s| symbols.iter().position(|x| x == s))
            .map(|i| i as isize)
            .unwrap_or(if delta > 0 { -1 } else { 0 });
        let next = (current + delta).rem_euclid(len) as usize;
        let interval = self.manager.current_interval();
        self.manager.select(&symbols[next], interval);
    }

    fn open_order(&mut self, side: OrderSide) {
        let Some(symbol) = self.manager.active_symbol().map(str::to_string) else {
            self.notify(NoticeLevel::Error, "Select a symbol first");
            return;
        };
        if self.account.is_none() {
            self.request_account();
        }
        self.order_dialog = Some(OrderDialogState::new(&symbol, side));
        self.input.show_order();
    }

    fn close_dialog(&mut self) {
        self.order_dialog = None;
        self.input.close_dialog();
    }

    /// Sends the order once. Failures come back to the dialog as-is and are
    /// never resubmitted automatically.
    fn submit_order(&mut self) {
        let account_id = self.account.as_ref().map(|a| a.id);
        let Some(dialog) = self.order_dialog.as_mut() else {
            return;
        };
        let Some(account_id) = account_id else {
            dialog.set_error("No investment account available");
            return;
        };

        let ticket = match dialog.ticket(account_id) {
            Ok(ticket) => ticket,
            Err(e) => {
                dialog.set_error(&e.to_string());
                return;
            }
        };
        dialog.submitting = true;

        let gateway = Arc::clone(&self.gateway);
        let tx = self.order_tx.clone();
        tokio::spawn(async move {
            let result = gateway.execute(&ticket).await;
            let _ = tx.send(OrderUpdate::Executed {
                side: ticket.side,
                result,
            });
        });
    }

    fn draw(&mut self, f: &mut Frame) {
        let size = f.area();

        // Main layout: status bar + content + footer
        let main_chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(4),
                Constraint::Min(10),
                Constraint::Length(1),
            ])
            .split(size);

        self.draw_status(f, main_chunks[0]);

        // Content: chart + watchlist
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(40), Constraint::Length(28)])
            .split(main_chunks[1]);

        self.draw_chart(f, content_chunks[0]);
        f.render_widget(
            WatchlistWidget::new(self.manager.entries(), self.manager.active_symbol()),
            content_chunks[1],
        );
        self.draw_footer(f, main_chunks[2]);

        match self.input.mode {
            InputMode::Dialog(DialogType::Help) => f.render_widget(HelpOverlay::new(), size),
            InputMode::Dialog(DialogType::Order) => {
                if let Some(dialog) = &self.order_dialog {
                    let price = self
                        .manager
                        .active_entry()
                        .and_then(|e| e.reconciler().summary())
                        .map(|s| s.current_price);
                    let balance = self.account.as_ref().map(|a| a.balance);
                    f.render_widget(OrderDialog::new(dialog, price, balance), size);
                }
            }
            _ => {}
        }
    }

    fn draw_status(&self, f: &mut Frame, area: Rect) {
        let entry = self.manager.active_entry();
        let key = entry.map(|e| e.reconciler().key());
        let summary = entry.and_then(|e| e.reconciler().summary());

        let widget = StatusWidget::new(key, summary, self.channel.is_connected())
            .phase(entry.map(|e| e.reconciler().phase()))
            .auto_refresh(self.manager.auto_refresh())
            .balance(self.account.as_ref().map(|a| a.balance));
        f.render_widget(widget, area);
    }

    fn draw_chart(&mut self, f: &mut Frame, area: Rect) {
        let inner = Block::default().borders(Borders::ALL).inner(area);
        self.chart_area = inner;

        let Some(entry) = self.manager.active_entry() else {
            f.render_widget(
                PriceChart::new(&[], "Chart").status(Some("Press / to add a symbol")),
                area,
            );
            return;
        };

        let reconciler = entry.reconciler();
        let key = reconciler.key();
        let candles = visible_candles(reconciler.candles(), inner.width, &self.chart_layout);
        let version = reconciler.buffer().map(|b| b.version()).unwrap_or(0);
        let commands = self
            .chart_cache
            .commands(key, version, inner, candles, &self.chart_layout);

        let status = match (reconciler.phase(), reconciler.last_error()) {
            (_, Some(error)) if candles.is_empty() => Some(error),
            (Phase::Loading, _) if candles.is_empty() => Some("Loading…"),
            (Phase::Ready, _) if candles.is_empty() => Some("No candles yet"),
            _ => None,
        };
        let title = format!("{} - {}", key.symbol, key.interval);
        f.render_widget(PriceChart::new(commands, &title).status(status), area);

        // Tooltip for the candle under the pointer
        if let Some((column, row)) = self.pointer {
            let inside = column >= inner.x
                && column < inner.x + inner.width
                && row >= inner.y
                && row < inner.y + inner.height;
            if inside {
                let x = (column - inner.x) as f64 + 0.5;
                if let Some(candle) = candle_at(&self.chart_layout, inner.width as f64, candles, x) {
                    f.render_widget(TooltipWidget::new(candle, (column, row)), inner);
                }
            }
        }
    }

    fn draw_footer(&self, f: &mut Frame, area: Rect) {
        let line = if self.input.mode == InputMode::AddSymbol {
            Line::from(vec![
                Span::styled(" Add symbol: ", Style::default().fg(Color::Cyan)),
                Span::styled(
                    format!("{}_", self.input.symbol_query),
                    Style::default().fg(Color::White),
                ),
                Span::styled("  (Enter to add, Esc to cancel)", Style::default().fg(Color::DarkGray)),
            ])
        } else if let Some(notice) = &self.notice {
            let color = match notice.level {
                NoticeLevel::Info => Color::Green,
                NoticeLevel::Error => Color::Red,
            };
            Line::from(Span::styled(format!(" {}", notice.message), Style::default().fg(color)))
        } else {
            Line::from(Span::styled(
                " ? help  Tab symbol  [ ] interval  r reload  b/s trade  q quit",
                Style::default().fg(Color::DarkGray),
            ))
        };
        f.render_widget(Paragraph::new(line), area);
    }
}
