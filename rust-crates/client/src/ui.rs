use crate::client::AppSnapshot;
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        self,
        Event,
        KeyCode,
        KeyEventKind,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use ethers::types::U256;
use predict_client::{
    chain::IdentityKind,
    leaderboard::{
        estimate_caveat,
        position_of,
    },
    orchestrator::TxLifecycle,
    types::{
        Match,
        MatchStatus,
        View,
        format_currency,
        kickoff_label,
        short_address,
        sort_for_display,
    },
};
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::{
    self,
    Stdout,
    stdout,
};
use tokio::sync::mpsc;

const MAX_SCORE_DIGITS: usize = 3;

#[derive(Debug, PartialEq, Eq)]
pub enum UserEvent {
    Quit,
    Redraw,
    SwitchView(View),
    Refresh,
    Dismiss,
    ToggleWallet,
    Claim,
    SubmitPrediction {
        match_id: U256,
        home: String,
        away: String,
    },
}

pub type InputEventReceiver = mpsc::UnboundedReceiver<io::Result<Event>>;

/// Reads terminal input on a dedicated thread so the async loop never blocks.
pub fn input_event_stream() -> InputEventReceiver {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            let next = event::read();
            let failed = next.is_err();
            if tx.send(next).is_err() || failed {
                break;
            }
        }
    });
    rx
}

pub async fn next_raw_event(input_events: &mut InputEventReceiver) -> Result<Event> {
    match input_events.recv().await {
        Some(event) => Ok(event?),
        None => Err(eyre!("terminal input stream closed")),
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Overlay {
    #[default]
    None,
    Pending,
    Dismissible,
}

pub struct UiState {
    mode: Mode,
    view: View,
    selected: usize,
    rows: Vec<(MatchStatus, Match)>,
    overlay: Overlay,
    terminal: Option<Terminal<CrosstermBackend<Stdout>>>,
}

impl Default for UiState {
    fn default() -> Self {
        UiState {
            mode: Mode::Normal,
            view: View::Home,
            selected: 0,
            rows: Vec::new(),
            overlay: Overlay::None,
            terminal: None,
        }
    }
}

impl UiState {
    pub fn view(&self) -> View {
        self.view
    }

    pub fn show(&mut self, view: View) {
        self.view = view;
        self.mode = Mode::Normal;
    }

    fn selected_row(&self) -> Option<&(MatchStatus, Match)> {
        self.rows.get(self.selected)
    }
}

#[derive(Clone, Debug, Default)]
enum Mode {
    #[default]
    Normal,
    BetModal(BetState),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum ScoreField {
    #[default]
    Home,
    Away,
}

#[derive(Clone, Debug, Default)]
struct BetState {
    match_id: U256,
    fixture: String,
    home: String,
    away: String,
    focus: ScoreField,
}

impl BetState {
    fn focused(&mut self) -> &mut String {
        match self.focus {
            ScoreField::Home => &mut self.home,
            ScoreField::Away => &mut self.away,
        }
    }

    fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            ScoreField::Home => ScoreField::Away,
            ScoreField::Away => ScoreField::Home,
        };
    }
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(
        stdout(),
        crossterm::terminal::EnterAlternateScreen,
        crossterm::event::EnableMouseCapture
    )?;
    let backend = CrosstermBackend::new(stdout());
    state.terminal = Some(Terminal::new(backend)?);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(
        stdout(),
        crossterm::event::DisableMouseCapture,
        crossterm::terminal::LeaveAlternateScreen
    )?;
    Ok(())
}

/// Caches what key handling needs from the snapshot, then renders.
pub fn draw(state: &mut UiState, snap: &AppSnapshot) -> Result<()> {
    sync_state(state, snap);
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, snap))?;
        state.terminal = Some(term);
    }
    Ok(())
}

fn sync_state(state: &mut UiState, snap: &AppSnapshot) {
    state.rows = sort_for_display(
        &snap.market.matches,
        |id| snap.market.has_prediction(id),
        snap.now,
    );
    state.selected = state.selected.min(state.rows.len().saturating_sub(1));
    state.overlay = match &snap.lifecycle {
        TxLifecycle::Idle => Overlay::None,
        TxLifecycle::Pending { .. } => Overlay::Pending,
        TxLifecycle::Success { .. } | TxLifecycle::Error { .. } => Overlay::Dismissible,
    };
}

pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    let Event::Key(k) = event else {
        return matches!(event, Event::Resize(..)).then_some(UserEvent::Redraw);
    };
    if k.kind != KeyEventKind::Press {
        return None;
    }

    match state.overlay {
        Overlay::Pending => {
            return matches!(k.code, KeyCode::Char('q')).then_some(UserEvent::Quit);
        }
        Overlay::Dismissible => {
            return matches!(k.code, KeyCode::Enter | KeyCode::Esc)
                .then_some(UserEvent::Dismiss);
        }
        Overlay::None => {}
    }

    if let Mode::BetModal(bs) = &mut state.mode {
        return match k.code {
            KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Left | KeyCode::Right => {
                bs.toggle_focus();
                Some(UserEvent::Redraw)
            }
            KeyCode::Backspace => {
                bs.focused().pop();
                Some(UserEvent::Redraw)
            }
            KeyCode::Char(c) if c.is_ascii_digit() => {
                let field = bs.focused();
                if field.len() < MAX_SCORE_DIGITS {
                    field.push(c);
                }
                Some(UserEvent::Redraw)
            }
            KeyCode::Enter => {
                let event = UserEvent::SubmitPrediction {
                    match_id: bs.match_id,
                    home: bs.home.clone(),
                    away: bs.away.clone(),
                };
                state.mode = Mode::Normal;
                Some(event)
            }
            _ => None,
        };
    }

    match k.code {
        KeyCode::Char('q') | KeyCode::Esc => Some(UserEvent::Quit),
        KeyCode::Tab | KeyCode::Right | KeyCode::Char('l') => {
            state.show(state.view.next());
            Some(UserEvent::SwitchView(state.view))
        }
        KeyCode::BackTab | KeyCode::Left | KeyCode::Char('h') => {
            state.show(state.view.previous());
            Some(UserEvent::SwitchView(state.view))
        }
        KeyCode::Char(c @ '1'..='4') => {
            let idx = c as usize - '1' as usize;
            state.show(View::ALL[idx]);
            Some(UserEvent::SwitchView(state.view))
        }
        KeyCode::Down | KeyCode::Char('j') if state.view == View::Home => {
            if state.selected + 1 < state.rows.len() {
                state.selected += 1;
            }
            Some(UserEvent::Redraw)
        }
        KeyCode::Up | KeyCode::Char('k') if state.view == View::Home => {
            state.selected = state.selected.saturating_sub(1);
            Some(UserEvent::Redraw)
        }
        KeyCode::Enter | KeyCode::Char('b') if state.view == View::Home => {
            let bet = match state.selected_row()? {
                (MatchStatus::Open, m) => BetState {
                    match_id: m.id,
                    fixture: m.fixture(),
                    ..BetState::default()
                },
                _ => return None,
            };
            state.mode = Mode::BetModal(bet);
            Some(UserEvent::Redraw)
        }
        KeyCode::Char('c') => Some(UserEvent::Claim),
        KeyCode::Char('w') => Some(UserEvent::ToggleWallet),
        KeyCode::Char('r') => Some(UserEvent::Refresh),
        _ => None,
    }
}

fn ui(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
        ])
        .split(f.area());

    draw_tabs(f, state, chunks[0]);
    draw_identity(f, chunks[1], snap);
    match state.view {
        View::Home => draw_matches(f, state, chunks[2], snap),
        View::MyBets => draw_my_bets(f, chunks[2], snap),
        View::Wallet => draw_wallet(f, chunks[2], snap),
        View::Leaderboard => draw_leaderboard(f, chunks[2], snap),
    }
    draw_help(f, chunks[3]);
    draw_modals(f, state, snap);
}

fn draw_tabs(f: &mut Frame, state: &UiState, area: Rect) {
    let titles: Vec<Line> = View::ALL.iter().map(|v| Line::from(v.title())).collect();
    let selected = View::ALL.iter().position(|v| *v == state.view).unwrap_or(0);
    let tabs = Tabs::new(titles)
        .select(selected)
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
        .block(Block::default().borders(Borders::ALL).title("Prediction Market"));
    f.render_widget(tabs, area);
}

fn draw_identity(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let (badge, color) = match snap.connection.map(|c| c.kind) {
        Some(IdentityKind::Interactive) => ("WALLET", Color::Cyan),
        Some(IdentityKind::Platform) => ("PLATFORM", Color::Magenta),
        None => ("CONNECTING", Color::DarkGray),
    };
    let address = snap
        .connection
        .map(|c| short_address(&c.address))
        .unwrap_or_else(|| "-".to_string());
    let mut spans = vec![
        Span::styled(format!(" {badge} "), Style::default().fg(Color::Black).bg(color)),
        Span::raw(format!(" {address} | {} ", snap.network_name)),
    ];
    if snap.interactive_forced {
        spans.push(Span::raw("| embedded wallet"));
    } else if !snap.wallet_available {
        spans.push(Span::styled("| no wallet configured", Style::default().fg(Color::DarkGray)));
    }
    let widget = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title("Identity"));
    f.render_widget(widget, area);
}

fn status_style(status: MatchStatus) -> Style {
    match status {
        MatchStatus::Open => Style::default().fg(Color::Green),
        MatchStatus::Predicted => Style::default().fg(Color::Cyan),
        MatchStatus::Missed => Style::default().fg(Color::DarkGray),
        MatchStatus::Settled => Style::default().fg(Color::Blue),
    }
}

fn draw_matches(f: &mut Frame, state: &UiState, area: Rect, snap: &AppSnapshot) {
    let mut lines: Vec<Line> = Vec::new();
    if state.rows.is_empty() {
        lines.push(Line::from("No active matches"));
    }
    for (idx, (status, m)) in state.rows.iter().enumerate() {
        let cursor = if idx == state.selected { ">" } else { " " };
        lines.push(Line::from(vec![
            Span::raw(format!("{cursor} ")),
            Span::styled(format!("{:<9}", status.label()), status_style(*status)),
            Span::raw(format!(
                " {:<32} {:<20} pool {} {}",
                m.fixture(),
                kickoff_label(m.kickoff_time, snap.now),
                format_currency(m.prize_pool, snap.decimals),
                snap.currency_symbol
            )),
        ]));
    }
    let title = format!(
        "Matches (entry {} {})",
        format_currency(snap.entry_fee, snap.decimals),
        snap.currency_symbol
    );
    let widget = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(widget, area);
}

fn draw_my_bets(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let mut lines: Vec<Line> = Vec::new();
    if snap.market.predictions.is_empty() {
        lines.push(Line::from("No predictions yet"));
    }
    for entry in &snap.market.predictions {
        let result = match entry.match_data.final_score() {
            Some((home, away)) => format!("final {home}-{away}"),
            None => kickoff_label(entry.match_data.kickoff_time, snap.now),
        };
        let outcome_color = match entry.outcome_label() {
            "WON" => Color::Green,
            "LOST" => Color::Red,
            _ => Color::Yellow,
        };
        lines.push(Line::from(vec![
            Span::styled(
                format!("{:<8}", entry.outcome_label()),
                Style::default().fg(outcome_color),
            ),
            Span::raw(format!(
                "{:<32} pick {}-{}  {:<20} staked {} {}",
                entry.match_data.fixture(),
                entry.prediction.home_score,
                entry.prediction.away_score,
                result,
                format_currency(entry.prediction.amount, snap.decimals),
                snap.currency_symbol
            )),
        ]));
    }
    let widget = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("My Bets"));
    f.render_widget(widget, area);
}

fn draw_wallet(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let amount = |value: U256| format!("{} {}", format_currency(value, snap.decimals), snap.currency_symbol);
    let address = snap
        .market
        .account
        .map(|a| format!("{a:?}"))
        .unwrap_or_else(|| "-".to_string());
    let mut lines = vec![
        Line::from(format!("Address:          {address}")),
        Line::from(format!("Balance:          {}", amount(snap.market.account_balance))),
        Line::from(format!("Claimable:        {}", amount(snap.market.winnings))),
        Line::from(format!("Perfect scores:   {}", snap.market.perfect_wins())),
        Line::from(format!("Market holdings:  {}", amount(snap.market.contract_balance))),
    ];
    if let Some(admin) = snap.admin_address {
        lines.push(Line::from(format!("Market admin:     {}", short_address(&admin))));
    }
    lines.push(Line::from(""));
    lines.push(Line::from("c claim winnings | w toggle wallet mode"));
    let widget = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Wallet"));
    f.render_widget(widget, area);
}

fn draw_leaderboard(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(3)])
        .split(area);

    let me = snap.market.account;
    let position = match (&snap.leaderboard, me) {
        (Some(entries), Some(me)) => position_of(entries, &me)
            .map(|p| format!("#{p}"))
            .unwrap_or_else(|| "unranked".to_string()),
        _ => "-".to_string(),
    };
    let header = Paragraph::new(vec![
        Line::from(format!(
            "You: {position} | perfect scores {}",
            snap.market.perfect_wins()
        )),
        Line::from(Span::styled(
            estimate_caveat(snap.platform_fee_percent),
            Style::default().fg(Color::DarkGray),
        )),
    ])
    .wrap(Wrap { trim: true })
    .block(Block::default().borders(Borders::ALL).title("Leaderboard"));
    f.render_widget(header, chunks[0]);

    let Some(entries) = &snap.leaderboard else {
        let loading = Paragraph::new("Loading settled matches...")
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(loading, chunks[1]);
        return;
    };
    let rows = entries.iter().enumerate().map(|(idx, entry)| {
        let style = if Some(entry.address) == me {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        };
        Row::new(vec![
            format!("{}", idx + 1),
            short_address(&entry.address),
            entry.wins.to_string(),
            entry.predictions.to_string(),
            format!(
                "{} {}",
                format_currency(entry.estimated_winnings, snap.decimals),
                snap.currency_symbol
            ),
        ])
        .style(style)
    });
    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(16),
            Constraint::Length(6),
            Constraint::Length(12),
            Constraint::Min(14),
        ],
    )
    .header(
        Row::new(vec!["Rank", "Address", "Wins", "Predictions", "Est. earnings"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(table, chunks[1]);
}

fn draw_help(f: &mut Frame, area: Rect) {
    let help = Paragraph::new(
        "Tab/←/→ views | j/k select | Enter bet | c claim | w wallet mode | r refresh | q quit",
    )
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}

fn draw_modals(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    if let Mode::BetModal(bs) = &state.mode {
        let area = centered_rect(50, 30, f.area());
        let block = Block::default().borders(Borders::ALL).title("Place Prediction");
        let field = |label: &str, value: &str, focused: bool| {
            let style = if focused {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            Line::from(Span::styled(format!("{label}: [{value:<3}]"), style))
        };
        let lines = vec![
            Line::from(bs.fixture.clone()),
            Line::from(format!(
                "Stake: {} {}",
                format_currency(snap.entry_fee, snap.decimals),
                snap.currency_symbol
            )),
            field("Home", &bs.home, bs.focus == ScoreField::Home),
            field("Away", &bs.away, bs.focus == ScoreField::Away),
            Line::from(""),
            Line::from("digits edit | Tab switch | Enter confirm | Esc cancel"),
        ];
        f.render_widget(Clear, area);
        f.render_widget(block.clone(), area);
        f.render_widget(Paragraph::new(lines), block.inner(area));
    }

    let (title, color, hint) = match &snap.lifecycle {
        TxLifecycle::Idle => return,
        TxLifecycle::Pending { .. } => ("Working", Color::Yellow, None),
        TxLifecycle::Success { .. } => ("Success", Color::Green, Some("Enter/Esc to close")),
        TxLifecycle::Error { .. } => ("Error", Color::Red, Some("Enter/Esc to dismiss")),
    };
    let area = centered_rect(50, 25, f.area());
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(Style::default().fg(color));
    let mut lines = vec![Line::from(snap.lifecycle.message().unwrap_or_default().to_string())];
    if let (TxLifecycle::Success { .. }, Some(url)) = (&snap.lifecycle, &snap.last_tx_url) {
        lines.push(Line::from(url.clone()));
    }
    if let Some(hint) = hint {
        lines.push(Line::from(""));
        lines.push(Line::from(hint));
    }
    f.render_widget(Clear, area);
    f.render_widget(block.clone(), area);
    f.render_widget(
        Paragraph::new(lines).wrap(Wrap { trim: false }),
        block.inner(area),
    );
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use crossterm::event::{
        KeyEvent,
        KeyModifiers,
    };
    use predict_client::{
        chain::OperationKind,
        reconciler::MarketView,
    };

    fn key(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn snapshot_with_open_match(now: u64) -> AppSnapshot {
        AppSnapshot {
            market: MarketView {
                matches: vec![Match {
                    id: U256::from(7),
                    home_team: "Ghana".to_string(),
                    away_team: "Togo".to_string(),
                    kickoff_time: now + 600,
                    ..Match::default()
                }],
                ..MarketView::default()
            },
            now,
            ..AppSnapshot::default()
        }
    }

    #[test]
    fn interpret_event__bet_modal_flow__submits_typed_scores() {
        // given
        let mut state = UiState::default();
        draw(&mut state, &snapshot_with_open_match(1_000)).unwrap();

        // when
        interpret_event(&mut state, key(KeyCode::Enter));
        interpret_event(&mut state, key(KeyCode::Char('2')));
        interpret_event(&mut state, key(KeyCode::Tab));
        interpret_event(&mut state, key(KeyCode::Char('1')));
        let event = interpret_event(&mut state, key(KeyCode::Enter));

        // then
        assert_eq!(
            event,
            Some(UserEvent::SubmitPrediction {
                match_id: U256::from(7),
                home: "2".to_string(),
                away: "1".to_string(),
            })
        );
        assert!(matches!(state.mode, Mode::Normal));
    }

    #[test]
    fn interpret_event__match_already_started__no_bet_modal() {
        // given
        let mut state = UiState::default();
        let mut snap = snapshot_with_open_match(1_000);
        snap.now = 5_000;
        draw(&mut state, &snap).unwrap();

        // when
        let event = interpret_event(&mut state, key(KeyCode::Enter));

        // then
        assert_eq!(event, None);
        assert!(matches!(state.mode, Mode::Normal));
    }

    #[test]
    fn interpret_event__pending_status__cannot_be_dismissed() {
        // given
        let mut state = UiState::default();
        let mut snap = snapshot_with_open_match(1_000);
        snap.lifecycle = TxLifecycle::Pending {
            operation: OperationKind::Predict,
            message: "Confirming on chain...".to_string(),
        };
        draw(&mut state, &snap).unwrap();

        // then
        assert_eq!(interpret_event(&mut state, key(KeyCode::Esc)), None);
        assert_eq!(interpret_event(&mut state, key(KeyCode::Char('c'))), None);

        snap.lifecycle = TxLifecycle::Error {
            operation: OperationKind::Predict,
            message: "Transaction failed".to_string(),
        };
        draw(&mut state, &snap).unwrap();
        assert_eq!(
            interpret_event(&mut state, key(KeyCode::Esc)),
            Some(UserEvent::Dismiss)
        );
    }

    #[test]
    fn interpret_event__tab__cycles_views() {
        let mut state = UiState::default();

        assert_eq!(
            interpret_event(&mut state, key(KeyCode::Tab)),
            Some(UserEvent::SwitchView(View::MyBets))
        );
        assert_eq!(
            interpret_event(&mut state, key(KeyCode::BackTab)),
            Some(UserEvent::SwitchView(View::Home))
        );
        assert_eq!(
            interpret_event(&mut state, key(KeyCode::Char('4'))),
            Some(UserEvent::SwitchView(View::Leaderboard))
        );
    }
}
