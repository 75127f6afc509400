use crate::{
    app::App,
    enablement::ENABLED_VALUE,
    host::{DialogView, TableAttribute},
    library::{InstallState, ModEntry},
    logging::level_label,
    reference::Status,
};
use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::Level;
use ratatui::{
    prelude::*,
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Cell, Clear, Padding, Paragraph, Row, Table, TableState, Wrap},
};
use std::{io, time::Duration};

const LOG_PANEL_HEIGHT: u16 = 8;

#[derive(Clone)]
struct Theme {
    accent: Color,
    accent_soft: Color,
    border: Color,
    text: Color,
    muted: Color,
    success: Color,
    warning: Color,
    error: Color,
    header_bg: Color,
    log_bg: Color,
}

impl Theme {
    fn new() -> Self {
        Self {
            accent: Color::Rgb(120, 190, 255),
            accent_soft: Color::Rgb(70, 110, 160),
            border: Color::Rgb(65, 75, 90),
            text: Color::Rgb(220, 230, 240),
            muted: Color::Rgb(135, 145, 155),
            success: Color::Rgb(120, 220, 140),
            warning: Color::Rgb(230, 200, 120),
            error: Color::Rgb(235, 100, 95),
            header_bg: Color::Rgb(22, 28, 36),
            log_bg: Color::Rgb(16, 20, 26),
        }
    }

    fn panel(&self, title: &'static str) -> Block<'static> {
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(self.border))
            .title(Span::styled(
                title,
                Style::default().fg(self.accent).add_modifier(Modifier::BOLD),
            ))
            .padding(Padding {
                left: 1,
                right: 1,
                top: 0,
                bottom: 0,
            })
    }

    fn selected(&self) -> Style {
        Style::default()
            .bg(self.accent_soft)
            .fg(Color::Black)
            .add_modifier(Modifier::BOLD)
    }

    fn status_style(&self, label: &str) -> Style {
        let color = if label == Status::Enabled.label() {
            self.success
        } else if label == Status::Installing.label() {
            self.warning
        } else if label == Status::Uninstalled.label() || label == Status::NeverInstalled.label() {
            self.error
        } else if label == Status::Disabled.label() {
            self.text
        } else {
            self.muted
        };
        Style::default().fg(color)
    }
}

pub fn run(app: &mut App) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_loop(terminal: &mut Terminal<impl Backend>, app: &mut App) -> Result<()> {
    loop {
        app.poll_events();
        if app.take_dirty() {
            app.clamp_selection();
        }
        terminal.draw(|frame| draw(frame, app))?;

        if app.should_quit {
            break;
        }

        if event::poll(Duration::from_millis(200))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(app, key)?;
                }
            }
        }
    }

    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    if app.dialogs.is_open() {
        handle_dialog_mode(app, key);
        return Ok(());
    }
    handle_normal_mode(app, key);
    Ok(())
}

fn handle_dialog_mode(app: &mut App, key: KeyEvent) {
    let dialogs = app.dialogs.clone();
    match key.code {
        KeyCode::Up | KeyCode::Char('k') => dialogs.move_cursor(-1),
        KeyCode::Down | KeyCode::Char('j') => dialogs.move_cursor(1),
        KeyCode::Char(' ') => dialogs.select_cursor(),
        KeyCode::Left | KeyCode::Char('h') => dialogs.cycle_action(-1),
        KeyCode::Right | KeyCode::Char('l') | KeyCode::Tab => dialogs.cycle_action(1),
        KeyCode::Enter => {
            let label = dialogs.view().and_then(|view| {
                view.request
                    .actions
                    .get(view.action)
                    .map(|action| action.label.clone())
            });
            dialogs.confirm();
            app.status = format!("Dialog closed: {}", label.unwrap_or_default());
            app.mark_dirty();
        }
        KeyCode::Esc => {
            dialogs.cancel();
            app.status = "Canceled".to_string();
        }
        _ => {}
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') => app.should_quit = true,
        KeyCode::Up | KeyCode::Char('k') => app.move_selection(-1),
        KeyCode::Down | KeyCode::Char('j') => app.move_selection(1),
        KeyCode::Char(' ') => app.toggle_selected(),
        KeyCode::Char('e') | KeyCode::Char('E') => app.set_selected(ENABLED_VALUE),
        KeyCode::Char('d') | KeyCode::Char('D') => app.set_selected("disabled"),
        KeyCode::Char('r') | KeyCode::Char('R') => app.open_reference_dialog(),
        KeyCode::Char('p') | KeyCode::Char('P') => app.cycle_profile(),
        KeyCode::Char('f') | KeyCode::Char('F') => app.cycle_filter(),
        KeyCode::Char('c') | KeyCode::Char('C') => {
            if let Err(err) = app.toggle_reference_column() {
                app.status = format!("Saving settings failed: {err}");
                log::error!("Saving settings failed: {err:#}");
            }
        }
        KeyCode::Char('s') | KeyCode::Char('S') => match app.save() {
            Ok(()) => app.status = "Library saved".to_string(),
            Err(err) => {
                app.status = format!("Save failed: {err}");
                log::error!("Save failed: {err:#}");
            }
        },
        _ => {}
    }
}

fn draw(frame: &mut Frame<'_>, app: &App) {
    let area = frame.size();
    let theme = Theme::new();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(6),
            Constraint::Length(3),
            Constraint::Length(LOG_PANEL_HEIGHT),
        ])
        .split(area);

    frame.render_widget(header(app, &theme), chunks[0]);
    draw_mods(frame, app, &theme, chunks[1]);

    let status_block = theme.panel("Status");
    let status_inner = status_block.inner(chunks[2]);
    let footer = Paragraph::new(status_bar_line(app, status_inner.width))
        .style(Style::default().fg(theme.text))
        .block(status_block);
    frame.render_widget(footer, chunks[2]);

    let log_block = theme.panel("Log").style(Style::default().bg(theme.log_bg));
    let log_inner = log_block.inner(chunks[3]);
    let log = Paragraph::new(build_log_lines(app, &theme, log_inner.height as usize))
        .style(Style::default().fg(theme.text).bg(theme.log_bg))
        .block(log_block);
    frame.render_widget(log, chunks[3]);

    if let Some(view) = app.dialogs.view() {
        draw_dialog(frame, &view, &theme);
    }
}

fn header(app: &App, theme: &Theme) -> Paragraph<'static> {
    let active = app.active_profile();
    let profile_label = active
        .as_ref()
        .map(|profile| profile.name.clone())
        .unwrap_or_else(|| "none".to_string());
    let game_label = active
        .as_ref()
        .map(|profile| profile.game_id.clone())
        .unwrap_or_default();
    let (reference_label, reference_style) = match app.reference_profile() {
        Some(profile) => (profile.name.clone(), Style::default().fg(theme.success)),
        None => ("not set".to_string(), Style::default().fg(theme.muted)),
    };
    let filter_label = app.filter.clone().unwrap_or_else(|| "all".to_string());

    Paragraph::new(vec![
        Line::from(vec![
            Span::styled(
                "refprofile",
                Style::default().fg(theme.accent).add_modifier(Modifier::BOLD),
            ),
            Span::raw("  "),
            Span::styled(game_label, Style::default().fg(theme.text)),
        ]),
        Line::from(vec![
            Span::styled("Profile: ", Style::default().fg(theme.muted)),
            Span::styled(profile_label, Style::default().fg(theme.accent)),
            Span::raw("   "),
            Span::styled("Reference: ", Style::default().fg(theme.muted)),
            Span::styled(reference_label, reference_style),
            Span::raw("   "),
            Span::styled("Filter: ", Style::default().fg(theme.muted)),
            Span::styled(filter_label, Style::default().fg(theme.text)),
        ]),
    ])
    .style(Style::default().bg(theme.header_bg))
    .alignment(Alignment::Center)
}

fn draw_mods(frame: &mut Frame<'_>, app: &App, theme: &Theme, area: Rect) {
    let mods = app.visible_mods();
    if mods.is_empty() {
        let empty = Paragraph::new("No mods match.")
            .style(Style::default().fg(theme.muted))
            .block(theme.panel("Mods"))
            .alignment(Alignment::Center);
        frame.render_widget(empty, area);
        return;
    }

    let columns = app.columns();
    let active = app.active_profile();
    let rows: Vec<Row<'static>> = mods
        .iter()
        .map(|entry| {
            let enabled = active
                .as_ref()
                .is_some_and(|profile| profile.is_mod_enabled(&entry.id));
            row_for_entry(entry, enabled, &columns, theme)
        })
        .collect();

    let mut widths = vec![
        Constraint::Length(6),
        Constraint::Min(16),
        Constraint::Length(12),
    ];
    let mut titles = vec![Cell::from("Active"), Cell::from("Mod"), Cell::from("Install")];
    for column in &columns {
        widths.push(Constraint::Length(column_width(column)));
        titles.push(Cell::from(column.name.clone()));
    }

    let table = Table::new(rows, widths)
        .header(
            Row::new(titles)
                .style(Style::default().fg(theme.text).add_modifier(Modifier::BOLD)),
        )
        .column_spacing(1)
        .block(theme.panel("Mods"))
        .highlight_style(theme.selected())
        .highlight_symbol(">");

    let mut state = TableState::default();
    state.select(Some(app.selected));
    frame.render_stateful_widget(table, area, &mut state);
}

fn column_width(column: &TableAttribute<ModEntry>) -> u16 {
    let widest = Status::NeverInstalled.label().len().max(column.name.len());
    widest as u16 + 1
}

fn row_for_entry(
    entry: &ModEntry,
    enabled: bool,
    columns: &[&TableAttribute<ModEntry>],
    theme: &Theme,
) -> Row<'static> {
    let (enabled_text, enabled_style) = if enabled {
        ("[x]", Style::default().fg(theme.success))
    } else {
        ("[ ]", Style::default().fg(theme.muted))
    };
    let install = entry.state.as_ref().map_or("-", InstallState::label).to_string();
    let mut cells = vec![
        Cell::from(enabled_text).style(enabled_style),
        Cell::from(entry.display_name().to_string()),
        Cell::from(install).style(Style::default().fg(theme.muted)),
    ];
    for column in columns {
        let value = (column.calc)(entry);
        let style = theme.status_style(&value);
        cells.push(Cell::from(value).style(style));
    }
    Row::new(cells)
}

fn status_bar_line(app: &App, width: u16) -> String {
    let width = width as usize;
    if width == 0 {
        return String::new();
    }
    let left = format!("Status: {}", app.status);
    let right = if app.dialogs.is_open() {
        "Space select | Tab button | Enter confirm | Esc cancel"
    } else {
        "Space toggle | e/d set | r reference | p profile | f filter | c column | q quit"
    };

    if left.len() + right.len() + 1 > width {
        let available = width.saturating_sub(left.len() + 1);
        let mut trimmed_right = right.to_string();
        if trimmed_right.len() > available {
            trimmed_right.truncate(available);
        }
        return format!("{left} {trimmed_right}");
    }

    let spaces = width - left.len() - right.len();
    format!("{left}{}{right}", " ".repeat(spaces))
}

fn build_log_lines(app: &App, theme: &Theme, height: usize) -> Vec<Line<'static>> {
    if height == 0 {
        return Vec::new();
    }
    let entries = app.logs.tail(height);
    if entries.is_empty() {
        return vec![Line::from(Span::styled(
            "No recent events.",
            Style::default().fg(theme.muted),
        ))];
    }

    entries
        .into_iter()
        .map(|entry| {
            let color = match entry.level {
                Level::Error => theme.error,
                Level::Warn => theme.warning,
                Level::Info => theme.accent,
                Level::Debug | Level::Trace => theme.muted,
            };
            Line::from(vec![
                Span::styled(
                    format!("[{}]", level_label(entry.level)),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                ),
                Span::raw(" "),
                Span::styled(entry.message, Style::default().fg(theme.text)),
            ])
        })
        .collect()
}

fn draw_dialog(frame: &mut Frame<'_>, view: &DialogView, theme: &Theme) {
    let area = frame.size();
    let request = &view.request;

    let mut lines = vec![
        Line::from(Span::styled(
            request.title.clone(),
            Style::default().fg(theme.accent).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(
            request.text.clone(),
            Style::default().fg(theme.muted),
        )),
        Line::from(""),
    ];
    for (index, choice) in request.choices.iter().enumerate() {
        let marker = if view.selected == Some(index) { "(*)" } else { "( )" };
        let style = if view.cursor == index {
            theme.selected()
        } else {
            Style::default().fg(theme.text)
        };
        lines.push(Line::from(Span::styled(
            format!("{marker} {}", choice.text),
            style,
        )));
    }
    lines.push(Line::from(""));

    let mut buttons = vec![Span::raw(" ")];
    for (index, action) in request.actions.iter().enumerate() {
        let style = if view.action == index {
            Style::default()
                .fg(Color::Black)
                .bg(theme.accent)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(theme.text)
        };
        buttons.push(Span::styled(format!(" {} ", action.label), style));
        buttons.push(Span::raw("   "));
    }
    lines.push(Line::from(buttons));

    let height = (lines.len() as u16 + 2).min(area.height.saturating_sub(2));
    let width = area.width.saturating_mul(2) / 3;
    let width = width.clamp(34, area.width.saturating_sub(2).max(34));
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    let dialog_area = Rect::new(x, y, width.min(area.width), height);

    frame.render_widget(Clear, dialog_area);
    let dialog_block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.accent_soft))
        .style(Style::default().bg(theme.header_bg));
    let dialog = Paragraph::new(lines)
        .block(dialog_block)
        .style(Style::default().fg(theme.text))
        .wrap(Wrap { trim: false });
    frame.render_widget(dialog, dialog_area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_colors_follow_labels() {
        let theme = Theme::new();
        assert_eq!(theme.status_style("Enabled").fg, Some(theme.success));
        assert_eq!(theme.status_style("Installing").fg, Some(theme.warning));
        assert_eq!(theme.status_style("Never Installed").fg, Some(theme.error));
        assert_eq!(theme.status_style("N/A").fg, Some(theme.muted));
    }
}
