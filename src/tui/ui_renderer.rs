use super::app_logic::TuiApp;
use super::app_state::AppMode;
use crate::selection::TriState;
use crate::workspace::SourceKind;
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
};

fn draw_help_block(f: &mut Frame, _app: &TuiApp, area: Rect) {
    let help_text_lines_content = vec![
        Line::from("Arrows/jk: Nav | Space/Enter: Sel | Tab/o: Fold | y: Confirm | q/Esc: Quit"),
        Line::from("a/d: Sel/Desel Visible | */-: Un/Fold All | r: Rescan | x: Drop Dir | /: Filter"),
    ];
    let help_paragraph = Paragraph::new(help_text_lines_content).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Promptpack Context Builder"),
    );
    f.render_widget(help_paragraph, area);
}

fn draw_filter_input_block(f: &mut Frame, app: &TuiApp, area: Rect) {
    let input_text = format!("/{}", app.filter_input);
    let filter_paragraph = Paragraph::new(input_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Filter (Esc to cancel, Enter to apply)"),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(filter_paragraph, area);
    // The cursor is tracked in bytes; the terminal wants a column.
    let cursor_col = app.filter_input[..app.filter_cursor_pos].chars().count() as u16;
    f.set_cursor_position((area.x + 1 + cursor_col + 1, area.y + 1));
}

fn draw_main_list_block(f: &mut Frame, app: &mut TuiApp, area: Rect) {
    app.list_viewport_height = area.height.saturating_sub(2) as usize;
    app.ensure_cursor_in_viewport();

    let window = app
        .rows
        .get(app.scroll_offset..(app.scroll_offset + app.list_viewport_height).min(app.rows.len()))
        .unwrap_or(&[]);

    let list_items: Vec<ListItem> = window
        .iter()
        .map(|row| {
            let dir = &app.workspace.dirs[row.dir];
            let node = dir.tree.node(row.node);
            let expansion_prefix = if node.is_folder() {
                if dir.is_collapsed(&node.path) {
                    // The tilde flags a folder toggle still pending its
                    // write-through into the hidden subtree.
                    if dir.selection.is_stale(&node.path) {
                        "[+]~"
                    } else {
                        "[+] "
                    }
                } else {
                    "[-] "
                }
            } else {
                "    "
            };
            let selection_prefix =
                match dir.selection.state(&dir.tree, &app.workspace.whitelist, row.node) {
                    TriState::Unselected => "[ ] ",
                    TriState::Mixed => "[-] ",
                    TriState::Selected => "[x] ",
                };
            let label = if row.depth == 0 {
                match &dir.source {
                    SourceKind::PathBacked { root, .. } => root.display().to_string(),
                    SourceKind::InMemory => format!("{} (in-memory)", dir.id),
                }
            } else if node.is_folder() {
                format!("{}/", node.name)
            } else {
                node.name.clone()
            };
            let untoggleable = if node.is_folder() {
                dir.selection.folder_selectable_count(&node.path) == 0
            } else {
                !app.workspace.whitelist.is_selectable(&node.name)
            };

            let indent = "  ".repeat(row.depth);
            let mut spans = vec![Span::raw(format!(
                "{indent}{expansion_prefix}{selection_prefix}{label}"
            ))];
            if let Some(importers) = app.advisory.get(&node.path) {
                spans.push(Span::styled(
                    format!("  ← {importers} selected importer(s)"),
                    Style::default().fg(Color::Cyan),
                ));
            }
            let mut item = ListItem::new(Line::from(spans));
            if untoggleable {
                item = item.style(Style::default().fg(Color::DarkGray));
            }
            item
        })
        .collect();

    let list_title = if !app.filter_input.is_empty() && app.mode == AppMode::Normal {
        format!("Files (Filter: '{}')", app.filter_input)
    } else {
        "Select files/directories".to_string()
    };

    let list_widget = List::new(list_items)
        .block(Block::default().borders(Borders::ALL).title(list_title))
        .highlight_style(
            Style::default()
                .add_modifier(Modifier::BOLD)
                .bg(Color::DarkGray),
        )
        .highlight_symbol("❯ ");

    let mut list_state = ratatui::widgets::ListState::default();
    if app.cursor >= app.scroll_offset && app.cursor < app.scroll_offset + app.list_viewport_height
    {
        list_state.select(Some(app.cursor - app.scroll_offset));
    }
    f.render_stateful_widget(list_widget, area, &mut list_state);
}

fn draw_status_block(f: &mut Frame, app: &TuiApp, area: Rect) {
    let selected: usize = app
        .workspace
        .selections()
        .iter()
        .map(|(_, files)| files.len())
        .sum();
    let mut status = match &app.bundle {
        Some(bundle) => {
            let mut s = format!("{selected} files selected | ≈ {} tokens", bundle.token_estimate);
            if !bundle.failed.is_empty() {
                s.push_str(&format!(" | {} unreadable", bundle.failed.len()));
            }
            s
        }
        None => format!("{selected} files selected"),
    };
    if app.scheduler.pending() {
        status.push_str(" | building…");
    }
    f.render_widget(Paragraph::new(status), area);
}

pub(super) fn ui_frame(frame: &mut Frame, app: &mut TuiApp) {
    let help_lines = 2;
    let filter_input_height = if app.mode == AppMode::Filtering { 3 } else { 0 };
    let top_block_container_height = (help_lines + 2) + filter_input_height;

    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(top_block_container_height),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(frame.area());

    let top_container_area = main_chunks[0];
    let list_area = main_chunks[1];
    let status_area = main_chunks[2];

    let top_content_constraints = if app.mode == AppMode::Filtering {
        vec![
            Constraint::Length(help_lines + 2),
            Constraint::Length(filter_input_height),
        ]
    } else {
        vec![Constraint::Length(help_lines + 2)]
    };
    let top_content_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(top_content_constraints)
        .split(top_container_area);

    draw_help_block(frame, app, top_content_chunks[0]);
    if app.mode == AppMode::Filtering {
        draw_filter_input_block(frame, app, top_content_chunks[1]);
    }

    draw_main_list_block(frame, app, list_area);
    draw_status_block(frame, app, status_area);
}
