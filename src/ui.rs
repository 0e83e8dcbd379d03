use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};
use vikal::backend::{Exam, Style as ExplanationStyle};
use vikal::session::{Persistence, TRIAL_QUOTA};

use crate::app::{App, Field, InputMode, Level, Picker, Screen, TextInput};

pub const TERMS: &[&str] = &[
    "Welcome to Vikal! By using our AI-powered study platform, you agree to these Terms.",
    "",
    "1. AI-Generated Content: Vikal provides AI-generated study materials. Verify information independently.",
    "2. Accounts: Keep your sign-in private. Free accounts get 3 chats.",
    "3. Intellectual Property: Personal and educational use is allowed; redistribution requires permission.",
    "4. Acceptable Use: Do not misuse the service or attempt to disrupt it.",
    "5. Third-Party Links: We do not control or endorse third-party content.",
    "6. Changes to Terms: Continued use implies acceptance of updated Terms.",
    "7. Termination: Access may be suspended for violations of these Terms.",
    "8. Governing Law: These Terms follow the laws of India.",
];

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("**") {
        let after = &rest[start + 2..];
        match after.find("**") {
            Some(end) if end > 0 => {
                if start > 0 {
                    spans.push(Span::raw(rest[..start].to_string()));
                }
                spans.push(Span::styled(
                    after[..end].to_string(),
                    Style::default().add_modifier(Modifier::BOLD),
                ));
                rest = &after[end + 2..];
            }
            // No closing **, treat as literal
            _ => break,
        }
    }

    if !rest.is_empty() {
        spans.push(Span::raw(rest.to_string()));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(2));
    Rect::new(
        area.x + (area.width.saturating_sub(width)) / 2,
        area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    )
}

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
        Screen::SignIn => render_sign_in(app, frame, body_area),
        Screen::Dashboard => render_dashboard(app, frame, body_area),
        Screen::Video => render_video(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);

    // Render popups (in order of priority)
    if app.terms_blocking() {
        render_terms_modal(frame, area);
    } else if let Some(picker) = app.picker {
        render_picker(app, picker, frame, area);
    } else if app.show_trial_end {
        render_trial_end(app, frame, area);
    } else if app.show_pro_modal {
        render_pro_modal(app, frame, area);
    }

    render_notifications(app, frame, area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let state = app.session.state();
    let quota = match state.chats_left() {
        None => Span::styled(" Unlimited Chats (Pro) ", Style::default().fg(Color::Green).bold()),
        Some(left) => Span::styled(
            format!(" Chats Left: {}/{} ", left, TRIAL_QUOTA),
            Style::default().fg(if left == 0 { Color::Red } else { Color::Yellow }),
        ),
    };

    let mut spans = vec![
        Span::styled(" VIKAL ", Style::default().fg(Color::Black).bg(Color::Yellow).bold()),
        Span::styled(
            format!(" v{} ", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ];
    if app.is_signed_in() {
        spans.push(quota);
        spans.push(Span::styled(
            format!(" {} ", app.user_id()),
            Style::default().fg(Color::Cyan),
        ));
    }
    if let Persistence::MemoryOnly { .. } = app.session.persistence() {
        spans.push(Span::styled(
            " storage unavailable: chats not saved ",
            Style::default().fg(Color::Black).bg(Color::Red),
        ));
    }

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match app.screen {
        Screen::SignIn => " SIGN IN ",
        Screen::Dashboard if app.solve_mode => " SOLVE ",
        Screen::Dashboard => " EXPLAIN ",
        Screen::Video => " VIDEO ",
    };

    let hints = match (app.screen, app.input_mode) {
        (_, InputMode::Editing) => "Enter: submit  Esc: cancel",
        (Screen::SignIn, _) => "i: enter user id  q: quit",
        (Screen::Dashboard, _) if app.solve_mode => {
            "i: ask  m: explain mode  e: exam  s: style  f: feedback  v: video  u: pro  O: sign out  q: quit"
        }
        (Screen::Dashboard, _) => "i: ask  m: solve mode  j/k: scroll  f: feedback  v: video  u: pro  O: sign out  q: quit",
        (Screen::Video, _) => "i: video url  c: chat  d: dashboard  O: sign out  q: quit",
    };

    let footer = Line::from(vec![
        Span::styled(mode_text, mode_style),
        Span::raw(" "),
        Span::styled(hints, Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(Paragraph::new(footer), area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect, field: Field, title: &str, input: &TextInput) {
    let editing = app.input_mode == InputMode::Editing && app.field == field;
    let border = if editing { Color::Yellow } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .title(format!(" {} ", title));
    let inner = block.inner(area);
    frame.render_widget(Paragraph::new(input.value.as_str()).block(block), area);

    if editing {
        let cursor_x = (input.cursor as u16).min(inner.width.saturating_sub(1));
        frame.set_cursor_position((inner.x + cursor_x, inner.y));
    }
}

fn render_sign_in(app: &App, frame: &mut Frame, area: Rect) {
    let popup = centered(area, 60, 9);
    let [intro_area, input_area] =
        Layout::vertical([Constraint::Length(5), Constraint::Length(3)]).areas(popup);

    let intro = Paragraph::new(vec![
        Line::from("Sign in to Vikal").bold().fg(Color::Yellow),
        Line::from(""),
        Line::from("AI study notes for UPSC, GATE and RRB."),
        Line::from(format!("Free accounts get {} chats.", TRIAL_QUOTA)).fg(Color::DarkGray),
    ])
    .alignment(Alignment::Center);
    frame.render_widget(intro, intro_area);

    render_input(app, frame, input_area, Field::SignIn, "User id", &app.sign_in_input);
}

fn render_dashboard(app: &App, frame: &mut Frame, area: Rect) {
    let [main_area, side_area] =
        Layout::horizontal([Constraint::Percentage(70), Constraint::Percentage(30)]).areas(area);

    let [options_area, input_area, answer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(3),
        Constraint::Min(0),
    ])
    .areas(main_area);

    render_query_options(app, frame, options_area);

    let title = if app.solve_mode {
        "Enter your problem (e.g., Solve 2x + 3 = 7)"
    } else {
        "Type your topic (e.g., How does the internet work?)"
    };
    render_input(app, frame, input_area, Field::Query, title, &app.query_input);
    render_answer(app, frame, answer_area);

    let [stats_area, history_area, feedback_area] = Layout::vertical([
        Constraint::Length(5),
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(side_area);

    render_stats(app, frame, stats_area);
    render_history(app, frame, history_area);
    render_input(app, frame, feedback_area, Field::Feedback, "Feedback", &app.feedback_input);
}

fn render_query_options(app: &App, frame: &mut Frame, area: Rect) {
    let mut spans = vec![Span::styled(
        if app.solve_mode { " Solve " } else { " Explain " },
        Style::default().fg(Color::Black).bg(Color::Cyan),
    )];
    if app.solve_mode {
        let exam = app.selected_exam.map_or("Select Exam", |e| e.display_name());
        let style = app.selected_style.map_or("Select Style", |s| s.display_name());
        spans.push(Span::raw(format!("  Exam: {}  Style: {}", exam, style)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_answer(app: &App, frame: &mut Frame, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title(" Notes ");

    let mut lines: Vec<Line> = Vec::new();
    if app.query_loading() {
        let dots = ".".repeat(app.animation_frame as usize + 1);
        lines.push(Line::from(format!("Thinking{}", dots)).fg(Color::Yellow));
    } else if let Some(answer) = &app.answer {
        lines.extend(answer.notes.lines().map(parse_markdown_line));

        // Flashcards are only meaningful for explanations
        if !app.solve_mode && !answer.flashcards.is_empty() {
            lines.push(Line::default());
            lines.push(Line::from("Flashcards").bold().fg(Color::Magenta));
            for (front, back) in answer.flashcard_pairs() {
                lines.push(Line::from(vec![
                    Span::styled(format!("Q: {}", front), Style::default().bold()),
                    Span::raw("  "),
                    Span::styled(format!("A: {}", back), Style::default().fg(Color::Gray)),
                ]));
            }
        }

        if !answer.resources.is_empty() {
            lines.push(Line::default());
            lines.push(Line::from("Resources").bold().fg(Color::Cyan));
            for resource in &answer.resources {
                lines.push(Line::from(vec![
                    Span::raw(format!("• {} ", resource.title)),
                    Span::styled(resource.url.clone(), Style::default().fg(Color::Blue).underlined()),
                ]));
            }
        }
    } else {
        lines.push(Line::from("Ask a question to get AI-generated notes.").fg(Color::DarkGray));
    }

    let paragraph = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.answer_scroll, 0));
    frame.render_widget(paragraph, area);
}

fn render_stats(app: &App, frame: &mut Frame, area: Rect) {
    let stats = app.stats;
    let lines = vec![
        Line::from(format!("Active users: {}", stats.active_users)),
        Line::from(format!("Questions solved: {}", stats.questions_solved)),
        Line::from(format!("Explanations given: {}", stats.explanations_given)),
    ];
    let block = Block::default().borders(Borders::ALL).title(" Live Stats ");
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_history(app: &App, frame: &mut Frame, area: Rect) {
    let items: Vec<ListItem> = app
        .session
        .state()
        .history
        .iter()
        .map(|record| {
            ListItem::new(vec![
                Line::from(record.question.clone()).bold(),
                Line::from(format!("  {}", record.mode.label())).fg(Color::DarkGray),
            ])
        })
        .collect();

    let block = Block::default().borders(Borders::ALL).title(" Recent Chats ");
    frame.render_widget(List::new(items).block(block), area);
}

fn render_video(app: &App, frame: &mut Frame, area: Rect) {
    let [url_area, summary_area, chat_input_area, chat_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Percentage(55),
        Constraint::Length(3),
        Constraint::Min(0),
    ])
    .areas(area);

    render_input(app, frame, url_area, Field::VideoUrl, "YouTube URL", &app.video_url_input);

    let mut lines: Vec<Line> = Vec::new();
    if app.summarize_task.is_some() {
        lines.push(Line::from("Summarizing...").fg(Color::Yellow));
    } else if let Some(summary) = &app.video_summary {
        lines.extend(summary.summary.lines().map(parse_markdown_line));
        if !summary.resources.is_empty() {
            lines.push(Line::default());
            lines.push(Line::from("Resources").bold().fg(Color::Cyan));
            for resource in &summary.resources {
                lines.push(Line::from(format!("• {} {}", resource.title, resource.url)));
            }
        }
    } else {
        lines.push(Line::from("Paste a YouTube link to get a summary.").fg(Color::DarkGray));
    }
    let summary = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title(" Summary "))
        .wrap(Wrap { trim: false });
    frame.render_widget(summary, summary_area);

    render_input(app, frame, chat_input_area, Field::VideoChat, "Ask about the video", &app.video_chat_input);

    let response = if app.video_chat_task.is_some() {
        Text::from("Thinking...")
    } else {
        app.video_chat_response
            .as_deref()
            .map(|r| Text::from(r.lines().map(parse_markdown_line).collect::<Vec<_>>()))
            .unwrap_or_default()
    };
    let chat = Paragraph::new(response)
        .block(Block::default().borders(Borders::ALL).title(" Answer "))
        .wrap(Wrap { trim: false });
    frame.render_widget(chat, chat_area);
}

fn render_terms_modal(frame: &mut Frame, area: Rect) {
    let popup = centered(area, 90, TERMS.len() as u16 + 5);
    frame.render_widget(Clear, popup);

    let mut lines: Vec<Line> = TERMS.iter().map(|l| Line::from(*l)).collect();
    lines.push(Line::default());
    lines.push(Line::from("Press Enter to accept, q to quit").fg(Color::Yellow).bold());

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Terms and Conditions ");
    frame.render_widget(Paragraph::new(lines).block(block).wrap(Wrap { trim: true }), popup);
}

fn render_trial_end(app: &App, frame: &mut Frame, area: Rect) {
    let popup = centered(area, 60, 7);
    frame.render_widget(Clear, popup);

    let lines = vec![
        Line::from(format!("Your {} free chats are up.", TRIAL_QUOTA)),
        Line::from("Upgrade to Pro for unlimited access!"),
        Line::default(),
        Line::from(format!("u: upgrade ({})  Esc: close", app.config.payment_link)).fg(Color::DarkGray),
    ];
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(" Trial Ended ");
    frame.render_widget(Paragraph::new(lines).block(block).wrap(Wrap { trim: true }), popup);
}

fn render_pro_modal(app: &App, frame: &mut Frame, area: Rect) {
    let popup = centered(area, 64, 11);
    frame.render_widget(Clear, popup);

    let lines = vec![
        Line::from(format!("You've hit your {} free chats. Go Pro for unlimited learning!", TRIAL_QUOTA)),
        Line::default(),
        Line::from("- Unlimited chats"),
        Line::from("- Exam-focused solutions"),
        Line::from("- Custom exam dates (soon)"),
        Line::default(),
        Line::from(format!("Payment: {}", app.config.payment_link)).fg(Color::Blue),
        Line::from("u: go pro now  f: leave feedback  Esc: maybe later").fg(Color::DarkGray),
    ];
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Upgrade to VIKAL Pro ");
    frame.render_widget(Paragraph::new(lines).block(block).wrap(Wrap { trim: true }), popup);
}

fn render_picker(app: &mut App, picker: Picker, frame: &mut Frame, area: Rect) {
    let (title, options): (&str, Vec<&str>) = match picker {
        Picker::Exam => (" Select Exam ", Exam::all().iter().map(|e| e.display_name()).collect()),
        Picker::Style => (
            " Select Style ",
            ExplanationStyle::all().iter().map(|s| s.display_name()).collect(),
        ),
    };

    let popup = centered(area, 36, options.len() as u16 + 2);
    frame.render_widget(Clear, popup);

    let items: Vec<ListItem> = options.iter().map(|o| ListItem::new(format!(" {} ", o))).collect();
    let list = List::new(items)
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

    frame.render_stateful_widget(list, popup, &mut app.picker_state);
}

fn render_notifications(app: &App, frame: &mut Frame, area: Rect) {
    let width = 50.min(area.width);
    for (i, notification) in app.notifications.iter().rev().take(3).enumerate() {
        let color = match notification.level {
            Level::Info => Color::Blue,
            Level::Success => Color::Green,
            Level::Warning => Color::Yellow,
            Level::Error => Color::Red,
        };
        let y = area.y + 1 + (i as u16) * 3;
        if y + 3 > area.bottom() {
            break;
        }
        let rect = Rect::new(area.right().saturating_sub(width), y, width, 3);
        frame.render_widget(Clear, rect);
        let toast = Paragraph::new(notification.message.as_str())
            .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(color)))
            .wrap(Wrap { trim: true });
        frame.render_widget(toast, rect);
    }
}
