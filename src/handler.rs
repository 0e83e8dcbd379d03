use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, Field, InputMode, Picker, Screen, TextInput};
use crate::tui::AppEvent;

pub async fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize => {}
        AppEvent::Tick => app.tick(),
    }
    app.poll_tasks().await;
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    // Popups, in order of priority
    if app.terms_blocking() {
        handle_terms_modal(app, key);
    } else if app.picker.is_some() {
        handle_picker(app, key);
    } else if app.show_trial_end {
        handle_trial_end(app, key);
    } else if app.show_pro_modal {
        handle_pro_modal(app, key);
    } else {
        match app.input_mode {
            InputMode::Normal => handle_normal_mode(app, key),
            InputMode::Editing => handle_editing_mode(app, key),
        }
    }
}

fn handle_terms_modal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Enter | KeyCode::Char('a') => app.accept_terms(),
        KeyCode::Char('q') => app.should_quit = true,
        _ => {}
    }
}

fn handle_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.picker_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.picker_nav_up(),
        KeyCode::Enter => app.picker_select(),
        KeyCode::Esc => app.picker = None,
        _ => {}
    }
}

fn handle_trial_end(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('u') => app.upgrade(),
        KeyCode::Esc | KeyCode::Enter => app.show_trial_end = false,
        _ => {}
    }
}

fn handle_pro_modal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('u') => app.upgrade(),
        KeyCode::Char('f') => {
            app.show_pro_modal = false;
            start_editing(app, Field::Feedback);
        }
        KeyCode::Esc | KeyCode::Enter => app.show_pro_modal = false,
        _ => {}
    }
}

fn start_editing(app: &mut App, field: Field) {
    app.field = field;
    app.input_mode = InputMode::Editing;
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match app.screen {
        Screen::SignIn => handle_sign_in_normal(app, key),
        Screen::Dashboard => handle_dashboard_normal(app, key),
        Screen::Video => handle_video_normal(app, key),
    }
}

fn handle_sign_in_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('i') | KeyCode::Enter => start_editing(app, Field::SignIn),
        _ => {}
    }
}

fn handle_dashboard_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Inputs
        KeyCode::Char('i') | KeyCode::Char('/') | KeyCode::Enter => start_editing(app, Field::Query),
        KeyCode::Char('f') => start_editing(app, Field::Feedback),

        // Query options
        KeyCode::Char('m') => app.toggle_mode(),
        KeyCode::Char('e') if app.solve_mode => app.open_picker(Picker::Exam),
        KeyCode::Char('s') if app.solve_mode => app.open_picker(Picker::Style),

        // Answer scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(),

        KeyCode::Char('u') => app.show_pro_modal = true,
        KeyCode::Char('O') => app.sign_out(),
        KeyCode::Char('v') | KeyCode::Tab => app.screen = Screen::Video,
        _ => {}
    }
}

fn handle_video_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('i') | KeyCode::Enter => start_editing(app, Field::VideoUrl),
        KeyCode::Char('c') => start_editing(app, Field::VideoChat),
        KeyCode::Char('O') => app.sign_out(),
        KeyCode::Char('d') | KeyCode::Tab | KeyCode::Esc => app.screen = Screen::Dashboard,
        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.input_mode = InputMode::Normal,
        KeyCode::Enter => {
            app.input_mode = InputMode::Normal;
            match app.field {
                Field::SignIn => app.sign_in(),
                Field::Query => app.submit_query(),
                Field::Feedback => app.submit_feedback(),
                Field::VideoUrl => app.summarize_video(),
                Field::VideoChat => app.chat_with_video(),
            }
        }
        _ => edit_text(active_input(app), key),
    }
}

fn active_input(app: &mut App) -> &mut TextInput {
    match app.field {
        Field::SignIn => &mut app.sign_in_input,
        Field::Query => &mut app.query_input,
        Field::Feedback => &mut app.feedback_input,
        Field::VideoUrl => &mut app.video_url_input,
        Field::VideoChat => &mut app.video_chat_input,
    }
}

fn edit_text(input: &mut TextInput, key: KeyEvent) {
    match key.code {
        KeyCode::Backspace => input.backspace(),
        KeyCode::Delete => input.delete(),
        KeyCode::Left => input.left(),
        KeyCode::Right => input.right(),
        KeyCode::Home => input.home(),
        KeyCode::End => input.end(),
        KeyCode::Char(c) => input.insert(c),
        _ => {}
    }
}
