mod app;
mod event;
mod input;
mod ui;

pub use app::{Activity, App, Backends, DisplayMessage, MessageRole};

use tutor_core::history::CommandHistory;
use tutor_mcp::McpSession;

/// Launch the terminal UI.
pub async fn run_tui(
    session: McpSession,
    history: CommandHistory,
    backends: Backends,
) -> anyhow::Result<()> {
    crossterm::terminal::enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    crossterm::execute!(stdout, crossterm::terminal::EnterAlternateScreen)?;

    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = ratatui::Terminal::new(backend)?;

    let app = App::new(session, history, backends);
    let result = app::run_app(&mut terminal, app).await;

    // Restore terminal
    crossterm::terminal::disable_raw_mode()?;
    crossterm::execute!(
        terminal.backend_mut(),
        crossterm::terminal::LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    result
}
