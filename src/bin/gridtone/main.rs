//! gridtone - terminal piano-roll sequencer
//!
//! Run with: cargo run

mod app;
mod transport;
mod ui;

use color_eyre::Result;
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;

use app::App;

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let mut terminal = ratatui::init();
    execute!(std::io::stdout(), EnableMouseCapture)?;

    let result = App::new().and_then(|mut app| app.run(&mut terminal));

    let _ = execute!(std::io::stdout(), DisableMouseCapture);
    ratatui::restore();

    result
}
