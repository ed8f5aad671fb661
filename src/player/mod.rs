//! Player: interactive scrubbing of recorded scenes in the terminal.
//!
//! Each scene gets its own `PlaybackController`; the player polls input with
//! a timeout equal to the active controller's next tick deadline, pumps due
//! ticks, and redraws only the cells that changed.

pub mod controller;
pub mod shared;
pub mod ticker;

use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use crossterm::event::{self, Event, KeyEvent, KeyEventKind};
use crossterm::{cursor, execute, queue, style, terminal};
use tracing::{debug, info};

use crate::config::{PlayerConfig, matches_binding};
use crate::engine::Scene;
use crate::error::ReplayResult;
use crate::renderer::{Cell, Grid, Renderer, Rgb};

pub use controller::{PlaybackController, PlaybackOptions, PlaybackStatus, RunState};
pub use shared::SharedPlayback;
pub use ticker::Ticker;

/// Rows reserved above the canvas for the menu bar.
const CANVAS_OFFSET: u16 = 1;

/// Input poll timeout while nothing is playing.
const IDLE_POLL: Duration = Duration::from_millis(250);

const MIN_WIDTH: u16 = 20;
const MIN_HEIGHT: u16 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Redraw,
    Quit,
}

pub struct Player {
    controllers: Vec<PlaybackController>,
    active: usize,
    config: PlayerConfig,
    /// Last canvas written to the terminal; `None` forces a full redraw.
    grid: Option<Grid>,
}

impl Player {
    pub fn new(scenes: Vec<Arc<Scene>>, config: PlayerConfig) -> Result<Self> {
        if scenes.is_empty() {
            bail!("Nothing to play: the recording has no scenes");
        }
        let options = config.playback_options();
        let controllers = scenes
            .into_iter()
            .map(|scene| PlaybackController::new(scene, options))
            .collect();
        Ok(Self {
            controllers,
            active: 0,
            config,
            grid: None,
        })
    }

    /// Play in the terminal.
    ///
    /// Sets up the terminal, enters the event loop, and restores the terminal
    /// on exit (even on error).
    pub fn play(&mut self) -> Result<()> {
        let (term_w, term_h) = terminal::size()?;
        if term_w < MIN_WIDTH || term_h < MIN_HEIGHT {
            bail!(
                "Terminal too small: need {}x{}, have {}x{}",
                MIN_WIDTH,
                MIN_HEIGHT,
                term_w,
                term_h,
            );
        }

        let mut stdout = io::stdout();
        terminal::enable_raw_mode()?;
        execute!(
            stdout,
            terminal::EnterAlternateScreen,
            cursor::Hide,
            terminal::Clear(terminal::ClearType::All),
        )?;

        let result = self.run_loop(&mut stdout);

        // Always restore terminal state.
        let _ = execute!(stdout, cursor::Show, terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();

        result
    }

    fn active(&self) -> &PlaybackController {
        &self.controllers[self.active]
    }

    fn active_mut(&mut self) -> &mut PlaybackController {
        &mut self.controllers[self.active]
    }

    // -----------------------------------------------------------------------
    // Event loop
    // -----------------------------------------------------------------------

    fn run_loop(&mut self, stdout: &mut io::Stdout) -> Result<()> {
        self.render_menubar(stdout)?;
        self.render(stdout)?;

        loop {
            let timeout = self
                .active()
                .time_until_tick(Instant::now())
                .unwrap_or(IDLE_POLL);

            let mut flow = Flow::Continue;
            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        flow = self.handle_key(key);
                    }
                    Event::Resize(_, _) => {
                        execute!(stdout, terminal::Clear(terminal::ClearType::All))?;
                        self.grid = None;
                        self.render_menubar(stdout)?;
                        flow = Flow::Redraw;
                    }
                    _ => {}
                }
            }
            if flow == Flow::Quit {
                break;
            }

            // A failed tick has stopped the controller and is shown in the
            // status line.
            let fired = self.active_mut().pump(Instant::now()).unwrap_or(1);
            if flow == Flow::Redraw || fired > 0 {
                self.render(stdout)?;
            }
        }

        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) -> Flow {
        let keys = self.config.key_bindings.clone();
        let now = Instant::now();

        if matches_binding(&keys.quit, &key) || matches_binding(&keys.cancel, &key) {
            return Flow::Quit;
        }

        if matches_binding(&keys.toggle, &key) {
            self.active_mut().toggle(now);
        } else if matches_binding(&keys.step_forward, &key) {
            discard(self.active_mut().step_by(1));
        } else if matches_binding(&keys.step_back, &key) {
            discard(self.active_mut().step_by(-1));
        } else if matches_binding(&keys.seek_start, &key) {
            discard(self.active_mut().seek_start());
        } else if matches_binding(&keys.seek_end, &key) {
            discard(self.active_mut().seek_end());
        } else if matches_binding(&keys.faster, &key) {
            let rate = self.config.faster(self.active().rate());
            self.active_mut().set_rate(rate);
        } else if matches_binding(&keys.slower, &key) {
            let rate = self.config.slower(self.active().rate());
            self.active_mut().set_rate(rate);
        } else if matches_binding(&keys.reverse, &key) {
            let rate = -self.active().rate();
            self.active_mut().set_rate(rate);
        } else if matches_binding(&keys.reset, &key) {
            self.active_mut().reset();
        } else if matches_binding(&keys.next_scene, &key) {
            self.next_scene();
        } else {
            return Flow::Continue;
        }
        Flow::Redraw
    }

    /// Switch to the next scene. The scene left behind stops and keeps its
    /// step.
    fn next_scene(&mut self) {
        self.active_mut().stop();
        self.active = (self.active + 1) % self.controllers.len();
        info!(group = self.active().scene().group_id(), "switched scene");
    }

    // -----------------------------------------------------------------------
    // Terminal output
    // -----------------------------------------------------------------------

    fn render_menubar(&self, stdout: &mut io::Stdout) -> Result<()> {
        let keys = &self.config.key_bindings;
        let items = [
            format!("[{}] play/pause", keys.toggle),
            format!("[{}][{}] step", keys.step_back, keys.step_forward),
            format!("[{}][{}] ends", keys.seek_start, keys.seek_end),
            format!("[{}][{}] rate", keys.faster, keys.slower),
            format!("[{}] reverse", keys.reverse),
            format!("[{}] scene", keys.next_scene),
            format!("[{}] quit", keys.quit),
        ];

        queue!(
            stdout,
            cursor::MoveTo(0, 0),
            terminal::Clear(terminal::ClearType::CurrentLine),
            style::Print(" "),
        )?;
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                queue!(stdout, style::Print("  "))?;
            }
            print_menu_item(stdout, item)?;
        }
        stdout.flush()?;
        Ok(())
    }

    /// Redraw the canvas (changed cells only, unless the size changed) and
    /// the status line.
    fn render(&mut self, stdout: &mut io::Stdout) -> Result<()> {
        let (term_w, term_h) = terminal::size()?;
        // menu bar above, status line below
        let canvas_h = term_h.saturating_sub(CANVAS_OFFSET + 1);
        let next = Renderer::rasterize(&self.active().snapshot(), term_w, canvas_h);

        match self.grid.take() {
            Some(prev) if same_size(&prev, &next) => {
                for change in Renderer::diff(&prev, &next) {
                    queue!(stdout, cursor::MoveTo(change.x, change.y + CANVAS_OFFSET))?;
                    print_cell(stdout, &change.cell)?;
                }
            }
            _ => {
                for (y, row) in next.iter().enumerate() {
                    queue!(stdout, cursor::MoveTo(0, y as u16 + CANVAS_OFFSET))?;
                    for cell in row {
                        print_cell(stdout, cell)?;
                    }
                }
            }
        }
        self.grid = Some(next);

        self.render_status(stdout, canvas_h + CANVAS_OFFSET, term_w)?;
        stdout.flush()?;
        Ok(())
    }

    fn render_status(&self, stdout: &mut io::Stdout, status_y: u16, width: u16) -> Result<()> {
        let line = status_line(&self.active().status(), self.active + 1, self.controllers.len());
        let line: String = line.chars().take(width as usize).collect();

        let mut cs = style::ContentStyle::default();
        cs.attributes.set(style::Attribute::Dim);

        queue!(
            stdout,
            cursor::MoveTo(0, status_y),
            terminal::Clear(terminal::ClearType::CurrentLine),
            style::PrintStyledContent(style::StyledContent::new(cs, line)),
        )?;
        Ok(())
    }
}

fn discard(result: ReplayResult<usize>) {
    if let Err(err) = result {
        debug!(%err, "seek refused");
    }
}

fn same_size(a: &Grid, b: &Grid) -> bool {
    a.len() == b.len() && a.first().map(Vec::len) == b.first().map(Vec::len)
}

pub fn status_line(status: &PlaybackStatus, scene: usize, scenes: usize) -> String {
    let state = match status.state {
        RunState::Running => "\u{25b6} playing",
        RunState::Stopped => "\u{25a0} stopped",
    };
    let mut line = format!(
        " {state} | {} ({scene}/{scenes}) | step {}/{} | rate {:+.2}/s | t={:.2} ",
        status.group_id,
        status.step,
        status.total_steps.saturating_sub(1),
        status.rate,
        status.time,
    );
    if let Some(failure) = &status.failure {
        line.push_str(&format!("| {failure} "));
    }
    line
}

// ---------------------------------------------------------------------------
// Style conversion
// ---------------------------------------------------------------------------

fn print_cell(stdout: &mut io::Stdout, cell: &Cell) -> Result<()> {
    let mut cs = style::ContentStyle::default();
    cs.foreground_color = cell.fg.map(to_ct_color);
    queue!(
        stdout,
        style::PrintStyledContent(style::StyledContent::new(cs, cell.ch))
    )?;
    Ok(())
}

pub fn to_ct_color(c: Rgb) -> style::Color {
    style::Color::Rgb {
        r: c.r,
        g: c.g,
        b: c.b,
    }
}

/// Print a menu item string, bolding any text inside `[...]` brackets.
/// Text outside brackets is printed dim.
fn print_menu_item(stdout: &mut io::Stdout, item: &str) -> Result<()> {
    let mut rest = item;
    while !rest.is_empty() {
        let Some(open) = rest.find('[') else {
            queue!(
                stdout,
                style::SetAttribute(style::Attribute::Dim),
                style::Print(rest),
                style::SetAttribute(style::Attribute::Reset),
            )?;
            break;
        };
        if open > 0 {
            queue!(
                stdout,
                style::SetAttribute(style::Attribute::Dim),
                style::Print(&rest[..open]),
                style::SetAttribute(style::Attribute::Reset),
            )?;
        }
        rest = &rest[open..];
        let Some(close) = rest.find(']') else {
            queue!(stdout, style::Print(rest))?;
            break;
        };
        queue!(
            stdout,
            style::SetAttribute(style::Attribute::Bold),
            style::Print(&rest[..=close]),
            style::SetAttribute(style::Attribute::Reset),
        )?;
        rest = &rest[close + 1..];
    }
    Ok(())
}
