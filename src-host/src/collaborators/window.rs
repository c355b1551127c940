use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;

pub const MIN_ZOOM: f64 = 0.25;
pub const MAX_ZOOM: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WindowState {
    Normal,
    Minimized,
    Maximized,
    Closed,
}

/// Control surface of the main window
pub trait WindowControl: Send + Sync + 'static {
    fn minimize(&self) -> anyhow::Result<WindowState>;
    fn maximize(&self) -> anyhow::Result<WindowState>;
    fn restore(&self) -> anyhow::Result<WindowState>;
    fn close(&self) -> anyhow::Result<WindowState>;
    fn state(&self) -> WindowState;

    fn zoom(&self) -> f64;
    /// Returns the level actually applied, clamped to `MIN_ZOOM..=MAX_ZOOM`
    fn set_zoom(&self, level: f64) -> anyhow::Result<f64>;

    /// Returns whether dev tools are now open
    fn toggle_dev_tools(&self) -> anyhow::Result<bool>;

    /// Receiver that changes whenever the user stylesheet is modified
    fn stylesheet(&self) -> watch::Receiver<String>;
}

/// In-process window that only records what it was asked to do
pub struct HeadlessWindow {
    state: RwLock<WindowState>,
    zoom: RwLock<f64>,
    dev_tools: RwLock<bool>,
    stylesheet: watch::Sender<String>,
}

impl HeadlessWindow {
    pub fn new() -> Self {
        let (stylesheet, _) = watch::channel(String::new());
        Self {
            state: RwLock::new(WindowState::Normal),
            zoom: RwLock::new(1.0),
            dev_tools: RwLock::new(false),
            stylesheet,
        }
    }

    /// Replace the user stylesheet, notifying watchers
    pub fn publish_stylesheet(&self, css: impl Into<String>) {
        self.stylesheet.send_replace(css.into());
    }

    fn transition(&self, next: WindowState) -> anyhow::Result<WindowState> {
        let mut state = self.state.write();
        if *state == WindowState::Closed {
            anyhow::bail!("Window is closed");
        }
        *state = next;
        Ok(next)
    }
}

impl Default for HeadlessWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowControl for HeadlessWindow {
    fn minimize(&self) -> anyhow::Result<WindowState> {
        self.transition(WindowState::Minimized)
    }

    fn maximize(&self) -> anyhow::Result<WindowState> {
        self.transition(WindowState::Maximized)
    }

    fn restore(&self) -> anyhow::Result<WindowState> {
        self.transition(WindowState::Normal)
    }

    fn close(&self) -> anyhow::Result<WindowState> {
        self.transition(WindowState::Closed)
    }

    fn state(&self) -> WindowState {
        *self.state.read()
    }

    fn zoom(&self) -> f64 {
        *self.zoom.read()
    }

    fn set_zoom(&self, level: f64) -> anyhow::Result<f64> {
        if !level.is_finite() {
            anyhow::bail!("Zoom level must be a finite number");
        }
        let level = level.clamp(MIN_ZOOM, MAX_ZOOM);
        *self.zoom.write() = level;
        Ok(level)
    }

    fn toggle_dev_tools(&self) -> anyhow::Result<bool> {
        let mut open = self.dev_tools.write();
        *open = !*open;
        Ok(*open)
    }

    fn stylesheet(&self) -> watch::Receiver<String> {
        self.stylesheet.subscribe()
    }
}
