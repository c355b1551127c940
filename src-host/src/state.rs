//! Application state management

use std::sync::Arc;

use parley_core::Host;

use crate::collaborators::{
    DirectoryLocales, FileChooser, HeadlessFileChooser, HeadlessWindow, IdleState, LocaleProvider,
    StateMonitor, UpdateState, WindowControl,
};

/// Shared state handed to every command handler
#[derive(Clone)]
pub struct AppState {
    host: Host,
    window: Arc<dyn WindowControl>,
    files: Arc<dyn FileChooser>,
    locales: Arc<dyn LocaleProvider>,
    idle: StateMonitor<IdleState>,
    updates: StateMonitor<UpdateState>,
}

impl AppState {
    /// State with headless collaborators and locales read from the configured directory
    pub fn new(host: Host) -> Self {
        let locales = DirectoryLocales::new(host.config().locale_dir.clone());
        Self {
            host,
            window: Arc::new(HeadlessWindow::new()),
            files: Arc::new(HeadlessFileChooser::new()),
            locales: Arc::new(locales),
            idle: StateMonitor::new(IdleState::Active),
            updates: StateMonitor::new(UpdateState::none()),
        }
    }

    pub fn with_window(mut self, window: Arc<dyn WindowControl>) -> Self {
        self.window = window;
        self
    }

    pub fn with_file_chooser(mut self, files: Arc<dyn FileChooser>) -> Self {
        self.files = files;
        self
    }

    pub fn with_locales(mut self, locales: Arc<dyn LocaleProvider>) -> Self {
        self.locales = locales;
        self
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn window(&self) -> &Arc<dyn WindowControl> {
        &self.window
    }

    pub fn files(&self) -> &Arc<dyn FileChooser> {
        &self.files
    }

    pub fn locales(&self) -> &Arc<dyn LocaleProvider> {
        &self.locales
    }

    pub fn idle(&self) -> &StateMonitor<IdleState> {
        &self.idle
    }

    pub fn updates(&self) -> &StateMonitor<UpdateState> {
        &self.updates
    }
}
