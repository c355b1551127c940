//! Native capabilities consumed by command handlers
//!
//! Each capability is a trait with a headless implementation, so the host
//! runs (and is tested) without an OS windowing layer.

mod files;
mod locales;
mod monitor;
mod window;

pub use files::{FileChooser, FileFilter, HeadlessFileChooser};
pub use locales::{DirectoryLocales, LocaleProvider};
pub use monitor::{IdleState, StateMonitor, UpdateState};
pub use window::{HeadlessWindow, WindowControl, WindowState, MAX_ZOOM, MIN_ZOOM};
