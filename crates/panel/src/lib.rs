pub mod adapter;
pub mod config;
pub mod controller;
pub mod highlight;

pub use adapter::{AdapterChange, DisplayItem, PanelModel, TreeAdapter, TreeHandle};
pub use config::PanelConfig;
pub use controller::{PanelObserver, PanelState, SessionController};
pub use highlight::HighlightSync;
