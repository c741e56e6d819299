pub mod controller;
pub mod exclusion;
pub mod history;

pub use controller::{NavigationController, ViewState};
pub use exclusion::{ExclusionReason, ExclusionRegistry};
pub use history::{History, SharedHistory};
