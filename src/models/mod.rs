pub mod preferences;
pub mod tab;

pub use preferences::{ListKind, Preferences};
pub use tab::{TabId, TabRegistry, TabSnapshot};
