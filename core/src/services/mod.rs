//! Services module
//!
//! Business logic that coordinates the session, the repository and the
//! cipher file stores.

pub mod markdown;
pub mod migration;
pub mod notes;
pub mod salvage;
pub mod session;
pub mod settings;

pub use migration::{ImportReport, MigrationReport};
pub use notes::{HistoryEntry, Note, NoteContent, NotePage, NoteSummary, NotesService};
pub use session::{LockCallback, Session, SetupResult};
pub use settings::SettingsService;
