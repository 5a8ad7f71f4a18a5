//! Core entities. Wire shapes for storage are camelCase JSON; remote row
//! shapes live in `remote::rows`.

pub mod achievement;
pub mod identity;
pub mod pending;
pub mod preferences;
pub mod progress;
pub mod session_record;

pub use achievement::Achievement;
pub use identity::{AuthenticatedIdentity, GuestIdentity, IdentityMode, PersistedSession, UserIdentity, UserProfile};
pub use pending::{DeadLetter, PendingAction, PendingOp};
pub use preferences::{AgeGroup, Preferences, TextSize, Theme};
pub use progress::{accuracy_of, Progress};
pub use session_record::SessionRecord;
