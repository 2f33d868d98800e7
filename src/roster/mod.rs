//! Guild roster and killboard statistics from the game's web APIs.

pub mod fetch;
pub mod killboard;
pub mod provider;

pub use fetch::{HttpFetcher, JsonSource};
pub use killboard::fetch_killboard;
pub use provider::{Roster, RosterProvider};
