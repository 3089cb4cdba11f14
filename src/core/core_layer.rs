// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "profiles/mod.rs"]
pub mod profiles;

#[path = "leaderboard/leaderboard_service.rs"]
pub mod leaderboard;

#[path = "sessions/mod.rs"]
pub mod sessions;

#[path = "summary/formatting.rs"]
pub mod summary;
