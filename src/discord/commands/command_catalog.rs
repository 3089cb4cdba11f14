// Discord commands module.
// Each feature gets its own command file.

pub mod info;

pub mod leaderboard;

pub mod profile;
