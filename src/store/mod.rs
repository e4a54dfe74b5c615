//! Data store modules for Supabase integration

pub mod highscores;
pub mod supabase;

pub use highscores::HighscoreStore;
pub use supabase::SupabaseClient;
