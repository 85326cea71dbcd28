pub mod preferences;

pub use preferences::{
    FilterPreferences, HighlightPreferences, Preferences, PreferencesError, PreferencesStore,
    SessionPreferences,
};
