//! Light/dark preference persisted in a [`KeyValueStore`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::store::KeyValueStore;

/// Store key holding the theme name.
pub const THEME_KEY: &str = "theme";

/// Color scheme of the rendering surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Theme {
    /// Dark text on a light background.
    Light,
    /// Light text on a dark background.
    Dark,
}

impl Theme {
    /// The name stored for this theme.
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    /// Guesses the terminal's theme from a `COLORFGBG` value such as `15;0`
    /// or `0;default;15`.  The last field is the background color index.
    pub fn from_colorfgbg(value: &str) -> Option<Self> {
        let background: u8 = value.rsplit(';').next()?.trim().parse().ok()?;
        match background {
            7 | 15 => Some(Theme::Light),
            0..=15 => Some(Theme::Dark),
            _ => None,
        }
    }

    /// The other theme.
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(Error::validation(
                format!("unknown theme {other:?}"),
                Some("theme".to_string()),
            )),
        }
    }
}

/// The active theme plus the store it is persisted in.
pub struct ThemePreference {
    store: Arc<dyn KeyValueStore>,
    current: Theme,
}

impl ThemePreference {
    /// Reads the stored theme, using `fallback` if none (or garbage) is stored.
    pub fn load(store: Arc<dyn KeyValueStore>, fallback: Theme) -> Self {
        let current = store
            .get(THEME_KEY)
            .and_then(|name| name.parse().ok())
            .unwrap_or(fallback);
        Self { store, current }
    }

    /// The active theme.
    pub fn current(&self) -> Theme {
        self.current
    }

    /// Switches and persists the theme.
    pub fn set(&mut self, theme: Theme) -> Result<()> {
        self.store.set(THEME_KEY, theme.as_str())?;
        self.current = theme;
        Ok(())
    }

    /// Flips between light and dark, returning the new theme.
    pub fn toggle(&mut self) -> Result<Theme> {
        let next = self.current.toggled();
        self.set(next)?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn parses_names() {
        assert_eq!("Dark".parse::<Theme>().unwrap(), Theme::Dark);
        assert_eq!(" light ".parse::<Theme>().unwrap(), Theme::Light);
        assert!("sepia".parse::<Theme>().is_err());
    }

    #[test]
    fn reads_terminal_background() {
        assert_eq!(Theme::from_colorfgbg("0;15"), Some(Theme::Light));
        assert_eq!(Theme::from_colorfgbg("0;default;7"), Some(Theme::Light));
        assert_eq!(Theme::from_colorfgbg("15;0"), Some(Theme::Dark));
        assert_eq!(Theme::from_colorfgbg("7;8"), Some(Theme::Dark));
        assert_eq!(Theme::from_colorfgbg("15;default"), None);
        assert_eq!(Theme::from_colorfgbg("1;200"), None);
        assert_eq!(Theme::from_colorfgbg(""), None);
    }

    #[test]
    fn falls_back_when_unset_or_invalid() {
        let store = Arc::new(MemoryStore::new());
        assert_eq!(ThemePreference::load(store.clone(), Theme::Dark).current(), Theme::Dark);
        store.set(THEME_KEY, "neon").unwrap();
        assert_eq!(ThemePreference::load(store, Theme::Light).current(), Theme::Light);
    }

    #[test]
    fn toggle_persists() {
        let store = Arc::new(MemoryStore::new());
        let mut pref = ThemePreference::load(store.clone(), Theme::Light);
        assert_eq!(pref.toggle().unwrap(), Theme::Dark);
        assert_eq!(store.get(THEME_KEY).as_deref(), Some("dark"));

        let reloaded = ThemePreference::load(store.clone(), Theme::Light);
        assert_eq!(reloaded.current(), Theme::Dark);

        pref.toggle().unwrap();
        assert_eq!(store.get(THEME_KEY).as_deref(), Some("light"));
    }
}
