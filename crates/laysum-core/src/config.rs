//! Session behaviour switches shared by every front end.

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Default number of days an assignment stays visible to its annotator.
pub const DEFAULT_WINDOW_DAYS: i32 = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Persist after every mutation instead of only on submit.
    pub autosave: bool,
    /// Strip leading/trailing whitespace from selections.
    pub trim_selection: bool,
    /// Refuse submission until every item in the session has been rated.
    pub require_all_started: bool,
    /// Assignment window applied to users without their own setting.
    pub default_window_days: i32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            autosave: false,
            trim_selection: true,
            require_all_started: false,
            default_window_days: DEFAULT_WINDOW_DAYS,
        }
    }
}

impl SessionConfig {
    /// Parse a JSON config; missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SessionConfig::default();
        assert!(!config.autosave);
        assert!(config.trim_selection);
        assert_eq!(config.default_window_days, 7);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = SessionConfig::from_json(r#"{"autosave": true}"#).unwrap();
        assert!(config.autosave);
        assert!(config.trim_selection);
        assert!(!config.require_all_started);
    }

    #[test]
    fn malformed_json_is_config_error() {
        assert!(matches!(
            SessionConfig::from_json("{autosave"),
            Err(CoreError::Config(_))
        ));
    }
}
