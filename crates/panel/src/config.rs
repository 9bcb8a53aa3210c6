use reftree_core::history::DEFAULT_HISTORY_CAP;
use reftree_core::tree::Grouping;
use serde::Deserialize;

/// Panel behavior knobs, deserialized from whatever configuration surface
/// the host provides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PanelConfig {
    /// Nest files under compacted per-folder nodes.
    pub group_by_folder: bool,
    /// Path prefix (workspace root) folder segments are taken relative to.
    pub folder_base: Option<String>,
    pub history_cap: usize,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            group_by_folder: false,
            folder_base: None,
            history_cap: DEFAULT_HISTORY_CAP,
        }
    }
}

impl PanelConfig {
    pub fn grouping(&self) -> Grouping {
        if self.group_by_folder {
            Grouping::ByFolder {
                base: self.folder_base.clone(),
            }
        } else {
            Grouping::Flat
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_flat_and_capped() {
        let cfg: PanelConfig = serde_json::from_str("{}").unwrap();
        assert!(!cfg.group_by_folder);
        assert_eq!(cfg.history_cap, DEFAULT_HISTORY_CAP);
    }

    #[test]
    fn folder_grouping_round_trips() {
        let cfg: PanelConfig =
            serde_json::from_str(r#"{"groupByFolder": true, "folderBase": "/ws"}"#).unwrap();
        assert!(matches!(cfg.grouping(), Grouping::ByFolder { base: Some(b) } if b == "/ws"));
    }
}
