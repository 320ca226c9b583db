//! Named stat blocks loaded as one table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{StatBlock, TowerData};
use crate::error::{CoreError, Result};

/// Every stat block a battle may reference, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatTable {
    /// Soldier stat blocks.
    #[serde(default)]
    pub soldiers: BTreeMap<String, StatBlock>,
    /// Turret stat blocks.
    #[serde(default)]
    pub turrets: BTreeMap<String, StatBlock>,
    /// Tower definitions.
    #[serde(default)]
    pub towers: BTreeMap<String, TowerData>,
}

impl StatTable {
    /// Parse a table from RON text. `label` names the source in errors.
    pub fn from_ron_str(label: &str, text: &str) -> Result<Self> {
        let table: Self = ron::from_str(text).map_err(|e| CoreError::DataParse {
            path: label.to_string(),
            message: e.to_string(),
        })?;
        table.validate()?;
        Ok(table)
    }

    /// Validate every entry.
    pub fn validate(&self) -> Result<()> {
        for (name, block) in &self.soldiers {
            block.validate(&format!("soldier '{name}'"))?;
        }
        for (name, block) in &self.turrets {
            block.validate(&format!("turret '{name}'"))?;
        }
        for tower in self.towers.values() {
            tower.validate()?;
        }
        Ok(())
    }

    /// Soldier stats by name.
    pub fn soldier(&self, name: &str) -> Result<&StatBlock> {
        self.soldiers
            .get(name)
            .ok_or_else(|| CoreError::config(format!("unknown soldier stats '{name}'")))
    }

    /// Turret stats by name.
    pub fn turret(&self, name: &str) -> Result<&StatBlock> {
        self.turrets
            .get(name)
            .ok_or_else(|| CoreError::config(format!("unknown turret stats '{name}'")))
    }

    /// Tower definition by name.
    pub fn tower(&self, name: &str) -> Result<&TowerData> {
        self.towers
            .get(name)
            .ok_or_else(|| CoreError::config(format!("unknown tower '{name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Fixed;

    const TABLE: &str = r#"(
        soldiers: {
            "rifle": (max_hp: 60, attack: (short: 20, mid: 10, long: 0), shot_period: 1.0),
        },
        towers: {
            "keep": (
                id: "keep",
                levels: [
                    (stats: (max_hp: 300, attack: (short: 0, mid: 30, long: 15), shot_period: 3.0, body_radius: 1.5), spawn_interval: 20.0),
                ],
            ),
        },
    )"#;

    #[test]
    fn test_load_table() {
        let table = StatTable::from_ron_str("inline", TABLE).unwrap();
        assert_eq!(table.soldier("rifle").unwrap().max_hp, 60);
        let keep = table.tower("keep").unwrap();
        assert_eq!(keep.level(0).unwrap().spawn_interval, Fixed::from_num(20));
        assert!(keep.level(1).is_err());
        assert!(table.turret("gun").is_err());
    }

    #[test]
    fn test_parse_error_names_source() {
        let err = StatTable::from_ron_str("broken.ron", "(soldiers: {").unwrap_err();
        match err {
            CoreError::DataParse { path, .. } => assert_eq!(path, "broken.ron"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
