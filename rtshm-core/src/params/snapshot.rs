//! Serializable dump of the parameter tree.

use super::node::{PARAM_NAME_MAX, parameter, section, value};
use super::tree::ParamTree;
use super::value::Value;
use crate::error::{Result, RtshmError};
use crate::types::{ArenaOffset, read_name};
use serde::{Deserialize, Serialize};

/// Owned copy of one section and everything below it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSnapshot {
    /// Section name; `""` for the root.
    pub name: String,
    /// Parameters in list order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterSnapshot>,
    /// Child sections in list order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<SectionSnapshot>,
}

/// Owned copy of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSnapshot {
    /// Parameter name.
    pub name: String,
    /// Values in index order.
    pub values: Vec<Value>,
}

/// Owned copy of the whole tree.
///
/// `sections[0]` is the root; any further entries are sections created
/// beside the root by paths without a leading `/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    /// Top-level sections.
    pub sections: Vec<SectionSnapshot>,
}

impl SectionSnapshot {
    /// Child section named `name`.
    pub fn section(&self, name: &str) -> Option<&SectionSnapshot> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Parameter named `name`.
    pub fn parameter(&self, name: &str) -> Option<&ParameterSnapshot> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

impl TreeSnapshot {
    /// The root section.
    pub fn root(&self) -> Option<&SectionSnapshot> {
        self.sections.first()
    }
}

/// Shared node budget across one snapshot, so a corrupted tree cannot make
/// the walk run forever.
struct Budget(usize);

impl Budget {
    fn spend(&mut self, at: ArenaOffset) -> Result<()> {
        if self.0 == 0 {
            tracing::error!(offset = %at, "Parameter tree walk exceeded node budget");
            return Err(RtshmError::ArenaCorruption {
                offset: at,
                cause: "parameter tree does not terminate".to_string(),
            });
        }
        self.0 -= 1;
        Ok(())
    }
}

impl ParamTree {
    /// Copy the whole tree out of the arena.
    pub fn snapshot(&self) -> Result<TreeSnapshot> {
        let mut budget = Budget(self.limit()?);
        let sections = self.snapshot_list(self.root_offset()?, &mut budget)?;
        Ok(TreeSnapshot { sections })
    }

    /// Pretty-printed JSON dump of [`snapshot`](Self::snapshot).
    pub fn to_json(&self) -> Result<String> {
        let snapshot = self.snapshot()?;
        serde_json::to_string_pretty(&snapshot).map_err(|e| RtshmError::ArenaIo {
            cause: e.to_string(),
        })
    }

    /// Snapshot `first` and every section after it in its sibling list.
    fn snapshot_list(&self, first: ArenaOffset, budget: &mut Budget) -> Result<Vec<SectionSnapshot>> {
        let mapping = self.mapping()?;
        let mut sections = Vec::new();
        let mut node = first;
        while !node.is_null() {
            budget.spend(node)?;
            sections.push(self.snapshot_section(node, budget)?);
            node = mapping.load_offset(node.add(section::NEXT))?;
        }
        Ok(sections)
    }

    fn snapshot_section(&self, node: ArenaOffset, budget: &mut Budget) -> Result<SectionSnapshot> {
        let mapping = self.mapping()?;
        let name = read_name(mapping, node.add(section::NAME), PARAM_NAME_MAX)?;

        let mut parameters = Vec::new();
        let mut param = mapping.load_offset(node.add(section::PARAMETER))?;
        while !param.is_null() {
            budget.spend(param)?;
            let mut values = Vec::new();
            let mut val = mapping.load_offset(param.add(parameter::FIRST_VALUE))?;
            while !val.is_null() {
                budget.spend(val)?;
                values.push(self.load_value(val)?);
                val = mapping.load_offset(val.add(value::NEXT))?;
            }
            parameters.push(ParameterSnapshot {
                name: read_name(mapping, param.add(parameter::NAME), PARAM_NAME_MAX)?,
                values,
            });
            param = mapping.load_offset(param.add(parameter::NEXT))?;
        }

        let child = mapping.load_offset(node.add(section::CHILD))?;
        let sections = self.snapshot_list(child, budget)?;

        Ok(SectionSnapshot {
            name,
            parameters,
            sections,
        })
    }
}
