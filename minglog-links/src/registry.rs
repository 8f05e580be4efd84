//! Module registry: resolves module names and reference prefixes to the
//! tables that back each content module.

use std::collections::BTreeMap;

use crate::errors::{LinkError, LinkResult};

pub const NOTES: &str = "notes";
pub const BLOCKS: &str = "blocks";
pub const TASKS: &str = "tasks";
pub const MINDMAP: &str = "mindmap";
pub const FILES: &str = "files";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub name: &'static str,
    pub table: &'static str,
    pub title_column: &'static str,
    /// Prefixes accepted in reference syntax, e.g. `note` in `[[note:123]]`.
    pub reference_prefixes: &'static [&'static str],
}

#[derive(Debug, Clone)]
pub struct ModuleRegistry {
    modules: BTreeMap<&'static str, ModuleDescriptor>,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new(vec![
            ModuleDescriptor {
                name: NOTES,
                table: "pages",
                title_column: "title",
                reference_prefixes: &["note", "page"],
            },
            ModuleDescriptor {
                name: BLOCKS,
                table: "blocks",
                title_column: "content",
                reference_prefixes: &["block"],
            },
            ModuleDescriptor {
                name: TASKS,
                table: "tasks",
                title_column: "title",
                reference_prefixes: &["task"],
            },
            ModuleDescriptor {
                name: MINDMAP,
                table: "mindmap_nodes",
                title_column: "label",
                reference_prefixes: &["mindmap", "mind"],
            },
            ModuleDescriptor {
                name: FILES,
                table: "files",
                title_column: "name",
                reference_prefixes: &["file"],
            },
        ])
    }
}

impl ModuleRegistry {
    pub fn new(descriptors: Vec<ModuleDescriptor>) -> Self {
        let modules = descriptors
            .into_iter()
            .map(|descriptor| (descriptor.name, descriptor))
            .collect();
        Self { modules }
    }

    pub fn get(&self, module: &str) -> LinkResult<&ModuleDescriptor> {
        self.modules
            .get(module)
            .ok_or_else(|| LinkError::UnknownModule(module.to_string()))
    }

    pub fn contains(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    /// Module owning a reference prefix (case-insensitive).
    pub fn module_for_prefix(&self, prefix: &str) -> Option<&ModuleDescriptor> {
        let prefix = prefix.to_ascii_lowercase();
        self.modules
            .values()
            .find(|descriptor| descriptor.reference_prefixes.contains(&prefix.as_str()))
    }

    /// Every prefix, longest first so regex alternation prefers `mindmap` over `mind`.
    pub fn all_prefixes(&self) -> Vec<&'static str> {
        let mut prefixes: Vec<&'static str> = self
            .modules
            .values()
            .flat_map(|descriptor| descriptor.reference_prefixes.iter().copied())
            .collect();
        prefixes.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        prefixes
    }

    pub fn module_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.modules.keys().copied()
    }
}
