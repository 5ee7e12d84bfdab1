//! Declarative command schema pushed to the remote registrar

use serde::Serialize;

use super::{ArgumentSpec, CommandOptions};

/// Where a schema is deployed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", content = "id", rename_all = "lowercase")]
pub enum SyncTarget {
    Global,
    Guild(String),
}

/// Flat description of one registered command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSchema {
    pub name: String,
    pub description: String,
    pub args: Vec<ArgumentSpec>,
    pub parent: Option<String>,
    pub default_permission: bool,
}

impl From<&CommandOptions> for CommandSchema {
    fn from(options: &CommandOptions) -> Self {
        Self {
            name: options.name.clone(),
            description: options.description.clone(),
            args: options.args.clone(),
            parent: options.parent.clone(),
            default_permission: options.default_permission,
        }
    }
}

/// A top-level command with its subcommands grouped under it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaNode {
    pub name: String,
    pub description: String,
    pub args: Vec<ArgumentSpec>,
    pub subcommands: Vec<CommandSchema>,
}

impl SchemaNode {
    /// Groups flat entries by the first word of their parent.
    ///
    /// Parents that are not registered commands themselves get a node with
    /// an empty description. Order follows first appearance.
    pub fn group(entries: &[CommandSchema]) -> Vec<SchemaNode> {
        let mut nodes: Vec<SchemaNode> = Vec::new();
        for entry in entries {
            let root = match &entry.parent {
                Some(parent) => parent.split_whitespace().next().unwrap_or(parent).to_string(),
                None => entry.name.clone(),
            };
            let idx = match nodes.iter().position(|n| n.name == root) {
                Some(idx) => idx,
                None => {
                    nodes.push(SchemaNode {
                        name: root,
                        description: String::new(),
                        args: Vec::new(),
                        subcommands: Vec::new(),
                    });
                    nodes.len() - 1
                }
            };
            let node = &mut nodes[idx];
            if entry.parent.is_some() {
                node.subcommands.push(entry.clone());
            } else {
                node.description = entry.description.clone();
                node.args = entry.args.clone();
            }
        }
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, parent: Option<&str>) -> CommandSchema {
        CommandSchema {
            name: name.into(),
            description: format!("{name} command"),
            args: Vec::new(),
            parent: parent.map(Into::into),
            default_permission: true,
        }
    }

    #[test]
    fn test_group_nests_subcommands_under_parent() {
        let nodes = SchemaNode::group(&[
            entry("set", Some("config")),
            entry("ping", None),
            entry("get", Some("config")),
            entry("set", None),
        ]);

        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].name, "config");
        assert_eq!(nodes[0].description, "");
        assert_eq!(nodes[0].subcommands.len(), 2);
        assert_eq!(nodes[2].name, "set");
        assert!(nodes[2].subcommands.is_empty());
    }
}
