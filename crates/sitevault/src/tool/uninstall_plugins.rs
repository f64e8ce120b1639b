//! Removes add-on plugins left behind after a restore.

use serde::{Deserialize, Serialize};

use super::{NamedTool, Tool};
use crate::context::Context;
use crate::error::RunError;
use crate::oplog::LogLevel;
use crate::operation::{Operation, OperationKind, OperationStatus};
use crate::runner::Runnable;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedUninstall {
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UninstallDetails {
    /// Requested plugin names.
    pub plugins: Vec<String>,
    #[serde(default)]
    pub uninstalled: Vec<String>,
    #[serde(default)]
    pub failed: Vec<FailedUninstall>,
}

pub struct UninstallPlugins {
    op: Operation,
    details: UninstallDetails,
}

impl UninstallPlugins {
    pub fn details(&self) -> &UninstallDetails {
        &self.details
    }
}

impl NamedTool for UninstallPlugins {
    const NAME: &'static str = "uninstall_plugins";

    fn from_operation(op: Operation) -> Result<Self, RunError> {
        if op.kind() != &OperationKind::tool(Self::NAME) {
            return Err(RunError::WrongType {
                id: op.id().unwrap_or_default(),
                expected: OperationKind::tool(Self::NAME).to_string(),
                found: op.kind().to_string(),
            });
        }
        let details: UninstallDetails = op
            .typed_details()
            .map_err(|e| RunError::InvalidParams(format!("expected a 'plugins' list: {}", e)))?;
        if details.plugins.iter().any(|p| p.trim().is_empty()) {
            return Err(RunError::InvalidParams(
                "plugin names must not be empty".to_string(),
            ));
        }
        Ok(Self { op, details })
    }
}

impl Runnable for UninstallPlugins {
    fn operation(&self) -> &Operation {
        &self.op
    }

    fn operation_mut(&mut self) -> &mut Operation {
        &mut self.op
    }

    fn perform(&mut self, ctx: &Context<'_>) -> Result<(), RunError> {
        self.details.uninstalled.clear();
        self.details.failed.clear();

        for name in &self.details.plugins {
            match ctx.site.uninstall_plugin(name) {
                Ok(()) => {
                    ctx.log(&self.op, LogLevel::Info, &format!("Uninstalled {}", name))?;
                    self.details.uninstalled.push(name.clone());
                }
                Err(e) => {
                    ctx.log(
                        &self.op,
                        LogLevel::Warning,
                        &format!("Could not uninstall {}: {}", name, e),
                    )?;
                    self.details.failed.push(FailedUninstall {
                        name: name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        self.op.set_typed_details(&self.details)?;
        Ok(())
    }
}

impl Tool for UninstallPlugins {
    fn summary(&self) -> String {
        if self.op.status() != OperationStatus::Finished {
            return String::new();
        }
        let mut out = format!("Uninstalled {} plugins", self.details.uninstalled.len());
        if !self.details.failed.is_empty() {
            let names: Vec<&str> = self.details.failed.iter().map(|f| f.name.as_str()).collect();
            out.push_str(&format!(", failed: {}", names.join(", ")));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn op_with(details: serde_json::Value) -> Operation {
        let mut op = Operation::new(
            OperationKind::tool("uninstall_plugins"),
            OperationStatus::Scheduled,
        );
        if let serde_json::Value::Object(map) = details {
            op.set_details(map);
        }
        op
    }

    #[test]
    fn test_requires_plugin_list() {
        assert!(matches!(
            UninstallPlugins::from_operation(op_with(json!({}))),
            Err(RunError::InvalidParams(_))
        ));
        assert!(matches!(
            UninstallPlugins::from_operation(op_with(json!({"plugins": [""]}))),
            Err(RunError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_reads_plugin_list() {
        let tool =
            UninstallPlugins::from_operation(op_with(json!({"plugins": ["local_a", "block_b"]})))
                .unwrap();
        assert_eq!(tool.details().plugins, vec!["local_a", "block_b"]);
        assert!(tool.summary().is_empty());
    }
}
