//! Workflow editor
//!
//! A workflow is an ordered chain of typed nodes saved as JSON on its row.
//! Nothing here runs a workflow; the editor only shapes and persists it.

use serde_json::Value;
use uuid::Uuid;

use coachdeck_api::{ApiError, NodeConfig, Result, Row, Workflow, WorkflowNode};

use crate::actions::{ActionDispatcher, ActionKey};
use crate::core::EntitySync;

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowEditor {
    workflow: Workflow,
    dirty: bool,
}

impl WorkflowEditor {
    pub fn new(workflow: Workflow) -> Self {
        Self {
            workflow,
            dirty: false,
        }
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn nodes(&self) -> &[WorkflowNode] {
        &self.workflow.nodes
    }

    /// Unsaved edits since load or the last save
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.workflow.name = name.into();
        self.dirty = true;
    }

    /// Append a node and return its id.
    pub fn append(&mut self, label: Option<String>, config: NodeConfig) -> String {
        let index = self.workflow.nodes.len();
        self.insert_node(index, label, config)
    }

    pub fn insert_at(
        &mut self,
        index: usize,
        label: Option<String>,
        config: NodeConfig,
    ) -> Result<String> {
        if index > self.workflow.nodes.len() {
            return Err(ApiError::invalid_input(format!(
                "insert position {} out of range (len {})",
                index,
                self.workflow.nodes.len()
            )));
        }
        Ok(self.insert_node(index, label, config))
    }

    fn insert_node(&mut self, index: usize, label: Option<String>, config: NodeConfig) -> String {
        let id = Uuid::new_v4().to_string();
        self.workflow.nodes.insert(
            index,
            WorkflowNode {
                id: id.clone(),
                label,
                config,
            },
        );
        self.dirty = true;
        id
    }

    pub fn remove(&mut self, node_id: &str) -> Result<WorkflowNode> {
        let index = self.position(node_id)?;
        self.dirty = true;
        Ok(self.workflow.nodes.remove(index))
    }

    /// Move a node so it ends up at `index`.
    pub fn move_to(&mut self, node_id: &str, index: usize) -> Result<()> {
        let from = self.position(node_id)?;
        if index >= self.workflow.nodes.len() {
            return Err(ApiError::invalid_input(format!(
                "move position {} out of range (len {})",
                index,
                self.workflow.nodes.len()
            )));
        }
        let node = self.workflow.nodes.remove(from);
        self.workflow.nodes.insert(index, node);
        self.dirty = true;
        Ok(())
    }

    pub fn update_config(&mut self, node_id: &str, config: NodeConfig) -> Result<()> {
        let index = self.position(node_id)?;
        self.workflow.nodes[index].config = config;
        self.dirty = true;
        Ok(())
    }

    /// Consecutive node pairs, first to last.
    pub fn edges(&self) -> Vec<(String, String)> {
        self.workflow
            .nodes
            .windows(2)
            .map(|pair| (pair[0].id.clone(), pair[1].id.clone()))
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.workflow)
            .map_err(|e| ApiError::invalid_input(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let workflow = serde_json::from_str(json)
            .map_err(|e| ApiError::invalid_input(format!("workflow JSON: {e}")))?;
        Ok(Self::new(workflow))
    }

    fn position(&self, node_id: &str) -> Result<usize> {
        self.workflow
            .nodes
            .iter()
            .position(|node| node.id == node_id)
            .ok_or_else(|| ApiError::invalid_input(format!("no node '{node_id}'")))
    }

    fn patch(&self) -> Result<Row> {
        let nodes = serde_json::to_value(&self.workflow.nodes)
            .map_err(|e| ApiError::invalid_input(e.to_string()))?;
        let mut patch = Row::new();
        patch.insert("name".to_string(), Value::String(self.workflow.name.clone()));
        patch.insert("nodes".to_string(), nodes);
        Ok(patch)
    }
}

impl ActionDispatcher {
    /// Persist the editor's workflow and adopt the row the store confirmed.
    pub async fn save_workflow(
        &self,
        workflows: &EntitySync<Workflow>,
        editor: &mut WorkflowEditor,
    ) -> Result<Workflow> {
        let id = editor.workflow.id.clone();
        let patch = editor.patch()?;
        let key = ActionKey::new("save_workflow", id.as_str());

        let saved = self.dispatch(key, workflows.update(&id, patch)).await?;
        editor.workflow = saved.clone();
        editor.dirty = false;
        Ok(saved)
    }
}
