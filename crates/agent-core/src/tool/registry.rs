//! Tool Registry
//!
//! The one resource shared by every conversation. Mutations take the write
//! lock for the duration of the map update; lookups take the read lock and
//! clone the handler `Arc` out, so no lock is ever held while a tool runs.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{render_output, tool_fn, ParameterSchema, ToolArgs, ToolCall, ToolHandler, ToolResult};
use crate::error::{AgentError, Result};

/// Descriptive metadata of a registered tool
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolMetadata {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    #[serde(default)]
    pub parameters: Vec<ParameterSchema>,

    /// Tags for grouping
    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Tool version
    pub version: String,

    /// Where the current handler comes from. Set by the registry and
    /// refreshed on hot-swap.
    #[serde(default)]
    pub origin: String,
}

impl ToolMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            tags: BTreeSet::new(),
            version: "1.0.0".into(),
            origin: String::new(),
        }
    }

    pub fn with_parameter(mut self, parameter: ParameterSchema) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Check required parameters are present
    pub fn validate(&self, args: &ToolArgs) -> Result<()> {
        for param in &self.parameters {
            if param.required && !args.contains_key(&param.name) {
                return Err(AgentError::ToolValidation(format!(
                    "Missing required parameter: {}",
                    param.name
                )));
            }
        }
        Ok(())
    }
}

struct ToolEntry {
    metadata: ToolMetadata,
    handler: Arc<dyn ToolHandler>,
}

/// Thread-safe registry of tools, keyed by unique name.
///
/// Share it between agents and loops with an `Arc<ToolRegistry>`.
#[derive(Default)]
pub struct ToolRegistry {
    entries: RwLock<HashMap<String, ToolEntry>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Handlers never run under the lock, so a poisoned lock still guards a
    // consistent map.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ToolEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ToolEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a tool. Returns `false` and keeps the existing entry if the
    /// name is taken.
    pub fn register<H: ToolHandler + 'static>(&self, metadata: ToolMetadata, handler: H) -> bool {
        self.register_shared(metadata, Arc::new(handler))
    }

    /// Register a shared handler
    pub fn register_shared(
        &self,
        mut metadata: ToolMetadata,
        handler: Arc<dyn ToolHandler>,
    ) -> bool {
        let mut entries = self.write();
        match entries.entry(metadata.name.clone()) {
            Entry::Occupied(_) => {
                tracing::debug!(tool = %metadata.name, "Tool already registered");
                false
            }
            Entry::Vacant(slot) => {
                metadata.origin = handler.origin().to_string();
                tracing::debug!(
                    tool = %metadata.name,
                    version = %metadata.version,
                    "Registered tool"
                );
                slot.insert(ToolEntry { metadata, handler });
                true
            }
        }
    }

    /// Register a synchronous closure
    pub fn register_fn<F>(&self, metadata: ToolMetadata, f: F) -> bool
    where
        F: Fn(&ToolArgs) -> Result<serde_json::Value> + Send + Sync + 'static,
    {
        self.register(metadata, tool_fn(f))
    }

    /// Remove a tool. Returns `false` if it was not registered.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.write().remove(name).is_some();
        if removed {
            tracing::debug!(tool = %name, "Unregistered tool");
        }
        removed
    }

    /// Get a tool's handler by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.read().get(name).map(|entry| Arc::clone(&entry.handler))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Replace a tool's handler, keeping its description, schema, tags and
    /// version. Returns `false` if the tool is not registered.
    pub fn hot_swap<H: ToolHandler + 'static>(&self, name: &str, handler: H) -> bool {
        self.hot_swap_shared(name, Arc::new(handler))
    }

    pub fn hot_swap_shared(&self, name: &str, handler: Arc<dyn ToolHandler>) -> bool {
        let mut entries = self.write();
        let Some(entry) = entries.get_mut(name) else {
            return false;
        };
        entry.metadata.origin = handler.origin().to_string();
        entry.handler = handler;
        tracing::debug!(tool = %name, "Hot-swapped tool handler");
        true
    }

    /// Metadata of one tool
    pub fn metadata(&self, name: &str) -> Option<ToolMetadata> {
        self.read().get(name).map(|entry| entry.metadata.clone())
    }

    /// Registered tool names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Every tool's metadata, keyed by name
    pub fn list_with_metadata(&self) -> BTreeMap<String, ToolMetadata> {
        self.read()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.metadata.clone()))
            .collect()
    }

    /// Names of tools carrying `tag`, sorted
    pub fn by_tag(&self, tag: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .read()
            .values()
            .filter(|entry| entry.metadata.tags.contains(tag))
            .map(|entry| entry.metadata.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Remove every tool
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Execute a tool call.
    ///
    /// Never fails: a missing tool, invalid arguments, a handler error and a
    /// handler panic are all reported through [`ToolResult::status`].
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let resolved = {
            let entries = self.read();
            entries
                .get(&call.name)
                .map(|entry| (Arc::clone(&entry.handler), entry.metadata.clone()))
        };

        let Some((handler, metadata)) = resolved else {
            tracing::warn!(tool = %call.name, "Tool not found");
            return ToolResult::not_found(&call.name).with_id(call.id.clone());
        };

        if let Err(e) = metadata.validate(&call.arguments) {
            return ToolResult::failure(&call.name, e.to_string()).with_id(call.id.clone());
        }

        tracing::debug!(tool = %call.name, "Executing tool");

        let outcome = AssertUnwindSafe(handler.call(&call.arguments))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(value)) => {
                ToolResult::success(&call.name, render_output(&value)).with_data(value)
            }
            Ok(Err(e)) => {
                tracing::warn!(tool = %call.name, error = %e, "Tool failed");
                ToolResult::failure(&call.name, e.to_string())
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                tracing::warn!(tool = %call.name, %reason, "Tool panicked");
                let message = format!("Tool '{}' panicked: {}", call.name, reason);
                ToolResult::failure(&call.name, message)
            }
        };

        result.with_id(call.id.clone())
    }

    /// Generate a system prompt section describing available tools
    pub fn generate_prompt_section(&self) -> String {
        let mut prompt = String::from("## Available Tools\n\n");

        for metadata in self.list_with_metadata().into_values() {
            prompt.push_str(&format!("### {}\n", metadata.name));
            prompt.push_str(&format!("{}\n", metadata.description));

            if !metadata.parameters.is_empty() {
                prompt.push_str("**Parameters:**\n");
                for param in &metadata.parameters {
                    let required = if param.required { " (required)" } else { "" };
                    prompt.push_str(&format!(
                        "- `{}` ({}){}: {}\n",
                        param.name, param.param_type, required, param.description
                    ));
                }
            }
            prompt.push('\n');
        }

        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{required_str, ToolStatus};
    use serde_json::{json, Value};
    use std::thread;

    fn echo_metadata() -> ToolMetadata {
        ToolMetadata::new("echo", "Echo text back")
            .with_parameter(ParameterSchema::required("text", "string", "Text to echo"))
            .with_tags(["utility"])
    }

    fn args(pairs: &[(&str, Value)]) -> ToolArgs {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_echo_register_get_unregister() {
        let registry = ToolRegistry::new();
        assert!(registry.register_fn(echo_metadata(), |args| {
            Ok(json!(required_str(args, "text")?))
        }));

        let echo = registry.get("echo").unwrap();
        let out = echo.call(&args(&[("text", json!("hi"))])).await.unwrap();
        assert_eq!(out, json!("hi"));

        assert!(registry.unregister("echo"));
        assert!(registry.get("echo").is_none());
        assert!(!registry.unregister("echo"));
    }

    #[tokio::test]
    async fn test_duplicate_register_keeps_original() {
        let registry = ToolRegistry::new();
        let original = ToolMetadata::new("add", "Adds");
        let replacement = ToolMetadata::new("add", "Replaced");
        assert!(registry.register_fn(original, |_| Ok(json!("original"))));
        assert!(!registry.register_fn(replacement, |_| Ok(json!("second"))));

        let handler = registry.get("add").unwrap();
        assert_eq!(handler.call(&ToolArgs::new()).await.unwrap(), json!("original"));
        assert_eq!(registry.metadata("add").unwrap().description, "Adds");
    }

    #[tokio::test]
    async fn test_hot_swap_keeps_metadata() {
        let registry = ToolRegistry::new();
        let metadata = ToolMetadata::new("swappable", "Greets someone")
            .with_tags(["greeting", "social"])
            .with_version("2.0.0");
        registry.register_fn(metadata, |_| Ok(json!("original")));
        let before = registry.list_with_metadata()["swappable"].clone();

        assert!(registry.hot_swap("swappable", crate::tool::EchoTool));

        let after = registry.list_with_metadata()["swappable"].clone();
        assert_eq!(after.description, before.description);
        assert_eq!(after.tags, before.tags);
        assert_eq!(after.version, "2.0.0");
        assert_ne!(after.origin, before.origin);

        let handler = registry.get("swappable").unwrap();
        let out = handler.call(&args(&[("text", json!("new"))])).await.unwrap();
        assert_eq!(out, json!("new"));

        assert!(!registry.hot_swap("nonexistent", crate::tool::EchoTool));
    }

    #[test]
    fn test_by_tag_and_clear() {
        let registry = ToolRegistry::new();
        let tagged = |name: &str, tags: &[&str]| {
            ToolMetadata::new(name, "").with_tags(tags.iter().copied())
        };
        registry.register_fn(tagged("tool1", &["math", "simple"]), |_| Ok(json!(1)));
        registry.register_fn(tagged("tool2", &["math", "complex"]), |_| Ok(json!(2)));
        registry.register_fn(tagged("tool3", &["text"]), |_| Ok(json!(3)));

        assert_eq!(registry.by_tag("math"), vec!["tool1", "tool2"]);
        assert_eq!(registry.by_tag("simple"), vec!["tool1"]);
        assert!(registry.by_tag("nonexistent").is_empty());

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.names().is_empty());
    }

    #[test]
    fn test_concurrent_register_unregister_names_consistent() {
        let registry = Arc::new(ToolRegistry::new());

        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for i in 0..20 {
                        let name = format!("tool_{}_{}", worker, i);
                        let metadata = ToolMetadata::new(&name, "");
                        assert!(registry.register_fn(metadata, |_| Ok(Value::Null)));
                        // visible to this thread as soon as register returns
                        assert!(registry.contains(&name));
                    }
                    for i in 0..10 {
                        assert!(registry.unregister(&format!("tool_{}_{}", worker, i)));
                    }
                })
            })
            .collect();

        let reader = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for _ in 0..200 {
                    let names = registry.names();
                    let unique: BTreeSet<_> = names.iter().collect();
                    assert_eq!(unique.len(), names.len());
                }
            })
        };

        for handle in workers {
            handle.join().unwrap();
        }
        reader.join().unwrap();

        let expected: Vec<String> = {
            let mut names: Vec<String> = (0..4)
                .flat_map(|w| (10..20).map(move |i| format!("tool_{}_{}", w, i)))
                .collect();
            names.sort();
            names
        };
        assert_eq!(registry.names(), expected);
    }

    #[tokio::test]
    async fn test_execute_reports_status() {
        let registry = ToolRegistry::new();
        registry.register_fn(echo_metadata(), |args| Ok(json!(required_str(args, "text")?)));
        registry.register_fn(ToolMetadata::new("broken", ""), |_| {
            Err(AgentError::ToolExecution("disk on fire".into()))
        });

        let ok = registry
            .execute(&ToolCall::new("echo", args(&[("text", json!("hello"))])).with_id("c1"))
            .await;
        assert!(ok.is_success());
        assert_eq!(ok.output, "hello");
        assert_eq!(ok.id.as_deref(), Some("c1"));

        let missing_param = registry.execute(&ToolCall::new("echo", ToolArgs::new())).await;
        assert_eq!(missing_param.status, ToolStatus::Failed);
        assert!(missing_param.output.contains("text"));

        let missing = registry.execute(&ToolCall::new("nope", ToolArgs::new())).await;
        assert_eq!(missing.status, ToolStatus::NotFound);

        let broken = registry.execute(&ToolCall::new("broken", ToolArgs::new())).await;
        assert_eq!(broken.status, ToolStatus::Failed);
        assert!(broken.output.contains("disk on fire"));
    }

    #[tokio::test]
    async fn test_execute_contains_panics() {
        let registry = ToolRegistry::new();
        registry.register_fn(ToolMetadata::new("explode", ""), |_| panic!("kaboom"));

        let result = registry.execute(&ToolCall::new("explode", ToolArgs::new())).await;
        assert_eq!(result.status, ToolStatus::Failed);
        assert!(result.output.contains("kaboom"));

        // the registry stays usable afterwards
        assert!(registry.contains("explode"));
    }

    #[test]
    fn test_prompt_section_lists_parameters() {
        let registry = ToolRegistry::new();
        registry.register_fn(echo_metadata(), |_| Ok(Value::Null));

        let section = registry.generate_prompt_section();
        assert!(section.contains("### echo"));
        assert!(section.contains("- `text` (string) (required): Text to echo"));
    }
}
