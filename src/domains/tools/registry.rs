//! Tool Registry - central registration and lookup for all tools.
//!
//! The registry is built exactly once per process run, either from a JSON
//! catalog file or from the built-in fallback set, and is read-only
//! afterwards. Catalog entries describe tools; each entry is bound to the
//! compiled-in handler of the same name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rmcp::model::{JsonObject, Tool};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use super::ToolHandler;
use super::definitions::{FALLBACK_TOOLS, builtin_handlers};
use super::error::ToolError;
use crate::core::config::ToolsConfig;

/// Metadata from the catalog file header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(flatten)]
    info: CatalogInfo,
    tools: Vec<CatalogTool>,
}

#[derive(Debug, Deserialize)]
struct CatalogTool {
    name: String,
    description: String,
    #[serde(rename = "inputSchema")]
    input_schema: JsonObject,
}

/// Where the registered descriptors came from.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrySource {
    Loaded { path: PathBuf, info: CatalogInfo },
    Fallback { reason: String },
}

impl RegistrySource {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Loaded { path, info } => json!({
                "type": "loaded",
                "path": path.display().to_string(),
                "catalog": info,
            }),
            Self::Fallback { reason } => json!({
                "type": "fallback",
                "reason": reason,
            }),
        }
    }
}

/// A descriptor bound to its handler.
#[derive(Clone)]
pub struct RegisteredTool {
    pub descriptor: Tool,
    pub handler: Arc<dyn ToolHandler>,
}

impl RegisteredTool {
    /// Register a handler under its own built-in descriptor.
    pub fn builtin(handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            descriptor: handler.descriptor(),
            handler,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// Tool registry - maps tool names to descriptors and handlers.
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
    source: RegistrySource,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .field("source", &self.source)
            .finish()
    }
}

impl ToolRegistry {
    /// Build the registry from configuration, falling back on any load failure.
    pub fn load(config: &ToolsConfig) -> Self {
        let path = config.source_path();
        match Self::from_file(&path, builtin_handlers()) {
            Ok(registry) => {
                info!(
                    "Loaded {} tools from {}",
                    registry.len(),
                    path.display()
                );
                registry
            }
            Err(e) => {
                warn!("Failed to load tool catalog: {}. Using fallback tools.", e);
                Self::fallback(e.to_string())
            }
        }
    }

    /// Build the registry from a catalog file.
    ///
    /// Declared tools without a matching handler are skipped with a warning.
    pub fn from_file(
        path: &Path,
        handlers: Vec<Arc<dyn ToolHandler>>,
    ) -> Result<Self, ToolError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ToolError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog: CatalogFile =
            serde_json::from_str(&raw).map_err(|source| ToolError::InvalidCatalog {
                path: path.to_path_buf(),
                source,
            })?;

        let handlers: HashMap<String, Arc<dyn ToolHandler>> = handlers
            .into_iter()
            .map(|h| (h.name().to_string(), h))
            .collect();

        let mut entries = Vec::with_capacity(catalog.tools.len());
        for tool in catalog.tools {
            let Some(handler) = handlers.get(&tool.name) else {
                warn!("Skipping tool '{}': no handler with that name", tool.name);
                continue;
            };
            entries.push(RegisteredTool {
                descriptor: Tool {
                    name: tool.name.into(),
                    description: Some(tool.description.into()),
                    input_schema: Arc::new(tool.input_schema),
                    annotations: None,
                    output_schema: None,
                    icons: None,
                    meta: None,
                    title: None,
                },
                handler: handler.clone(),
            });
        }

        if entries.is_empty() {
            return Err(ToolError::NoBindableTools(path.to_path_buf()));
        }

        Self::from_entries(
            entries,
            RegistrySource::Loaded {
                path: path.to_path_buf(),
                info: catalog.info,
            },
        )
    }

    /// The built-in minimal tool set.
    pub fn fallback(reason: impl Into<String>) -> Self {
        let mut registry = Self::empty(RegistrySource::Fallback {
            reason: reason.into(),
        });
        for handler in builtin_handlers()
            .into_iter()
            .filter(|h| FALLBACK_TOOLS.contains(&h.name()))
        {
            if let Err(e) = registry.insert(RegisteredTool::builtin(handler)) {
                warn!("Fallback tool set is inconsistent: {}", e);
            }
        }
        registry
    }

    /// Build a registry from explicit entries. Names must be unique.
    pub fn from_entries(
        entries: Vec<RegisteredTool>,
        source: RegistrySource,
    ) -> Result<Self, ToolError> {
        let mut registry = Self::empty(source);
        for entry in entries {
            registry.insert(entry)?;
        }
        Ok(registry)
    }

    fn empty(source: RegistrySource) -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
            source,
        }
    }

    fn insert(&mut self, entry: RegisteredTool) -> Result<(), ToolError> {
        let name = entry.name().to_string();
        if self.index.contains_key(&name) {
            return Err(ToolError::duplicate(name));
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(entry);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.index.get(name).and_then(|&i| self.tools.get(i))
    }

    /// All descriptors, in registration order.
    pub fn tools(&self) -> Vec<Tool> {
        self.tools.iter().map(|t| t.descriptor.clone()).collect()
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn source(&self) -> &RegistrySource {
        &self.source
    }

    /// Short description used in the `initialize` result and server info.
    pub fn summary(&self) -> Value {
        json!({
            "count": self.len(),
            "names": self.tool_names(),
            "source": self.source.to_json(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn catalog_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_fallback_has_four_tools() {
        let registry = ToolRegistry::fallback("test");
        assert_eq!(
            registry.tool_names(),
            vec![
                "regon_search_by_nip",
                "regon_search_by_regon",
                "regon_search_by_krs",
                "regon_get_service_status"
            ]
        );
        assert!(registry.source().is_fallback());
    }

    #[test]
    fn test_load_from_catalog() {
        let file = catalog_file(
            r#"{
                "name": "REGON tools",
                "version": "1.0",
                "language": "en",
                "tools": [
                    {"name": "regon_search_by_nip", "description": "By NIP",
                     "inputSchema": {"type": "object", "properties": {"nip": {"type": "string"}}, "required": ["nip"]}},
                    {"name": "regon_get_data_status", "description": "Data",
                     "inputSchema": {"type": "object", "properties": {}}}
                ]
            }"#,
        );
        let registry = ToolRegistry::from_file(file.path(), builtin_handlers()).unwrap();
        assert_eq!(registry.len(), 2);
        let nip = registry.get("regon_search_by_nip").unwrap();
        assert_eq!(nip.descriptor.description.as_deref(), Some("By NIP"));
        match registry.source() {
            RegistrySource::Loaded { info, .. } => {
                assert_eq!(info.language.as_deref(), Some("en"));
            }
            other => panic!("expected loaded source, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_tools_skipped() {
        let file = catalog_file(
            r#"{"tools": [
                {"name": "regon_teleport", "description": "x", "inputSchema": {}},
                {"name": "regon_search_by_krs", "description": "y", "inputSchema": {}}
            ]}"#,
        );
        let registry = ToolRegistry::from_file(file.path(), builtin_handlers()).unwrap();
        assert_eq!(registry.tool_names(), vec!["regon_search_by_krs"]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let file = catalog_file(
            r#"{"tools": [
                {"name": "regon_search_by_krs", "description": "a", "inputSchema": {}},
                {"name": "regon_search_by_krs", "description": "b", "inputSchema": {}}
            ]}"#,
        );
        let err = ToolRegistry::from_file(file.path(), builtin_handlers()).unwrap_err();
        assert!(matches!(err, ToolError::DuplicateName(_)));
    }

    #[test]
    fn test_invalid_json_rejected() {
        let file = catalog_file("{ not json");
        let err = ToolRegistry::from_file(file.path(), builtin_handlers()).unwrap_err();
        assert!(matches!(err, ToolError::InvalidCatalog { .. }));
    }

    #[test]
    fn test_no_bindable_tools_rejected() {
        let file = catalog_file(r#"{"tools": []}"#);
        let err = ToolRegistry::from_file(file.path(), builtin_handlers()).unwrap_err();
        assert!(matches!(err, ToolError::NoBindableTools(_)));
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = ToolsConfig {
            file: None,
            dir: dir.path().to_path_buf(),
            name: "detailed".to_string(),
        };
        let registry = ToolRegistry::load(&config);
        assert_eq!(registry.len(), 4);
        let summary = registry.summary();
        assert_eq!(summary["source"]["type"], "fallback");
        assert!(
            summary["source"]["reason"]
                .as_str()
                .unwrap()
                .contains("tools_detailed.json")
        );
    }

    #[test]
    fn test_shipped_catalog_binds_every_tool() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/tools_detailed.json");
        let registry = ToolRegistry::from_file(&path, builtin_handlers()).unwrap();
        assert_eq!(registry.len(), builtin_handlers().len());
    }
}
