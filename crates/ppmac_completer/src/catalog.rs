use ppmac_config::LogType;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use tracing::{debug, warn};

use crate::error::CompleterError;
use crate::path::{PathSegment, parse_path};

pub type Metadata = BTreeMap<String, String>;

const DESCRIPTION_FIELD: &str = "Comments";

#[derive(Deserialize)]
struct RawEntry {
    path: String,
    #[serde(flatten)]
    fields: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogNode {
    name: String,
    indexed: bool,
    metadata: Metadata,
    children: BTreeMap<String, CatalogNode>,
}

impl CatalogNode {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn description(&self) -> Option<&str> {
        self.metadata
            .get(DESCRIPTION_FIELD)
            .map(String::as_str)
            .filter(|d| !d.is_empty())
    }

    pub fn children(&self) -> impl Iterator<Item = &CatalogNode> {
        self.children.values()
    }

    /// Exact (case-insensitive) match first, then a unique prefix.
    fn child(&self, path: &str, segment: &str) -> Result<&CatalogNode, CompleterError> {
        let key = segment.to_ascii_lowercase();
        if let Some(node) = self.children.get(&key) {
            return Ok(node);
        }

        let candidates: Vec<&CatalogNode> = self
            .children
            .range(key.clone()..)
            .take_while(|(k, _)| k.starts_with(&key))
            .map(|(_, node)| node)
            .collect();

        match candidates.as_slice() {
            [node] => Ok(node),
            [] => Err(CompleterError::NotFound {
                path: path.to_string(),
                segment: segment.to_string(),
            }),
            many => Err(CompleterError::Ambiguous {
                path: path.to_string(),
                segment: segment.to_string(),
                candidates: many.iter().map(|n| n.name.clone()).collect(),
            }),
        }
    }

    fn collect_matches(&self, prefix: &str, needle: &str, out: &mut BTreeMap<String, Metadata>) {
        for child in self.children.values() {
            let path = if child.indexed {
                format!("{}.{}[]", prefix, child.name)
            } else {
                format!("{}.{}", prefix, child.name)
            };

            let name_hit = child.name.to_ascii_lowercase().contains(needle);
            let meta_hit = child
                .metadata
                .values()
                .any(|v| v.to_ascii_lowercase().contains(needle));

            if name_hit || meta_hit {
                out.insert(path.clone(), child.metadata.clone());
            }

            child.collect_matches(&path, needle, out);
        }
    }
}

/// A resolved path into the catalog.
#[derive(Debug, Clone)]
pub struct CatalogEntry<'a> {
    path: String,
    node: &'a CatalogNode,
}

impl<'a> CatalogEntry<'a> {
    pub fn node(&self) -> &'a CatalogNode {
        self.node
    }

    pub fn description(&self) -> Option<&'a str> {
        self.node.description()
    }

    /// Canonical names of the children, sorted.
    pub fn attributes(&self) -> Vec<String> {
        self.node.children.values().map(|c| c.name.clone()).collect()
    }
}

impl fmt::Display for CatalogEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    root: CatalogNode,
    entries: usize,
}

impl Catalog {
    pub fn load(path: &str) -> Result<Self, CompleterError> {
        let content = fs::read_to_string(path).map_err(|source| CompleterError::Io {
            path: path.to_string(),
            source,
        })?;

        let raw: Vec<RawEntry> =
            serde_json::from_str(&content).map_err(|source| CompleterError::Format {
                path: path.to_string(),
                source,
            })?;

        let catalog = Self::from_entries(raw.into_iter().map(|e| {
            let metadata = e
                .fields
                .into_iter()
                .filter_map(|(k, v)| metadata_value(v).map(|v| (k, v)))
                .collect();
            (e.path, metadata)
        }));

        debug!(
            log_type = LogType::Completer.as_str(),
            "Loaded {} catalog entries from {}", catalog.entries, path
        );
        Ok(catalog)
    }

    /// Builds a catalog from `(path, metadata)` pairs; bad paths are skipped.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Metadata)>,
    {
        let mut catalog = Self::default();

        for (path, metadata) in entries {
            match parse_path(&path) {
                Ok(segments) => {
                    catalog.insert(&segments, metadata);
                    catalog.entries += 1;
                }
                Err(e) => warn!(log_type = LogType::Completer.as_str(), "Skipping entry: {}", e),
            }
        }

        catalog
    }

    fn insert(&mut self, segments: &[PathSegment], metadata: Metadata) {
        let mut node = &mut self.root;
        for segment in segments {
            node = node
                .children
                .entry(segment.name.to_ascii_lowercase())
                .or_insert_with(|| CatalogNode::named(&segment.name));
            if segment.index.is_some() {
                node.indexed = true;
            }
        }
        node.metadata = metadata;
    }

    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Resolves `path` (any case, unique prefixes allowed) to its canonical
    /// spelling, keeping the indices the caller gave.
    pub fn canonical(&self, path: &str) -> Result<String, CompleterError> {
        Ok(self.resolve(path)?.0)
    }

    /// Like [`Catalog::canonical`], also returning the node.
    pub fn check(&self, path: &str) -> Result<CatalogEntry<'_>, CompleterError> {
        let (path, node) = self.resolve(path)?;
        Ok(CatalogEntry { path, node })
    }

    fn resolve(&self, path: &str) -> Result<(String, &CatalogNode), CompleterError> {
        let segments = parse_path(path)?;
        let mut node = &self.root;
        let mut parts = Vec::with_capacity(segments.len());

        for segment in &segments {
            node = node.child(path, &segment.name)?;
            match &segment.index {
                Some(_) if !node.indexed => {
                    return Err(CompleterError::UnexpectedIndex {
                        path: path.to_string(),
                        segment: segment.name.clone(),
                    });
                }
                Some(index) => parts.push(format!("{}[{}]", node.name, index)),
                None => parts.push(node.name.clone()),
            }
        }

        Ok((parts.join("."), node))
    }

    pub fn attributes(&self, path: &str) -> Result<Vec<String>, CompleterError> {
        let (_, node) = self.resolve(path)?;
        Ok(node.children.values().map(|c| c.name.clone()).collect())
    }

    pub fn description(&self, path: &str) -> Option<String> {
        let (_, node) = self.resolve(path).ok()?;
        node.description().map(str::to_string)
    }

    /// Every descendant of `path` whose name or metadata contains `text`.
    pub fn search(
        &self,
        path: &str,
        text: &str,
    ) -> Result<BTreeMap<String, Metadata>, CompleterError> {
        let (canonical, node) = self.resolve(path)?;
        let mut out = BTreeMap::new();
        node.collect_matches(&canonical, &text.to_ascii_lowercase(), &mut out);
        Ok(out)
    }

    /// Canonical completions of a partial path: everything after the last
    /// dot is treated as a prefix of a child name.
    pub fn complete(&self, partial: &str) -> Vec<String> {
        let (base, prefix) = match partial.rfind('.') {
            Some(dot) => (Some(&partial[..dot]), &partial[dot + 1..]),
            None => (None, partial),
        };

        let (base_path, node) = match base {
            Some(base) => match self.resolve(base) {
                Ok((canonical, node)) => (format!("{}.", canonical), node),
                Err(_) => return Vec::new(),
            },
            None => (String::new(), &self.root),
        };

        let prefix = prefix.to_ascii_lowercase();
        node.children
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(_, child)| {
                let suffix = if child.indexed { "[" } else { "" };
                format!("{}{}{}", base_path, child.name, suffix)
            })
            .collect()
    }
}

fn metadata_value(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) if s == "NULL" => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}
