use std::collections::BTreeMap;
use std::fmt;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDateTime;
use serde_json::Value;
use tracing::debug;

use crate::error::GridVectorError;
use crate::loader::{TimeVectorLoader, resolve_source};
use crate::metadata::{RawMeta, TimeVectorMetadata, parse_datetime_text, process_meta};
use crate::timeindex::{TimeIndex, build_index};

pub const VECTORS_FIELD: &str = "vectors";
pub const INDEX_FIELD: &str = "index";
pub const METADATA_FIELD: &str = "metadata";

/// Node kind expected from a container lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A named collection of entries (a JSON object).
    Group,
    /// A leaf value array or scalar.
    Dataset,
}

impl NodeKind {
    fn matches(self, node: &Value) -> bool {
        match self {
            NodeKind::Group => node.is_object(),
            NodeKind::Dataset => !node.is_object(),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Group => write!(f, "group"),
            NodeKind::Dataset => write!(f, "dataset"),
        }
    }
}

/// Loader for time vectors stored in a hierarchical container document.
///
/// The root holds a `vectors` group plus per-field groups (`index`,
/// `metadata`) whose per-vector entries may be absent; lookups then fall back
/// to a shared `common_<field>` entry at the root.
pub struct ContainerTimeVectorLoader {
    source: Utf8PathBuf,
    relative_loc: Option<Utf8PathBuf>,
    require_whole_years: bool,
    data: Option<Value>,
    meta: BTreeMap<String, TimeVectorMetadata>,
}

impl fmt::Display for ContainerTimeVectorLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContainerTimeVectorLoader({})", self.path())
    }
}

impl ContainerTimeVectorLoader {
    pub fn new(
        source: &Utf8Path,
        relative_loc: Option<&Utf8Path>,
        require_whole_years: bool,
    ) -> Self {
        Self {
            source: source.to_owned(),
            relative_loc: relative_loc.map(Utf8Path::to_owned),
            require_whole_years,
            data: None,
            meta: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> Utf8PathBuf {
        resolve_source(&self.source, self.relative_loc.as_deref())
    }

    fn read_error(&self, message: impl fmt::Display) -> GridVectorError {
        GridVectorError::ContainerRead {
            loader: self.to_string(),
            message: message.to_string(),
        }
    }

    fn ensure_loaded(&mut self) -> Result<(), GridVectorError> {
        if self.data.is_none() {
            let path = self.path();
            let content =
                fs::read_to_string(path.as_std_path()).map_err(|err| self.read_error(err))?;
            let root: Value =
                serde_json::from_str(&content).map_err(|err| self.read_error(err))?;
            if !root.is_object() {
                return Err(self.read_error("container root is not a group"));
            }
            debug!(path = %path, "cached container document");
            self.data = Some(root);
        }
        Ok(())
    }

    fn root(&self) -> &Value {
        self.data.as_ref().expect("ensure_loaded called first")
    }

    /// Resolve `field_name/vector_id` in the container, optionally falling
    /// back to the root-level `common_<field_name>` entry.
    pub fn read_field<'a>(
        &self,
        root: &'a Value,
        field_name: &str,
        vector_id: &str,
        expected_kind: NodeKind,
        use_fallback: bool,
    ) -> Result<&'a Value, GridVectorError> {
        let fallback_name = format!("common_{field_name}");
        let fallback = root.get(&fallback_name);

        match root.get(field_name) {
            Some(group) => match group.get(vector_id) {
                Some(node) => self.check_kind(node, field_name, vector_id, expected_kind),
                None if use_fallback => match fallback {
                    Some(node) => self.check_kind(node, field_name, vector_id, expected_kind),
                    None => Err(GridVectorError::MissingVectorAndFallback {
                        loader: self.to_string(),
                        field: field_name.to_string(),
                        vector_id: vector_id.to_string(),
                        kind: expected_kind.to_string(),
                    }),
                },
                None => Err(GridVectorError::MissingVectorInGroup {
                    loader: self.to_string(),
                    field: field_name.to_string(),
                    vector_id: vector_id.to_string(),
                    kind: expected_kind.to_string(),
                }),
            },
            None if use_fallback => match fallback {
                Some(node) => self.check_kind(node, field_name, vector_id, expected_kind),
                None => Err(GridVectorError::MissingContainerFieldAndFallback {
                    loader: self.to_string(),
                    field: field_name.to_string(),
                    vector_id: vector_id.to_string(),
                    kind: expected_kind.to_string(),
                }),
            },
            None => Err(GridVectorError::MissingContainerField {
                loader: self.to_string(),
                field: field_name.to_string(),
                vector_id: vector_id.to_string(),
                kind: expected_kind.to_string(),
            }),
        }
    }

    fn check_kind<'a>(
        &self,
        node: &'a Value,
        field_name: &str,
        vector_id: &str,
        expected_kind: NodeKind,
    ) -> Result<&'a Value, GridVectorError> {
        if expected_kind.matches(node) {
            Ok(node)
        } else {
            Err(self.read_error(format!(
                "entry for '{vector_id}' in '{field_name}' is not a {expected_kind}"
            )))
        }
    }

    fn node_to_values(&self, vector_id: &str, node: &Value) -> Result<Vec<f64>, GridVectorError> {
        let Some(entries) = node.as_array() else {
            return Err(self.read_error(format!("vector '{vector_id}' is not an array")));
        };
        entries
            .iter()
            .map(|entry| match entry {
                Value::Number(number) => number
                    .as_f64()
                    .ok_or_else(|| self.read_error(format!("vector '{vector_id}' holds a non-numeric entry"))),
                Value::Null => Ok(f64::NAN),
                other => {
                    Err(self.read_error(format!("vector '{vector_id}' holds non-numeric entry {other}")))
                }
            })
            .collect()
    }

    fn node_to_datetimes(
        &self,
        vector_id: &str,
        node: &Value,
    ) -> Result<Vec<NaiveDateTime>, GridVectorError> {
        let Some(entries) = node.as_array() else {
            return Err(self.read_error(format!("index for '{vector_id}' is not an array")));
        };
        entries
            .iter()
            .map(|entry| {
                let text = entry.as_str().ok_or_else(|| {
                    self.read_error(format!("index entry {entry} for '{vector_id}' is not text"))
                })?;
                parse_datetime_text(text.trim()).ok_or_else(|| GridVectorError::DatetimeParse {
                    loader: self.to_string(),
                    value: text.to_string(),
                })
            })
            .collect()
    }

    fn node_to_raw_meta(&self, node: &Value) -> BTreeMap<String, RawMeta> {
        let mut raw = BTreeMap::new();
        if let Some(entries) = node.as_object() {
            for (key, value) in entries {
                let converted = match value {
                    Value::Bool(b) => RawMeta::Bool(*b),
                    Value::Number(number) => number
                        .as_i64()
                        .map(RawMeta::Int)
                        .or_else(|| number.as_f64().map(RawMeta::Float))
                        .unwrap_or(RawMeta::Null),
                    Value::String(text) => RawMeta::Text(text.clone()),
                    Value::Null => RawMeta::Null,
                    other => RawMeta::Text(other.to_string()),
                };
                raw.insert(key.clone(), converted);
            }
        }
        raw
    }

    fn fallback_datetimes(&self, vector_id: &str) -> Result<Vec<NaiveDateTime>, GridVectorError> {
        let node =
            self.read_field(self.root(), INDEX_FIELD, vector_id, NodeKind::Dataset, true)?;
        self.node_to_datetimes(vector_id, node)
    }
}

impl TimeVectorLoader for ContainerTimeVectorLoader {
    fn source(&self) -> &Utf8Path {
        &self.source
    }

    fn require_whole_years(&self) -> bool {
        self.require_whole_years
    }

    fn vector_ids(&mut self) -> Result<Vec<String>, GridVectorError> {
        self.ensure_loaded()?;
        let group = self
            .root()
            .get(VECTORS_FIELD)
            .and_then(Value::as_object)
            .ok_or_else(|| self.read_error(format!("'{VECTORS_FIELD}' group not found in file")))?;
        Ok(group.keys().cloned().collect())
    }

    fn values(&mut self, vector_id: &str) -> Result<Vec<f64>, GridVectorError> {
        self.ensure_loaded()?;
        let node =
            self.read_field(self.root(), VECTORS_FIELD, vector_id, NodeKind::Dataset, false)?;
        self.node_to_values(vector_id, node)
    }

    fn index(&mut self, vector_id: &str) -> Result<TimeIndex, GridVectorError> {
        let meta = self.metadata(vector_id)?;
        if meta.start.is_some() && meta.frequency.is_some() && meta.num_points.is_some() {
            return build_index(&self.to_string(), &meta, None);
        }
        let datetimes = self.fallback_datetimes(vector_id)?;
        build_index(&self.to_string(), &meta, Some(&datetimes))
    }

    fn metadata(&mut self, vector_id: &str) -> Result<TimeVectorMetadata, GridVectorError> {
        self.ensure_loaded()?;
        if !self.meta.contains_key(vector_id) {
            let raw = {
                let node = self.read_field(
                    self.root(),
                    METADATA_FIELD,
                    vector_id,
                    NodeKind::Group,
                    true,
                )?;
                self.node_to_raw_meta(node)
            };
            let meta = process_meta(&self.to_string(), &self.path(), &raw)?;
            self.meta.insert(vector_id.to_string(), meta);
        }
        Ok(self
            .meta
            .get(vector_id)
            .cloned()
            .expect("metadata cached above"))
    }
}
