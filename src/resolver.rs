use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::error::GridVectorError;
use crate::names::DbNames;

/// Overlays an ordered hierarchy of database roots into one working copy.
///
/// Roots are scanned highest priority first; each requested file id is
/// materialized from the first root that holds it, preserving the relative
/// folder layout of that root.
#[derive(Debug)]
pub struct DatabaseResolver {
    working_copy: Utf8PathBuf,
    hierarchy: Vec<Utf8PathBuf>,
    file_ids: Vec<String>,
    names: DbNames,
    resolved_roots: BTreeMap<String, Utf8PathBuf>,
}

impl DatabaseResolver {
    pub fn new(
        working_copy: impl Into<Utf8PathBuf>,
        hierarchy: Vec<Utf8PathBuf>,
        file_ids: Vec<String>,
        names: DbNames,
    ) -> Self {
        Self {
            working_copy: working_copy.into(),
            hierarchy,
            file_ids,
            names,
            resolved_roots: BTreeMap::new(),
        }
    }

    /// The configured destination, independent of whether a merge has run.
    pub fn working_copy_path(&self) -> &Utf8Path {
        &self.working_copy
    }

    /// Root each file id was last resolved from.
    pub fn resolved_roots(&self) -> &BTreeMap<String, Utf8PathBuf> {
        &self.resolved_roots
    }

    /// Materialize every requested file id into the working copy.
    ///
    /// The working copy must not hold data yet; this is checked once up
    /// front, before any file is touched. Duplicate ids (or two ids resolving
    /// to the same physical file) are copied once.
    pub fn merge(&mut self) -> Result<(), GridVectorError> {
        let destination = self.working_copy.as_std_path();
        if destination.exists() {
            let mut entries = fs::read_dir(destination)
                .map_err(|err| GridVectorError::Filesystem(err.to_string()))?;
            if entries.next().is_some() {
                return Err(GridVectorError::WorkingCopyExists(self.working_copy.clone()));
            }
        }
        fs::create_dir_all(destination)
            .map_err(|err| GridVectorError::Filesystem(err.to_string()))?;

        for file_id in self.file_ids.clone() {
            let (root, folder, name) = self.resolve_from_hierarchy(&file_id)?;
            let source = root.join(&folder).join(&name);
            let target = self.working_copy.join(&folder).join(&name);
            if target.as_std_path().exists() {
                debug!(file_id, %target, "destination already materialized, skipping copy");
                continue;
            }
            copy_file(&source, &target)?;
            debug!(file_id, %source, %target, "materialized file into working copy");
        }
        Ok(())
    }

    /// Resolve `(source_root, relative_folder, file_name)` for one id by
    /// scanning the hierarchy in priority order. Resolutions are cached per
    /// id; a cache hit skips the rescan.
    pub fn resolve_from_hierarchy(
        &mut self,
        file_id: &str,
    ) -> Result<(Utf8PathBuf, Utf8PathBuf, String), GridVectorError> {
        let folder = self.names.relative_folder(file_id)?.to_owned();

        if let Some(root) = self.resolved_roots.get(file_id).cloned() {
            if let Some(name) = self.lookup_in_root(&root, &folder, file_id)? {
                return Ok((root, folder, name));
            }
        }

        for root in self.hierarchy.clone() {
            if let Some(name) = self.lookup_in_root(&root, &folder, file_id)? {
                self.resolved_roots.insert(file_id.to_string(), root.clone());
                return Ok((root, folder, name));
            }
        }
        Err(GridVectorError::FileNotFoundInHierarchy(file_id.to_string()))
    }

    /// Probe one root. A root that lacks the folder entirely simply does not
    /// provide the file; ambiguous matches inside a root stay fatal.
    fn lookup_in_root(
        &self,
        root: &Utf8Path,
        folder: &Utf8Path,
        file_id: &str,
    ) -> Result<Option<String>, GridVectorError> {
        match self.names.file_name(root, folder, file_id) {
            Ok(name) => Ok(name),
            Err(GridVectorError::MissingDatabaseFolder(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Create the canonical set of empty subfolders for a fresh database root.
    pub fn create_database_folder_structure(
        destination: &Utf8Path,
        names: &DbNames,
    ) -> Result<(), GridVectorError> {
        for folder in names.folders() {
            fs::create_dir_all(destination.join(folder).as_std_path())
                .map_err(|err| GridVectorError::Filesystem(err.to_string()))?;
        }
        Ok(())
    }
}

fn copy_file(source: &Utf8Path, dest: &Utf8Path) -> Result<(), GridVectorError> {
    let parent = dest
        .parent()
        .ok_or_else(|| GridVectorError::Filesystem("invalid destination path".to_string()))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| GridVectorError::Filesystem(err.to_string()))?;
    let temp = tempfile::Builder::new()
        .prefix("gridvector-copy")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| GridVectorError::Filesystem(err.to_string()))?;
    fs::copy(source.as_std_path(), temp.path())
        .map_err(|err| GridVectorError::Filesystem(err.to_string()))?;
    temp.persist(dest.as_std_path())
        .map_err(|err| GridVectorError::Filesystem(err.to_string()))?;
    Ok(())
}
