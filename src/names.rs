use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::GridVectorError;

/// Immutable name tables of a database root: the canonical subfolder layout
/// and the file-id to subfolder mapping.
///
/// Loaded once and injected into the resolver rather than accessed as ambient
/// global state; tests and embedders construct their own tables.
#[derive(Debug, Clone)]
pub struct DbNames {
    folders: Vec<Utf8PathBuf>,
    folder_map: BTreeMap<String, Utf8PathBuf>,
}

impl DbNames {
    pub fn new(
        folders: Vec<Utf8PathBuf>,
        folder_map: BTreeMap<String, Utf8PathBuf>,
    ) -> Self {
        Self { folders, folder_map }
    }

    /// Canonical ordered subfolder list of a database root.
    pub fn folders(&self) -> &[Utf8PathBuf] {
        &self.folders
    }

    /// Relative subfolder holding the file with the given id.
    pub fn relative_folder(&self, file_id: &str) -> Result<&Utf8Path, GridVectorError> {
        self.folder_map
            .get(file_id)
            .map(Utf8PathBuf::as_path)
            .ok_or_else(|| GridVectorError::UnknownFileId(file_id.to_string()))
    }

    /// Discover the file name for an id inside `root/folder`. File identity is
    /// the stem; the extension is discovered, not assumed. Returns `Ok(None)`
    /// when the folder holds no match, and fails when the folder is missing or
    /// when several extensions share the stem.
    pub fn file_name(
        &self,
        root: &Utf8Path,
        folder: &Utf8Path,
        file_id: &str,
    ) -> Result<Option<String>, GridVectorError> {
        let folder_path = root.join(folder);
        if !folder_path.as_std_path().is_dir() {
            return Err(GridVectorError::MissingDatabaseFolder(folder_path));
        }

        let mut matches: Vec<String> = Vec::new();
        let entries = fs::read_dir(folder_path.as_std_path())
            .map_err(|err| GridVectorError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| GridVectorError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let stem = path.file_stem().and_then(|stem| stem.to_str());
            if stem == Some(file_id) {
                if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                    matches.push(name.to_string());
                }
            }
        }

        matches.sort();
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            _ => {
                let extensions = matches
                    .iter()
                    .map(|name| {
                        let ext = name.rsplit_once('.').map_or("", |(_, ext)| ext);
                        format!("'.{ext}'")
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(GridVectorError::AmbiguousFileId {
                    file_id: file_id.to_string(),
                    extensions,
                    folder: folder_path,
                })
            }
        }
    }
}

impl Default for DbNames {
    fn default() -> Self {
        let folders: Vec<Utf8PathBuf> = [
            "db00_system",
            "db01_nodes",
            "db02_demand",
            "db03_thermal",
            "db04_wind",
            "db05_solar",
            "db06_hydro",
            "db07_transmission",
            "db08_timevectors",
        ]
        .into_iter()
        .map(Utf8PathBuf::from)
        .collect();

        let folder_map: BTreeMap<String, Utf8PathBuf> = [
            ("system", "db00_system"),
            ("nodes", "db01_nodes"),
            ("demand", "db02_demand"),
            ("thermal", "db03_thermal"),
            ("wind", "db04_wind"),
            ("solar", "db05_solar"),
            ("hydro", "db06_hydro"),
            ("transmission", "db07_transmission"),
            ("demand_profiles", "db08_timevectors"),
            ("wind_profiles", "db08_timevectors"),
            ("solar_profiles", "db08_timevectors"),
            ("inflow_profiles", "db08_timevectors"),
            ("price_profiles", "db08_timevectors"),
        ]
        .into_iter()
        .map(|(file_id, folder)| (file_id.to_string(), Utf8PathBuf::from(folder)))
        .collect();

        Self { folders, folder_map }
    }
}
