use std::collections::BTreeMap;
use std::fs;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use gridvector::error::GridVectorError;
use gridvector::names::DbNames;
use gridvector::resolver::DatabaseResolver;

fn utf8(path: &std::path::Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
}

fn create_db_file(root: &Utf8Path, subfolder: &str, file_name: &str) {
    let folder = root.join(subfolder);
    fs::create_dir_all(folder.as_std_path()).unwrap();
    fs::write(folder.join(file_name).as_std_path(), "").unwrap();
}

fn test_names() -> DbNames {
    let folder_map: BTreeMap<String, Utf8PathBuf> = [
        ("test_file1", "db01_test"),
        ("test_file2", "db02_test"),
    ]
    .into_iter()
    .map(|(file_id, folder)| (file_id.to_string(), Utf8PathBuf::from(folder)))
    .collect();
    DbNames::new(
        vec![Utf8PathBuf::from("db01_test"), Utf8PathBuf::from("db02_test")],
        folder_map,
    )
}

#[test]
fn merge_materializes_working_copy() {
    let temp = tempfile::tempdir().unwrap();
    let base = utf8(temp.path());
    let master = base.join("master_db");
    create_db_file(&master, "db01_test", "test_file1.xlsx");
    create_db_file(&master, "db02_test", "test_file2.xlsx");

    let working_copy = base.join("working_copy");
    let mut resolver = DatabaseResolver::new(
        working_copy.clone(),
        vec![master],
        vec!["test_file1".to_string(), "test_file2".to_string()],
        test_names(),
    );
    resolver.merge().unwrap();

    assert!(working_copy.join("db01_test/test_file1.xlsx").as_std_path().exists());
    assert!(working_copy.join("db02_test/test_file2.xlsx").as_std_path().exists());
}

#[test]
fn merge_copies_duplicate_requests_once() {
    let temp = tempfile::tempdir().unwrap();
    let base = utf8(temp.path());
    let master = base.join("master_db");
    create_db_file(&master, "db01_test", "test_file1.xlsx");

    let working_copy = base.join("working_copy");
    let mut resolver = DatabaseResolver::new(
        working_copy.clone(),
        vec![master],
        vec!["test_file1".to_string(), "test_file1".to_string()],
        test_names(),
    );
    resolver.merge().unwrap();

    let copied: Vec<_> = fs::read_dir(working_copy.join("db01_test").as_std_path())
        .unwrap()
        .collect();
    assert_eq!(copied.len(), 1);
}

#[test]
fn merge_with_no_requests_creates_empty_working_copy() {
    let temp = tempfile::tempdir().unwrap();
    let working_copy = utf8(temp.path()).join("working_copy");

    let mut resolver =
        DatabaseResolver::new(working_copy.clone(), Vec::new(), Vec::new(), test_names());
    resolver.merge().unwrap();
    assert!(working_copy.as_std_path().exists());
}

#[test]
fn merge_requires_empty_working_copy() {
    let temp = tempfile::tempdir().unwrap();
    let working_copy = utf8(temp.path()).join("working_copy");
    fs::create_dir_all(working_copy.join("db00").as_std_path()).unwrap();

    let mut resolver =
        DatabaseResolver::new(working_copy, Vec::new(), Vec::new(), test_names());
    let err = resolver.merge().unwrap_err();
    assert_matches!(err, GridVectorError::WorkingCopyExists(_));
    assert!(
        err.to_string()
            .starts_with("Working copy of database hierarchy already exists. Cannot edit the working copy")
    );
}

#[test]
fn merge_caches_resolved_root() {
    let temp = tempfile::tempdir().unwrap();
    let base = utf8(temp.path());
    let master = base.join("master_db");
    create_db_file(&master, "db01_test", "test_file1.xlsx");

    let mut resolver = DatabaseResolver::new(
        base.join("working_copy"),
        vec![master.clone()],
        vec!["test_file1".to_string()],
        test_names(),
    );
    resolver.merge().unwrap();

    let expected: BTreeMap<String, Utf8PathBuf> =
        [("test_file1".to_string(), master)].into_iter().collect();
    assert_eq!(resolver.resolved_roots(), &expected);
}

#[test]
fn resolution_prefers_highest_priority_root() {
    let temp = tempfile::tempdir().unwrap();
    let base = utf8(temp.path());
    let master = base.join("master_db");
    let project = base.join("project_db");
    create_db_file(&master, "db01_test", "test_file1.xlsx");
    create_db_file(&project, "db01_test", "test_file1.xlsx");

    let mut resolver = DatabaseResolver::new(
        base.join("working_copy"),
        vec![project.clone(), master],
        Vec::new(),
        test_names(),
    );
    let (root, folder, name) = resolver.resolve_from_hierarchy("test_file1").unwrap();
    assert_eq!(root, project);
    assert_eq!(folder, Utf8PathBuf::from("db01_test"));
    assert_eq!(name, "test_file1.xlsx");
}

#[test]
fn resolution_falls_through_roots_missing_the_folder() {
    let temp = tempfile::tempdir().unwrap();
    let base = utf8(temp.path());
    let master = base.join("master_db");
    let project = base.join("project_db");
    fs::create_dir_all(project.as_std_path()).unwrap();
    create_db_file(&master, "db01_test", "test_file1.xlsx");

    let mut resolver = DatabaseResolver::new(
        base.join("working_copy"),
        vec![project, master.clone()],
        Vec::new(),
        test_names(),
    );
    let (root, _, _) = resolver.resolve_from_hierarchy("test_file1").unwrap();
    assert_eq!(root, master);
}

#[test]
fn resolution_requires_existing_file() {
    let temp = tempfile::tempdir().unwrap();
    let base = utf8(temp.path());
    let master = base.join("master_db");
    fs::create_dir_all(master.join("db01_test").as_std_path()).unwrap();

    let mut resolver = DatabaseResolver::new(
        base.join("working_copy"),
        vec![master],
        Vec::new(),
        test_names(),
    );
    let err = resolver.resolve_from_hierarchy("test_file1").unwrap_err();
    assert_matches!(err, GridVectorError::FileNotFoundInHierarchy(_));
}

#[test]
fn resolution_rejects_ambiguous_extensions() {
    let temp = tempfile::tempdir().unwrap();
    let base = utf8(temp.path());
    let master = base.join("master_db");
    create_db_file(&master, "db01_test", "test_file1.xlsx");
    create_db_file(&master, "db01_test", "test_file1.parquet");

    let mut resolver = DatabaseResolver::new(
        base.join("working_copy"),
        vec![master],
        Vec::new(),
        test_names(),
    );
    let err = resolver.resolve_from_hierarchy("test_file1").unwrap_err();
    assert_matches!(err, GridVectorError::AmbiguousFileId { .. });
}

#[test]
fn unknown_file_id_is_rejected() {
    let mut resolver = DatabaseResolver::new(
        Utf8PathBuf::from("working_copy"),
        Vec::new(),
        Vec::new(),
        test_names(),
    );
    let err = resolver.resolve_from_hierarchy("unmapped").unwrap_err();
    assert_matches!(err, GridVectorError::UnknownFileId(_));
}

#[test]
fn working_copy_path_is_unconditional() {
    let resolver = DatabaseResolver::new(
        Utf8PathBuf::from("working_copy"),
        Vec::new(),
        Vec::new(),
        test_names(),
    );
    assert_eq!(resolver.working_copy_path(), Utf8Path::new("working_copy"));
}

#[test]
fn create_database_folder_structure_creates_all_folders() {
    let temp = tempfile::tempdir().unwrap();
    let destination = utf8(temp.path()).join("database");

    let names = test_names();
    DatabaseResolver::create_database_folder_structure(&destination, &names).unwrap();
    for folder in names.folders() {
        assert!(destination.join(folder).as_std_path().is_dir());
    }
}
