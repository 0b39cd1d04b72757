use std::fs;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{NaiveDate, NaiveDateTime};
use rust_xlsxwriter::Workbook;

use gridvector::error::GridVectorError;
use gridvector::loader::TimeVectorLoader;
use gridvector::loaders::spreadsheet::SpreadsheetTimeVectorLoader;
use gridvector::timeindex::TimeIndex;

fn dt(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, 0, 0).unwrap()
}

fn utf8(path: &std::path::Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
}

fn write_metadata_sheet(workbook: &mut Workbook) {
    let sheet = workbook.add_worksheet();
    sheet.set_name("Metadata").unwrap();
    let mut row = 0;
    for (key, value) in [
        ("IsMaxLevel", true),
        ("IsZeroOneProfile", false),
        ("Is52WeekYears", false),
        ("ExtrapolateFirstPoint", false),
        ("ExtrapolateLastPoint", false),
        ("IsRotating", false),
        ("IsMeanOne", false),
    ] {
        sheet.write_string(row, 0, key).unwrap();
        sheet.write_boolean(row, 1, value).unwrap();
        row += 1;
    }
    for (key, value) in [("TimeZone", "None"), ("Unit", "MW"), ("Currency", "None")] {
        sheet.write_string(row, 0, key).unwrap();
        sheet.write_string(row, 1, value).unwrap();
        row += 1;
    }
    for (key, value) in [("RefPeriodStartYear", 1995.0), ("RefPeriodNumYears", 30.0)] {
        sheet.write_string(row, 0, key).unwrap();
        sheet.write_number(row, 1, value).unwrap();
        row += 1;
    }
}

fn vertical_fixture(dir: &Utf8Path, columns: &[(&str, &[f64])]) -> Utf8PathBuf {
    let path = dir.join("vertical.xlsx");
    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Data").unwrap();
        sheet.write_string(0, 0, "DateTime").unwrap();
        for (position, (name, _)) in columns.iter().enumerate() {
            sheet.write_string(0, position as u16 + 1, *name).unwrap();
        }
        let rows = columns.first().map_or(0, |(_, values)| values.len());
        for row in 0..rows {
            let stamp = dt(2025, 3, 14, row as u32);
            sheet
                .write_string(row as u32 + 1, 0, stamp.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap();
            for (position, (_, values)) in columns.iter().enumerate() {
                sheet
                    .write_number(row as u32 + 1, position as u16 + 1, values[row])
                    .unwrap();
            }
        }
    }
    write_metadata_sheet(&mut workbook);
    workbook.save(path.as_std_path()).unwrap();
    path
}

fn horizontal_fixture(dir: &Utf8Path) -> Utf8PathBuf {
    let path = dir.join("horizontal.xlsx");
    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Data").unwrap();
        sheet.write_string(0, 0, "ID").unwrap();
        sheet.write_number(0, 1, 2025.0).unwrap();
        sheet.write_number(0, 2, 2026.0).unwrap();
        sheet.write_string(1, 0, "expected_vector").unwrap();
        sheet.write_number(1, 1, 1.5).unwrap();
        sheet.write_number(1, 2, 2.5).unwrap();
        sheet.write_string(2, 0, "wrong_vector").unwrap();
        sheet.write_number(2, 1, 0.0).unwrap();
        sheet.write_number(2, 2, 0.0).unwrap();
    }
    write_metadata_sheet(&mut workbook);
    workbook.save(path.as_std_path()).unwrap();
    path
}

#[test]
fn vertical_values_and_ids() {
    let temp = tempfile::tempdir().unwrap();
    let path = vertical_fixture(
        &utf8(temp.path()),
        &[("expected_vector", &[1.0, 2.0, 3.0]), ("wrong_vector", &[0.0, 0.0, 0.0])],
    );

    let mut loader = SpreadsheetTimeVectorLoader::new(&path, None, false);
    assert_eq!(
        loader.vector_ids().unwrap(),
        vec!["expected_vector".to_string(), "wrong_vector".to_string()]
    );
    assert_eq!(loader.values("expected_vector").unwrap(), vec![1.0, 2.0, 3.0]);

    let err = loader.values("missing_vector").unwrap_err();
    assert_matches!(err, GridVectorError::VectorNotFound { .. });
}

#[test]
fn payload_is_cached_after_first_read() {
    let temp = tempfile::tempdir().unwrap();
    let path = vertical_fixture(&utf8(temp.path()), &[("expected_vector", &[1.0, 2.0, 3.0])]);

    let mut loader = SpreadsheetTimeVectorLoader::new(&path, None, false);
    let first = loader.values("expected_vector").unwrap();

    // removing the backing file proves the second read hits the cache
    fs::remove_file(path.as_std_path()).unwrap();
    assert_eq!(loader.values("expected_vector").unwrap(), first);
}

#[test]
fn vertical_index_is_list_without_fixed_metadata() {
    let temp = tempfile::tempdir().unwrap();
    let path = vertical_fixture(&utf8(temp.path()), &[("expected_vector", &[1.0, 2.0, 3.0])]);

    let mut loader = SpreadsheetTimeVectorLoader::new(&path, None, false);
    let TimeIndex::List { datetimes, timezone, .. } = loader.index("expected_vector").unwrap()
    else {
        panic!("expected a list index");
    };
    assert_eq!(timezone, None);
    assert_eq!(datetimes, vec![dt(2025, 3, 14, 0), dt(2025, 3, 14, 1), dt(2025, 3, 14, 2)]);
}

#[test]
fn horizontal_years_become_iso_week_starts() {
    let temp = tempfile::tempdir().unwrap();
    let path = horizontal_fixture(&utf8(temp.path()));

    let mut loader = SpreadsheetTimeVectorLoader::new(&path, None, false);
    assert_eq!(loader.values("expected_vector").unwrap(), vec![1.5, 2.5]);

    let TimeIndex::List { datetimes, .. } = loader.index("expected_vector").unwrap() else {
        panic!("expected a list index");
    };
    // bare year labels resolve to the Monday of ISO week 1, not Jan 1
    assert_eq!(datetimes, vec![dt(2024, 12, 30, 0), dt(2025, 12, 29, 0)]);
}

#[test]
fn horizontal_month_labels_are_transposed() {
    let temp = tempfile::tempdir().unwrap();
    let dir = utf8(temp.path());
    let path = dir.join("monthly.xlsx");
    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Data").unwrap();
        sheet.write_string(0, 0, "ID").unwrap();
        sheet.write_string(0, 1, "2025-10").unwrap();
        sheet.write_string(0, 2, "2025-11").unwrap();
        sheet.write_string(1, 0, "expected_vector").unwrap();
        sheet.write_number(1, 1, 1.5).unwrap();
        sheet.write_number(1, 2, 2.5).unwrap();
    }
    write_metadata_sheet(&mut workbook);
    workbook.save(path.as_std_path()).unwrap();

    let mut loader = SpreadsheetTimeVectorLoader::new(&path, None, false);
    assert_eq!(loader.values("expected_vector").unwrap(), vec![1.5, 2.5]);
    let TimeIndex::List { datetimes, .. } = loader.index("expected_vector").unwrap() else {
        panic!("expected a list index");
    };
    assert_eq!(datetimes, vec![dt(2025, 10, 1, 0), dt(2025, 11, 1, 0)]);
}

#[test]
fn metadata_is_file_level() {
    let temp = tempfile::tempdir().unwrap();
    let path = vertical_fixture(&utf8(temp.path()), &[("expected_vector", &[1.0])]);

    let mut loader = SpreadsheetTimeVectorLoader::new(&path, None, false);
    let meta = loader.metadata("expected_vector").unwrap();
    assert_eq!(meta.is_max_level, Some(true));
    assert_eq!(meta.is_zero_one_profile, Some(false));
    assert_eq!(meta.unit, Some("MW".to_string()));
    assert_eq!(meta.currency, None);
    assert_eq!(meta.timezone, None);

    assert_eq!(loader.is_max_level("anything").unwrap(), Some(true));
    assert_eq!(loader.unit("anything").unwrap(), Some("MW".to_string()));
    let period = loader.reference_period("anything").unwrap().unwrap();
    assert_eq!((period.start_year, period.num_years), (1995, 30));
}

#[test]
fn missing_datetime_column_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let dir = utf8(temp.path());
    let path = dir.join("no_datetime.xlsx");
    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Data").unwrap();
        sheet.write_string(0, 0, "Timestamp").unwrap();
        sheet.write_string(0, 1, "expected_vector").unwrap();
        sheet.write_string(1, 0, "2025-03-14 00:00:00").unwrap();
        sheet.write_number(1, 1, 1.0).unwrap();
    }
    write_metadata_sheet(&mut workbook);
    workbook.save(path.as_std_path()).unwrap();

    let mut loader = SpreadsheetTimeVectorLoader::new(&path, None, false);
    let err = loader.values("expected_vector").unwrap_err();
    assert_matches!(err, GridVectorError::MissingDatetimeColumn { .. });
}

#[test]
fn validation_raises_one_composite_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = vertical_fixture(
        &utf8(temp.path()),
        &[("first_bad", &[-1.0, 2.0, 3.0]), ("second_bad", &[-1.0, -2.0, 3.0])],
    );

    let mut loader = SpreadsheetTimeVectorLoader::new(&path, None, true);
    let err = loader.validate_vectors().unwrap_err();
    let message = err.to_string();
    assert!(message.starts_with(&format!("Found errors in {loader}:")));
    assert!(message.contains("first_bad"));
    assert!(message.contains("second_bad"));
    assert!(message.contains("negative values"));
    assert!(message.contains("is not classified as is_whole_years"));
}

#[test]
fn relative_location_is_joined_onto_source() {
    let temp = tempfile::tempdir().unwrap();
    let dir = utf8(temp.path());
    vertical_fixture(&dir, &[("expected_vector", &[4.0])]);

    let mut loader =
        SpreadsheetTimeVectorLoader::new(&dir, Some(Utf8Path::new("vertical.xlsx")), false);
    assert_eq!(loader.values("expected_vector").unwrap(), vec![4.0]);
}
