//! CSV reports. A report is a serializable row type; each registered report type is written to its
//! own CSV file, one row per `send_report` call. Rows for report types that were never registered
//! are dropped, so models can emit events unconditionally and let the driver decide which files
//! to produce.
use std::any::TypeId;
use std::cell::RefCell;
use std::ffi::OsStr;
use std::fs::{create_dir_all, File};
use std::path::Path;

use csv::Writer;
use log::trace;

use crate::context::Context;
use crate::define_data_plugin;
use crate::error::FacsError;
use crate::hashing::{HashMap, HashMapExt};

pub trait Report: 'static {
    // Returns report type
    fn type_id(&self) -> TypeId;
    // Serializes the data with the correct writer
    fn serialize(&self, writer: &mut Writer<File>) -> Result<(), csv::Error>;
}

/// Use this macro to define a unique report type
#[macro_export]
macro_rules! create_report_trait {
    ($name:ident) => {
        impl $crate::report::Report for $name {
            fn type_id(&self) -> std::any::TypeId {
                std::any::TypeId::of::<$name>()
            }

            fn serialize(&self, writer: &mut csv::Writer<std::fs::File>) -> Result<(), csv::Error> {
                writer.serialize(self)
            }
        }
    };
}
pub use create_report_trait;

struct ReportData {
    file_writers: RefCell<HashMap<TypeId, Writer<File>>>,
}

// Registers a data container that stores
// * file_writers: Maps report type to file writer
define_data_plugin!(
    ReportPlugin,
    ReportData,
    ReportData {
        file_writers: RefCell::new(HashMap::new()),
    }
);

// Checks that the path is valid. Creates the file and all parent directories if
// they do not exist. Returns the file if successful. Called by `add_report`
fn generate_validate_filepath(path: &Path) -> Result<File, FacsError> {
    match path.extension().and_then(OsStr::to_str) {
        Some("csv") => {
            if let Some(parent) = path.parent() {
                create_dir_all(parent)?;
            }
            let file = File::create(path)?;
            Ok(file)
        }
        _ => Err(FacsError::ReportError(
            "Report output files must be CSVs at this time".to_string(),
        )),
    }
}

pub trait ContextReportExt {
    /// Registers report type `T` to be written to the CSV file at `filepath`,
    /// creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns a `FacsError` if the path is not a `.csv` file or cannot be created.
    fn add_report<T: Report + 'static>(&mut self, filepath: &Path) -> Result<(), FacsError>;

    /// Write a new row with columns following items in the report struct
    /// to the report file associated with the report type struct.
    ///
    /// # Errors
    ///
    /// Returns a `FacsError` if the row cannot be written.
    fn send_report<T: Report>(&self, report: T) -> Result<(), FacsError>;
}

impl ContextReportExt for Context {
    fn add_report<T: Report + 'static>(&mut self, filepath: &Path) -> Result<(), FacsError> {
        let file = generate_validate_filepath(filepath)?;
        trace!(
            "writing {} to {}",
            std::any::type_name::<T>(),
            filepath.display()
        );

        let data_container = self.get_data_container_mut(ReportPlugin);
        let writer = Writer::from_writer(file);
        data_container
            .file_writers
            .get_mut()
            .insert(TypeId::of::<T>(), writer);
        Ok(())
    }

    fn send_report<T: Report>(&self, report: T) -> Result<(), FacsError> {
        // No data container will exist if no reports have been added
        let Some(data_container) = self.get_data_container(ReportPlugin) else {
            return Ok(());
        };
        let mut writer_cell = data_container.file_writers.borrow_mut();
        let Some(writer) = writer_cell.get_mut(&report.type_id()) else {
            return Ok(());
        };
        report.serialize(writer)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::tempdir;

    #[derive(Serialize, Deserialize)]
    struct SampleReport {
        id: u32,
        value: String,
    }

    create_report_trait!(SampleReport);

    #[derive(Serialize)]
    struct UnregisteredReport {
        id: u32,
    }

    create_report_trait!(UnregisteredReport);

    #[test]
    fn add_and_send_report() {
        let mut context = Context::new();
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("nested").join("sample_report.csv");
        context.add_report::<SampleReport>(&file_path).unwrap();

        context
            .send_report(SampleReport {
                id: 1,
                value: "Test Value".to_string(),
            })
            .unwrap();

        assert!(file_path.exists(), "CSV file should exist");
        let mut reader = csv::Reader::from_path(file_path).unwrap();
        let records: Vec<SampleReport> = reader.deserialize().map(Result::unwrap).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 1);
        assert_eq!(records[0].value, "Test Value");
    }

    #[test]
    fn unregistered_reports_are_dropped() {
        let context = Context::new();
        assert!(context.send_report(UnregisteredReport { id: 7 }).is_ok());
    }

    #[test]
    fn only_csvs_allowed() {
        let temp_dir = tempdir().unwrap();
        let res = generate_validate_filepath(&temp_dir.path().join("sample_report.tsv"));
        assert!(matches!(res, Err(FacsError::ReportError(_))));
    }
}
