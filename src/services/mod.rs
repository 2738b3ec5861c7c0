pub mod input_writer;
pub mod run_log;
pub mod snapshot;
pub mod status_classifier;
pub mod transport_reader;

pub use input_writer::InputWriter;
pub use run_log::{LogRecord, RunLog};
pub use snapshot::SnapshotStore;
pub use status_classifier::StatusClassifier;
pub use transport_reader::{ArtifactReader, H5DumpReader};
