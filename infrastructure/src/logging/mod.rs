//! Mission event log exporters.

mod jsonl_exporter;

pub use jsonl_exporter::JsonlEventExporter;
