pub mod archive;
pub mod bundle;
pub mod decompress;
pub mod english;
pub mod laudo;
pub mod mrl;
pub mod workspace;

pub use archive::ArchivePacker;
pub use bundle::{ExtractedDocument, ReportBundle};
pub use english::{EnglishLaudoPipeline, FileShare};
pub use laudo::LaudoExtractionService;
pub use mrl::{MrlReportOrchestrator, MrlRequest, MrlRun, SampleOutcome, ZipDownload};
