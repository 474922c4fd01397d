pub mod gateway;
pub mod legacy;
pub mod pool;

pub use gateway::{
    ComplianceSummary, CompressedReportRow, LegacyDataGateway, MrlDefaults, SampleDbInfo,
    SelectOption,
};
pub use legacy::PgLegacyGateway;
pub use pool::create_pool;
