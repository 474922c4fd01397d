pub mod mrl;
pub mod render;

pub use mrl::{HttpMrlService, MrlReportResponse, MrlService, MrlSession, ReportPayload};
pub use render::{HttpReportRenderer, ReportRenderer};

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.char_indices()
            .take_while(|&(i, _)| i < max)
            .map(|(_, c)| c)
            .collect()
    }
}
