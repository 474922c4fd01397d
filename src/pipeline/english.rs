use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use crate::clients::ReportRenderer;
use crate::db::LegacyDataGateway;
use crate::error::AppError;
use crate::telemetry::ENGLISH_LAUDOS_RENDERED;

use super::archive::ArchivePacker;
use super::bundle::{ExtractedDocument, ReportBundle, bundle_documents, english_zip_name};

const RENDER_ERROR_MARKER: &str = "Error";

/// Read-only view over the network share where rendered laudos land.
#[derive(Debug, Clone)]
pub struct FileShare {
    root: PathBuf,
    subdirs: Vec<String>,
}

impl FileShare {
    pub fn new(root: impl Into<PathBuf>, subdirs: Vec<String>) -> Self {
        Self {
            root: root.into(),
            subdirs,
        }
    }

    /// Looks the file up in each subdirectory, in order.
    pub async fn read(&self, file_name: &str) -> Option<Vec<u8>> {
        if !is_plain_file_name(file_name) {
            tracing::warn!(file_name, "Rejected file name returned by the renderer");
            return None;
        }

        for subdir in &self.subdirs {
            let candidate = self.root.join(subdir).join(file_name);
            match tokio::fs::read(&candidate).await {
                Ok(bytes) => return Some(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    tracing::warn!(path = %candidate.display(), error = %e, "Could not read rendered laudo");
                }
            }
        }
        None
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name)
}

pub struct EnglishLaudoPipeline {
    gateway: Arc<dyn LegacyDataGateway>,
    renderer: Arc<dyn ReportRenderer>,
    share: FileShare,
    packer: ArchivePacker,
}

impl EnglishLaudoPipeline {
    pub fn new(
        gateway: Arc<dyn LegacyDataGateway>,
        renderer: Arc<dyn ReportRenderer>,
        share: FileShare,
        packer: ArchivePacker,
    ) -> Self {
        Self {
            gateway,
            renderer,
            share,
            packer,
        }
    }

    #[tracing::instrument(
        name = "pipeline laudo_extract_english",
        skip(self, sample_ids),
        fields(laudo.requested = sample_ids.len(), laudo.extracted)
    )]
    pub async fn extract_english(
        &self,
        sample_ids: &[String],
    ) -> Result<Vec<ReportBundle>, AppError> {
        let mut documents = Vec::new();

        for sample_id in sample_ids {
            if let Some(doc) = self.render_one(sample_id).await {
                documents.push(doc);
            }
        }

        tracing::Span::current().record("laudo.extracted", documents.len());
        ENGLISH_LAUDOS_RENDERED.add(documents.len() as u64, &[]);

        bundle_documents(documents, &self.packer, || {
            english_zip_name(&chrono::Local::now())
        })
        .await
    }

    #[tracing::instrument(name = "pipeline_stage english_render", skip(self), fields(session_id))]
    async fn render_one(&self, sample_id: &str) -> Option<ExtractedDocument> {
        let session_id = Uuid::new_v4().simple().to_string();
        tracing::Span::current().record("session_id", session_id.as_str());

        if let Err(e) = self
            .gateway
            .register_session_marker(&session_id, sample_id)
            .await
        {
            tracing::warn!(error = %e, "Could not register render session, skipping sample");
            return None;
        }

        let rendered = self.renderer.render(&session_id).await;

        if let Err(e) = self.gateway.clear_session_marker(&session_id).await {
            tracing::warn!(error = %e, "Could not clear render session marker");
        }

        let file_name = match rendered {
            Ok(body) => body.trim().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "Render request failed, skipping sample");
                return None;
            }
        };

        if file_name.is_empty() || file_name.contains(RENDER_ERROR_MARKER) {
            tracing::warn!(response = %file_name, "Renderer reported an error, skipping sample");
            return None;
        }

        match self.share.read(&file_name).await {
            Some(content) => Some(ExtractedDocument {
                name: file_name,
                content,
            }),
            None => {
                tracing::warn!(file_name = %file_name, "Rendered laudo not found on the share, skipping sample");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeGateway, FakeRenderer};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    struct Fixture {
        _dir: tempfile::TempDir,
        share_root: PathBuf,
        staging: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let share_root = dir.path().join("share");
        std::fs::create_dir_all(share_root.join("ingles")).unwrap();
        std::fs::create_dir_all(share_root.join("ingles/firmados")).unwrap();
        let staging = dir.path().join("staging");
        Fixture {
            share_root,
            staging,
            _dir: dir,
        }
    }

    fn pipeline(
        fx: &Fixture,
        gateway: Arc<FakeGateway>,
        renderer: FakeRenderer,
    ) -> EnglishLaudoPipeline {
        EnglishLaudoPipeline::new(
            gateway,
            Arc::new(renderer),
            FileShare::new(
                &fx.share_root,
                vec!["ingles".to_string(), "ingles/firmados".to_string()],
            ),
            ArchivePacker::new(&fx.staging),
        )
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_single_rendered_laudo_is_returned_directly() {
        let fx = fixture();
        std::fs::write(fx.share_root.join("ingles/firmados/S1_en.pdf"), b"english").unwrap();
        let gateway = Arc::new(FakeGateway::default());
        let renderer = FakeRenderer::answering(vec![Ok("S1_en.pdf\r\n".to_string())]);

        let result = pipeline(&fx, gateway.clone(), renderer)
            .extract_english(&ids(&["S1"]))
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name, "S1_en.pdf");
        assert_eq!(result[0].base64_content, STANDARD.encode(b"english"));
        assert!(gateway.active_markers().is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_skipped_and_rest_zipped() {
        let fx = fixture();
        std::fs::write(fx.share_root.join("ingles/S1_en.pdf"), b"one").unwrap();
        std::fs::write(fx.share_root.join("ingles/S4_en.pdf"), b"four").unwrap();
        let renderer = FakeRenderer::answering(vec![
            Ok("S1_en.pdf".to_string()),
            Ok("Error: sample not published".to_string()),
            Ok("missing.pdf".to_string()),
            Ok("S4_en.pdf".to_string()),
        ]);

        let result = pipeline(&fx, Arc::new(FakeGateway::default()), renderer)
            .extract_english(&ids(&["S1", "S2", "S3", "S4"]))
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert!(result[0].name.starts_with("Informes_Ingles_"));
        assert!(result[0].name.ends_with(".zip"));
        let bytes = STANDARD.decode(&result[0].base64_content).unwrap();
        let archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);
    }

    #[tokio::test]
    async fn test_nothing_rendered_returns_empty() {
        let fx = fixture();
        let renderer = FakeRenderer::answering(vec![
            Ok(String::new()),
            Err(AppError::ReportService("timeout".to_string())),
        ]);

        let result = pipeline(&fx, Arc::new(FakeGateway::default()), renderer)
            .extract_english(&ids(&["S1", "S2"]))
            .await
            .unwrap();

        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_marker_failure_skips_render() {
        let fx = fixture();
        let gateway = Arc::new(FakeGateway {
            fail_markers: true,
            ..Default::default()
        });
        let renderer = FakeRenderer::answering(vec![]);

        let result = pipeline(&fx, gateway, renderer)
            .extract_english(&ids(&["S1"]))
            .await
            .unwrap();

        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_share_rejects_path_traversal() {
        let fx = fixture();
        std::fs::write(fx.share_root.join("secret.pdf"), b"x").unwrap();
        let share = FileShare::new(&fx.share_root, vec!["ingles".to_string()]);

        assert_eq!(share.read("../secret.pdf").await, None);
        assert_eq!(share.read("").await, None);
    }
}
