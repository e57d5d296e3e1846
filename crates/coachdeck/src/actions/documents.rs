use coachdeck_api::Result;

use super::{ActionDispatcher, ActionKey};
use crate::collaborators::{ByteStream, Document, DocumentRenderer};

impl ActionDispatcher {
    /// Render a document. The in-flight guard covers opening the stream,
    /// not consuming it.
    pub async fn render_document(
        &self,
        renderer: &dyn DocumentRenderer,
        document: &Document,
    ) -> Result<ByteStream> {
        let key = ActionKey::new("render_document", document.title.as_str());
        self.dispatch(key, renderer.render(document)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::DocumentSection;
    use crate::testing::FakeDocumentRenderer;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_render_document_streams_bytes() -> anyhow::Result<()> {
        let renderer = FakeDocumentRenderer::new();
        let dispatcher = ActionDispatcher::new();
        let document = Document {
            title: "Welcome pack".to_string(),
            sections: vec![DocumentSection {
                heading: Some("Intro".to_string()),
                body: "Hello".to_string(),
            }],
            brand: Vec::new(),
        };

        let stream = dispatcher.render_document(&renderer, &document).await?;
        let chunks: Vec<Vec<u8>> = stream.try_collect().await?;
        let bytes: Vec<u8> = chunks.concat();
        assert_eq!(String::from_utf8(bytes)?, "Welcome pack\nIntro\nHello\n");
        Ok(())
    }
}
