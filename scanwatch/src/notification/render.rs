//! Chart artifacts.
//!
//! The renderer is a stub: it rasterizes a placeholder card naming the
//! symbol to PNG. Artifacts live in temporary files that are removed when
//! the [`ChartArtifact`] is dropped.

use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::NotifyError;

/// A rendered chart on disk, removed on drop.
#[derive(Debug)]
pub struct ChartArtifact {
    file: tempfile::NamedTempFile,
    file_name: String,
    mime: &'static str,
}

impl ChartArtifact {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Name presented to the recipient.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime(&self) -> &'static str {
        self.mime
    }

    pub async fn read(&self) -> Result<Vec<u8>, NotifyError> {
        tokio::fs::read(self.path())
            .await
            .map_err(|e| NotifyError::Render(format!("failed to read artifact: {}", e)))
    }
}

/// Produces a chart artifact for a symbol.
pub trait ChartRenderer: Send + Sync {
    fn render(&self, symbol: &str) -> Result<ChartArtifact, NotifyError>;
}

/// Writes a small PNG card with the symbol name.
///
/// System fonts are loaded once. Without any installed font the card is
/// still produced, just without its text.
#[derive(Clone)]
pub struct PlaceholderChartRenderer {
    dir: Option<PathBuf>,
    fonts: Arc<usvg::fontdb::Database>,
}

impl PlaceholderChartRenderer {
    pub fn new() -> Self {
        let mut fonts = usvg::fontdb::Database::new();
        fonts.load_system_fonts();
        Self {
            dir: None,
            fonts: Arc::new(fonts),
        }
    }

    /// Place artifacts under `dir` instead of the system temp directory.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            ..Self::new()
        }
    }

    fn rasterize(&self, svg: &str) -> Result<Vec<u8>, NotifyError> {
        let options = usvg::Options {
            fontdb: Arc::clone(&self.fonts),
            ..Default::default()
        };
        let tree = usvg::Tree::from_str(svg, &options)
            .map_err(|e| NotifyError::Render(format!("invalid chart markup: {}", e)))?;

        let size = tree.size().to_int_size();
        let mut pixmap = Pixmap::new(size.width(), size.height())
            .ok_or_else(|| NotifyError::Render("chart has zero size".to_string()))?;
        resvg::render(&tree, Transform::default(), &mut pixmap.as_mut());

        pixmap
            .encode_png()
            .map_err(|e| NotifyError::Render(format!("failed to encode chart: {}", e)))
    }
}

impl Default for PlaceholderChartRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PlaceholderChartRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaceholderChartRenderer")
            .field("dir", &self.dir)
            .field("fonts", &self.fonts.len())
            .finish()
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn file_stem(symbol: &str) -> String {
    let stem: String = symbol
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "chart".to_string()
    } else {
        stem
    }
}

/// SVG source of the placeholder card.
pub fn placeholder_svg(symbol: &str) -> String {
    let label = escape_xml(symbol);
    format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="400" height="200" viewBox="0 0 400 200">"#,
            r##"<rect width="400" height="200" fill="#ffffff"/>"##,
            r#"<text x="200" y="90" font-family="sans-serif" font-size="20" text-anchor="middle">TradingView Chart</text>"#,
            r#"<text x="200" y="125" font-family="sans-serif" font-size="20" text-anchor="middle">{}</text>"#,
            "</svg>\n"
        ),
        label
    )
}

impl ChartRenderer for PlaceholderChartRenderer {
    fn render(&self, symbol: &str) -> Result<ChartArtifact, NotifyError> {
        let png = self.rasterize(&placeholder_svg(symbol))?;

        let stem = file_stem(symbol);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&stem).suffix(".png");

        let mut file = match &self.dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| NotifyError::Render(format!("failed to create artifact: {}", e)))?;

        file.write_all(&png)
            .and_then(|_| file.flush())
            .map_err(|e| NotifyError::Render(format!("failed to write artifact: {}", e)))?;

        Ok(ChartArtifact {
            file,
            file_name: format!("{}.png", stem),
            mime: "image/png",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

    #[test]
    fn test_render_writes_png_and_removes_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = PlaceholderChartRenderer::in_dir(dir.path());

        let artifact = renderer.render("TCS").unwrap();
        let path = artifact.path().to_path_buf();
        let body = std::fs::read(&path).unwrap();
        assert!(body.starts_with(PNG_SIGNATURE));
        assert_eq!(artifact.file_name(), "TCS.png");
        assert_eq!(artifact.mime(), "image/png");

        drop(artifact);
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_card_source_names_symbol() {
        let svg = placeholder_svg("TCS");
        assert!(svg.contains("TradingView Chart"));
        assert!(svg.contains(">TCS<"));
    }

    #[test]
    fn test_symbol_escaped_in_card_and_file_name() {
        let svg = placeholder_svg("M&M");
        assert!(svg.contains("M&amp;M"));
        assert!(PlaceholderChartRenderer::new().render("M&M").is_ok());
        assert_eq!(file_stem("M&M"), "M_M");
        assert_eq!(file_stem("BAJAJ-AUTO"), "BAJAJ-AUTO");
        assert_eq!(file_stem(""), "chart");
    }

    #[test]
    fn test_render_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = PlaceholderChartRenderer::in_dir(dir.path().join("missing"));
        assert!(matches!(renderer.render("TCS"), Err(NotifyError::Render(_))));
    }

    #[tokio::test]
    async fn test_artifact_read() {
        let artifact = PlaceholderChartRenderer::new().render("INFY").unwrap();
        let bytes = artifact.read().await.unwrap();
        assert!(bytes.starts_with(PNG_SIGNATURE));
    }
}
