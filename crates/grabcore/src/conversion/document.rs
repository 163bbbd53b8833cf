//! PDF creation: photos via ImageMagick, text via LibreOffice headless

use std::path::{Path, PathBuf};
use tokio::process::Command;

use super::{ensure_input, run_tool, temp_output_path, ConversionError, ConversionResult};
use crate::core::config;

/// Merge images (in order) into one PDF
pub async fn images_to_pdf<P: AsRef<Path>>(images: &[P]) -> ConversionResult<PathBuf> {
    if images.is_empty() {
        return Err(ConversionError::InvalidInput("no images to convert".to_string()));
    }
    for image in images {
        ensure_input(image.as_ref())?;
    }

    let output_path = temp_output_path("images", "pdf");

    let mut cmd = Command::new(config::IMAGEMAGICK_BIN.as_str());
    for image in images {
        cmd.arg(image.as_ref());
    }
    cmd.arg(&output_path);

    run_tool(cmd, "imagemagick", config::download::conversion_timeout())
        .await?
        .map_err(ConversionError::ImageMagickError)?;

    if !output_path.exists() {
        return Err(ConversionError::OutputFailed("PDF file was not created".to_string()));
    }
    Ok(output_path)
}

/// Render plain text to PDF
pub async fn text_to_pdf(text: &str) -> ConversionResult<PathBuf> {
    if text.trim().is_empty() {
        return Err(ConversionError::InvalidInput("text is empty".to_string()));
    }

    let source = temp_output_path("text", "txt");
    tokio::fs::write(&source, text).await?;
    let result = convert_with_libreoffice(&source).await;
    let _ = tokio::fs::remove_file(&source).await;
    result
}

async fn convert_with_libreoffice(input: &Path) -> ConversionResult<PathBuf> {
    ensure_input(input)?;

    let output_dir = temp_output_path("libreoffice", "d");
    tokio::fs::create_dir_all(&output_dir).await?;

    let mut cmd = Command::new(config::LIBREOFFICE_BIN.as_str());
    cmd.args(["--headless", "--convert-to", "pdf", "--outdir"])
        .arg(&output_dir)
        .arg(input);

    let run = run_tool(cmd, "libreoffice", config::download::conversion_timeout()).await;
    if let Err(err) = run.and_then(|r| r.map_err(ConversionError::LibreOfficeError)) {
        let _ = tokio::fs::remove_dir_all(&output_dir).await;
        return Err(err);
    }

    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("document");
    let pdf_path = output_dir.join(format!("{}.pdf", stem));
    if !pdf_path.exists() {
        let _ = tokio::fs::remove_dir_all(&output_dir).await;
        return Err(ConversionError::OutputFailed("PDF file was not created".to_string()));
    }

    let final_path = temp_output_path("text", "pdf");
    tokio::fs::rename(&pdf_path, &final_path).await?;
    let _ = tokio::fs::remove_dir_all(&output_dir).await;

    Ok(final_path)
}
