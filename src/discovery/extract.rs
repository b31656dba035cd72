use crate::error::DiscoveryError;
use std::fs;
use std::path::Path;

/// Extract plain text from a PDF or text document
pub fn extract_text(path: &Path) -> Result<String, DiscoveryError> {
    let is_pdf = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);

    if is_pdf {
        pdf_extract::extract_text(path).map_err(|e| DiscoveryError::Extract {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

/// Write extracted text next to the other run artifacts as `<file name>.txt`
pub fn write_text_file(text_dir: &Path, file_name: &str, text: &str) -> Result<(), DiscoveryError> {
    fs::create_dir_all(text_dir)?;
    fs::write(text_dir.join(format!("{}.txt", file_name)), text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extract_plain_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cv.txt");
        fs::write(&path, "Rust engineer, 5 years").unwrap();
        assert_eq!(extract_text(&path).unwrap(), "Rust engineer, 5 years");
    }

    #[test]
    fn test_extract_invalid_pdf_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.pdf");
        fs::write(&path, "not a pdf").unwrap();
        assert!(matches!(
            extract_text(&path),
            Err(DiscoveryError::Extract { .. })
        ));
    }

    #[test]
    fn test_write_text_file() {
        let dir = TempDir::new().unwrap();
        let text_dir = dir.path().join("text");
        write_text_file(&text_dir, "cv.pdf", "hello").unwrap();
        assert_eq!(
            fs::read_to_string(text_dir.join("cv.pdf.txt")).unwrap(),
            "hello"
        );
    }
}
