use base64::Engine;

/// A pasted screenshot, decoded from the data URL the browser produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl InlineImage {
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("expected a data: URL")]
    NotDataUrl,
    #[error("only base64 data URLs are supported")]
    NotBase64,
    #[error("unsupported content type {0:?}; paste an image")]
    UnsupportedType(String),
    #[error("image payload is empty")]
    Empty,
    #[error("image payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
}

pub fn parse_data_url(url: &str) -> Result<InlineImage, ImageError> {
    let rest = url
        .trim()
        .strip_prefix("data:")
        .ok_or(ImageError::NotDataUrl)?;
    let (meta, payload) = rest.split_once(',').ok_or(ImageError::NotDataUrl)?;
    let mut parts = meta.split(';');
    let mime_type = parts.next().unwrap_or("").trim().to_ascii_lowercase();
    if !parts.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return Err(ImageError::NotBase64);
    }
    if !mime_type.starts_with("image/") {
        return Err(ImageError::UnsupportedType(mime_type));
    }
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let data = base64::engine::general_purpose::STANDARD.decode(compact)?;
    if data.is_empty() {
        return Err(ImageError::Empty);
    }
    Ok(InlineImage { mime_type, data })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_png_data_url() {
        let img = parse_data_url("data:image/png;base64,iVBORw0K\nGgo=").expect("decode");
        assert_eq!(img.mime_type, "image/png");
        assert_eq!(img.data, b"\x89PNG\r\n\x1a\n");
        assert_eq!(img.to_base64(), "iVBORw0KGgo=");
    }

    #[test]
    fn rejects_non_images_and_bad_payloads() {
        assert!(matches!(parse_data_url("hello"), Err(ImageError::NotDataUrl)));
        assert!(matches!(
            parse_data_url("data:image/png,raw"),
            Err(ImageError::NotBase64)
        ));
        assert!(matches!(
            parse_data_url("data:text/plain;base64,aGk="),
            Err(ImageError::UnsupportedType(t)) if t == "text/plain"
        ));
        assert!(matches!(
            parse_data_url("data:image/png;base64,"),
            Err(ImageError::Empty)
        ));
        assert!(matches!(
            parse_data_url("data:image/png;base64,@@@"),
            Err(ImageError::Decode(_))
        ));
    }
}
