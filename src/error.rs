use thiserror::Error;

/// Engine-wide error type. Every failure surfaces to the caller
/// synchronously; nothing is retried or swallowed inside the engine.
#[derive(Debug, Error)]
pub enum SignError {
    /// Input bytes are empty or not a well-formed PDF.
    #[error("pdf_parse_failed:{0}")]
    Parse(String),

    /// Page index out of range, including the no-pages case.
    #[error("page_out_of_range:{index} ({page_count} pages)")]
    PageIndex { index: usize, page_count: usize },

    /// Malformed raster transport encoding (base64 or PNG layer).
    #[error("signature_decode_failed:{0}")]
    Decode(String),

    /// The capture surface has no strokes.
    #[error("signature_capture_empty")]
    EmptyCapture,

    /// Any failure inside the embed pipeline, original cause preserved.
    #[error("signature_embed_failed:{0}")]
    Composition(#[source] Box<SignError>),

    /// Document could not be written back out.
    #[error("pdf_save_failed:{0}")]
    Serialize(String),
}

impl SignError {
    pub(crate) fn compose(err: SignError) -> SignError {
        match err {
            SignError::Composition(_) => err,
            other => SignError::Composition(Box::new(other)),
        }
    }
}

pub type Result<T> = std::result::Result<T, SignError>;
