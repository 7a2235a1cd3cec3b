//! Signature-embedding engine: load a PDF, composite a hand-drawn
//! signature onto its first page, serialize new bytes. Presentation (file
//! pickers, previews, download plumbing) lives in the embedding caller.

mod error;
mod pdf;
mod raster;
mod sign;
mod state;


pub use error::{Result, SignError};
pub use pdf::PdfDocument;
pub use raster::{encode, CaptureSurface, RasterImage, StrokePad};
pub use sign::{embed_signature, SIGNATURE_SCALE};
pub use state::{LoadTicket, SignatureSession, Workspace};
