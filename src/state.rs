use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pdf::PdfDocument;

/// Per-loaded-document signing state. Created by [`SignatureSession::begin`],
/// mutated by the compositor, discarded when another document is loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignatureSession {
    /// First page dimensions at load time; the caller sizes its capture
    /// surface 1:1 from these. Never mutated until the next load.
    pub reference_width: f64,
    pub reference_height: f64,
    /// True once an embed has been committed for this document.
    pub signature_present: bool,
}

impl SignatureSession {
    /// Read page 0's dimensions and start a fresh session for `doc`.
    pub fn begin(doc: &PdfDocument) -> Result<Self> {
        let (reference_width, reference_height) = doc.page_size(0)?;
        Ok(Self {
            reference_width,
            reference_height,
            signature_present: false,
        })
    }

    /// "Clear drawing": allow a re-draw and re-embed. Reference dimensions
    /// are intentionally left alone, only the committed flag resets.
    pub fn clear(&mut self) {
        self.signature_present = false;
    }
}

/// Ticket identifying one load attempt. Only the newest ticket may install
/// a session; completions of superseded loads are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
}

/// Owner of the current session for a single caller thread of control.
/// Loads may complete asynchronously but never overlap observably:
/// `begin_load` supersedes everything issued before it.
#[derive(Debug)]
pub struct Workspace {
    generation: u64,
    session: Option<SignatureSession>,
}

impl Workspace {
    // const so a caller can hold the workspace in a static.
    pub const fn new() -> Self {
        Self {
            generation: 0,
            session: None,
        }
    }

    /// Start a load. Any load still in flight is superseded from this
    /// point on, even before it completes.
    pub fn begin_load(&mut self) -> LoadTicket {
        self.generation += 1;
        LoadTicket {
            generation: self.generation,
        }
    }

    /// Install the session for a completed load. Returns false, leaving all
    /// state untouched, when the ticket has been superseded.
    pub fn finish_load(&mut self, ticket: LoadTicket, doc: &PdfDocument) -> Result<bool> {
        if ticket.generation != self.generation {
            log::debug!(
                "discarding stale load, ticket {} superseded by {}",
                ticket.generation,
                self.generation
            );
            return Ok(false);
        }
        self.session = Some(SignatureSession::begin(doc)?);
        Ok(true)
    }

    pub fn session(&self) -> Option<&SignatureSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut SignatureSession> {
        self.session.as_mut()
    }

    /// Drop the current session without starting a new load.
    pub fn reset(&mut self) {
        self.session = None;
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}
