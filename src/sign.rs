use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use crate::error::{Result, SignError};
use crate::pdf::PdfDocument;
use crate::raster::RasterImage;
use crate::state::SignatureSession;

/// Fixed shrink applied to the raster's intrinsic dimensions. The capture
/// surface is sized 1:1 with the page, so half size keeps the signature
/// proportionate without adaptive bounds math.
pub const SIGNATURE_SCALE: f64 = 0.5;

/// Resource name the signature image is registered under on the page.
const SIGNATURE_XOBJECT: &str = "SigIm";

/// Composite `raster` onto the first page of `doc`, centered, at
/// [`SIGNATURE_SCALE`]. When the session already committed a signature the
/// first page is rebuilt blank before drawing, so re-signing never stacks
/// images. Mutates `doc` in place and flips `session.signature_present`.
pub fn embed_signature(
    doc: &mut PdfDocument,
    session: &mut SignatureSession,
    raster: &RasterImage,
) -> Result<()> {
    embed(doc, session, raster).map_err(SignError::compose)
}

fn embed(
    doc: &mut PdfDocument,
    session: &mut SignatureSession,
    raster: &RasterImage,
) -> Result<()> {
    // Fallible lookups run first; the document stays untouched when any of
    // them fail.
    let mut page_id = doc.page_id(0)?;
    let (page_w, page_h) = doc.page_size_of(page_id)?;

    // Re-signing starts from a fresh blank page so signatures never stack.
    // The replacement stays at index 0; appending would silently rotate the
    // signed page to the end of a multi-page document.
    if session.signature_present {
        page_id = doc.replace_page(0, page_w, page_h)?;
    }

    let inner = doc.inner_mut();

    let smask_id = inner.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => raster.width as i64,
            "Height" => raster.height as i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
        },
        raster.alpha.clone(),
    ));
    let image_id = inner.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => raster.width as i64,
            "Height" => raster.height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "SMask" => smask_id,
        },
        raster.rgb.clone(),
    ));

    register_xobject(inner, page_id, image_id)?;

    let placed_w = f64::from(raster.width) * SIGNATURE_SCALE;
    let placed_h = f64::from(raster.height) * SIGNATURE_SCALE;
    // Centered on the page's own dimensions, not the session reference
    // ones: geometry may have changed since load.
    let x = (page_w - placed_w) / 2.0;
    let y = (page_h - placed_h) / 2.0;

    let draw = format!("q {placed_w} 0 0 {placed_h} {x} {y} cm /{SIGNATURE_XOBJECT} Do Q");
    inner
        .add_page_contents(page_id, draw.into_bytes())
        .map_err(|e| SignError::Parse(format!("page_contents:{e}")))?;

    session.signature_present = true;
    log::debug!("signature placed at ({x}, {y}), {placed_w}x{placed_h} on {page_w}x{page_h} page");
    Ok(())
}

/// Register `image_id` under the page's /Resources /XObject dict. Resources
/// may live inline on the page or behind one indirection; the /XObject
/// entry is merged into a direct dict so a shared indirect one is not
/// mutated for other pages.
fn register_xobject(doc: &mut Document, page_id: ObjectId, image_id: ObjectId) -> Result<()> {
    enum ResSlot {
        Indirect(ObjectId),
        Inline,
        Missing,
    }

    let page = doc
        .get_object(page_id)
        .and_then(|o| o.as_dict())
        .map_err(|_| SignError::Parse("page_missing_dict".into()))?;
    let slot = match page.get(b"Resources") {
        Ok(Object::Reference(id)) => ResSlot::Indirect(*id),
        Ok(Object::Dictionary(_)) => ResSlot::Inline,
        Err(_) => ResSlot::Missing,
        Ok(_) => return Err(SignError::Parse("resources_invalid".into())),
    };

    // Merge into the /XObject dict up front so each write below is a single
    // set that cannot fail halfway.
    let current: Option<&Dictionary> = match slot {
        ResSlot::Indirect(id) => Some(
            doc.get_object(id)
                .and_then(|o| o.as_dict())
                .map_err(|_| SignError::Parse("resources_missing_dict".into()))?,
        ),
        ResSlot::Inline => page.get(b"Resources").ok().and_then(|r| r.as_dict().ok()),
        ResSlot::Missing => None,
    };
    let mut xobjects = match current.map(|d| d.get(b"XObject")) {
        Some(Ok(Object::Dictionary(existing))) => existing.clone(),
        Some(Ok(Object::Reference(id))) => doc
            .get_object(*id)
            .and_then(|o| o.as_dict())
            .map_err(|_| SignError::Parse("xobject_missing_dict".into()))?
            .clone(),
        Some(Ok(_)) => return Err(SignError::Parse("xobject_invalid".into())),
        Some(Err(_)) | None => dictionary! {},
    };
    xobjects.set(SIGNATURE_XOBJECT, image_id);

    match slot {
        ResSlot::Indirect(id) => {
            let res = doc
                .get_object_mut(id)
                .and_then(|o| o.as_dict_mut())
                .map_err(|_| SignError::Parse("resources_missing_dict".into()))?;
            res.set("XObject", xobjects);
        }
        ResSlot::Inline => {
            let res = doc
                .get_object_mut(page_id)
                .and_then(|o| o.as_dict_mut())
                .and_then(|p| p.get_mut(b"Resources"))
                .and_then(|r| r.as_dict_mut())
                .map_err(|_| SignError::Parse("resources_invalid".into()))?;
            res.set("XObject", xobjects);
        }
        ResSlot::Missing => {
            let page = doc
                .get_object_mut(page_id)
                .and_then(|o| o.as_dict_mut())
                .map_err(|_| SignError::Parse("page_missing_dict".into()))?;
            page.set("Resources", dictionary! { "XObject" => xobjects });
        }
    }
    Ok(())
}
