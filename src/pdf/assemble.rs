use std::io::Write;

use lopdf::{dictionary, Document, Object, Stream};

use crate::codec::{normalize_rgb, ImageCodec};
use crate::error::{CompressError, Result};
use crate::pdf::EncodedPage;
use crate::request::MediaKind;

/// Name of the page image in each page's resource dictionary
const IMAGE_NAME: &str = "Im0";

/// Builds a PDF with one full-page JPEG per entry, in order.
pub fn assemble_pdf(pages: &[EncodedPage]) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());

    for page in pages {
        let image_id = doc.add_object(image_stream(page));
        let content_id = doc.add_object(content_stream(page.width_pt, page.height_pt)?);
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), page.width_pt.into(), page.height_pt.into()],
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    IMAGE_NAME => image_id,
                },
            },
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)?;
    Ok(buffer)
}

fn image_stream(page: &EncodedPage) -> Stream {
    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => page.width_px as i64,
        "Height" => page.height_px as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
        "Filter" => "DCTDecode",
    };
    Stream::new(dict, page.jpeg.clone())
}

/// Draws the page image stretched over the whole media box.
fn content_stream(width_pt: f32, height_pt: f32) -> Result<Stream> {
    let ops = format!(
        "q\n{:.3} 0 0 {:.3} 0 0 cm\n/{} Do\nQ\n",
        width_pt, height_pt, IMAGE_NAME
    );
    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::best());
    encoder.write_all(ops.as_bytes())?;
    let compressed = encoder.finish()?;

    let dict = dictionary! {
        "Filter" => "FlateDecode",
    };
    Ok(Stream::new(dict, compressed))
}

/// Combines images into a PDF, one page per image sized at 72 DPI.
pub fn images_to_pdf<C: ImageCodec>(codec: &C, images: &[Vec<u8>], quality: u8) -> Result<Vec<u8>> {
    if images.is_empty() {
        return Err(CompressError::decode(
            MediaKind::Image,
            "at least one image is required",
        ));
    }

    let mut pages = Vec::with_capacity(images.len());
    for bytes in images {
        let image = normalize_rgb(codec.decode(bytes)?);
        let (width, height) = image.dimensions();
        pages.push(EncodedPage {
            jpeg: codec.encode(&image, quality)?,
            width_px: width,
            height_px: height,
            width_pt: width as f32,
            height_pt: height as f32,
        });
    }
    log::info!("Converting {} image(s) to PDF", pages.len());
    assemble_pdf(&pages)
}
