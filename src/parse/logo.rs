//! Inline feed logos
//!
//! Fetches a feed's logo through the URL cache and embeds it into the
//! document as a data URI, optionally resized and re-encoded.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use tracing::info;

use crate::fetch::FetchOptions;
use crate::mimetype;
use crate::parse::models::Feed;
use crate::parse::{ParseContext, ParseOptions};

/// Logo output formats selectable through `logo_format`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoFormat {
    Png,
    Jpeg,
}

impl LogoFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "png" => Some(Self::Png),
            "jpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    fn mimetype(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }
}

/// Fetch the feed's logo and store it as `logo_data`
///
/// Failures are recorded as a `fetch-logo` warning; the feed itself is
/// returned unaffected.
pub async fn inline_logo(ctx: &ParseContext, feed: &mut Feed, opts: &ParseOptions) {
    let Some(logo_url) = feed.logo.clone() else {
        return;
    };

    let fetch_opts = FetchOptions {
        use_cache: opts.use_cache,
        ..Default::default()
    };

    let resource = match ctx.fetcher.fetch(&logo_url, &fetch_opts).await {
        Ok(resource) => resource,
        Err(e) => {
            let msg = format!("could not fetch feed logo {}: {}", logo_url, e);
            info!("{}", msg);
            feed.add_warning("fetch-logo", &msg);
            return;
        }
    };

    let mut content = resource.content.clone();
    let mut mtype = mimetype::get_mimetype(None, &resource.url)
        .unwrap_or_else(|| "application/octet-stream".to_string());

    if opts.scale_to.is_some() || opts.logo_format.is_some() {
        match transform_image(&content, &mtype, opts.scale_to, opts.logo_format) {
            Ok((transformed, new_type)) => {
                content = transformed;
                mtype = new_type;
            }
            Err(e) => {
                let msg = format!("could not transform feed logo {}: {}", logo_url, e);
                info!("{}", msg);
                feed.add_warning("fetch-logo", &msg);
                return;
            }
        }
    }

    feed.logo_data = Some(get_data_uri(&content, &mtype));
}

/// Returns the data URI for the given bytes
pub fn get_data_uri(data: &[u8], mimetype: &str) -> String {
    format!("data:{};base64,{}", mimetype, BASE64.encode(data))
}

/// Resize and/or re-encode an image, returning the new bytes and mimetype
///
/// Resizing preserves the aspect ratio and bounds the longer side by
/// `size`. RGBA input is composited onto white before JPEG encoding.
pub fn transform_image(
    content: &[u8],
    mimetype: &str,
    size: Option<u32>,
    format: Option<LogoFormat>,
) -> Result<(Vec<u8>, String), image::ImageError> {
    let mut img = image::load_from_memory(content)?;

    if let Some(size) = size {
        img = img.thumbnail(size, size);
    }

    let format = format.unwrap_or_else(|| {
        // keep the input format where we know it
        match mimetype {
            "image/jpeg" => LogoFormat::Jpeg,
            _ => LogoFormat::Png,
        }
    });

    let img = match format {
        LogoFormat::Jpeg => DynamicImage::ImageRgb8(composite_on_white(&img)),
        LogoFormat::Png => img,
    };

    let mut out = Cursor::new(Vec::new());
    match format {
        LogoFormat::Png => img.write_to(&mut out, ImageOutputFormat::Png)?,
        LogoFormat::Jpeg => img.write_to(&mut out, ImageOutputFormat::Jpeg(85))?,
    }

    Ok((out.into_inner(), format.mimetype().to_string()))
}

/// Composite possible transparency onto a white background
fn composite_on_white(img: &DynamicImage) -> image::RgbImage {
    let rgba: RgbaImage = img.to_rgba8();
    let mut rgb = image::RgbImage::new(rgba.width(), rgba.height());

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let Rgba([r, g, b, a]) = *pixel;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        rgb.put_pixel(x, y, image::Rgb([blend(r), blend(g), blend(b)]));
    }

    rgb
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker_png(width: u32, height: u32) -> Vec<u8> {
        let mut img = RgbaImage::new(width, height);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = if (x + y) % 2 == 0 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 128])
            };
        }
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut out, ImageOutputFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_data_uri() {
        assert_eq!(
            get_data_uri(b"abc", "image/png"),
            "data:image/png;base64,YWJj"
        );
    }

    #[test]
    fn test_transform_resizes_within_bounds() {
        let png = checker_png(128, 96);
        let (out, mtype) =
            transform_image(&png, "image/png", Some(64), Some(LogoFormat::Png)).unwrap();
        assert_eq!(mtype, "image/png");

        let img = image::load_from_memory(&out).unwrap();
        assert!(img.width().max(img.height()) <= 64);
        // aspect ratio preserved
        assert_eq!(img.width(), 64);
        assert_eq!(img.height(), 48);
    }

    #[test]
    fn test_transform_jpeg_flattens_alpha() {
        let png = checker_png(16, 16);
        let (out, mtype) =
            transform_image(&png, "image/png", None, Some(LogoFormat::Jpeg)).unwrap();
        assert_eq!(mtype, "image/jpeg");
        let img = image::load_from_memory(&out).unwrap();
        assert_eq!(img.width(), 16);
    }

    #[test]
    fn test_transform_rejects_garbage() {
        assert!(transform_image(b"not an image", "image/png", Some(10), None).is_err());
    }

    #[test]
    fn test_logo_format_from_name() {
        assert_eq!(LogoFormat::from_name("png"), Some(LogoFormat::Png));
        assert_eq!(LogoFormat::from_name("jpeg"), Some(LogoFormat::Jpeg));
        assert_eq!(LogoFormat::from_name("webp"), None);
    }
}
