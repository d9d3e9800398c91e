// Renders the two artifacts behind an issued credential: the verification QR
// (PNG) and the single-page certificate document (PDF). Inputs are explicit
// so the renderer stays testable with fixed data; it reads no ambient state.
//
// The QR inside the PDF is drawn as filled vector modules straight from the
// code matrix, which keeps it crisp at print resolution and avoids a raster
// round-trip.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use image::Luma;
use printpdf::path::{PaintMode, WindingOrder};
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfLayerReference,
    Point, Polygon, Rgb,
};
use qrcode::{EcLevel, QrCode};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::scoring;
use crate::settings::Branding;

const PAGE_W: f32 = 297.0; // A4 landscape, mm
const PAGE_H: f32 = 210.0;
const QR_SIZE: f32 = 32.0;
const QR_MARGIN: f32 = 14.0;

pub struct CertificateData<'a> {
    pub recipient_name: &'a str,
    pub course_title: &'a str,
    pub score: i32,
    pub max_score: i32,
    pub number: &'a str,
    pub verify_url: &'a str,
    pub issued_on: NaiveDate,
}

/// Scannable verification code. Medium error correction is plenty for a
/// printed or on-screen credential.
pub fn render_qr_png(verify_url: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let code = QrCode::with_error_correction_level(verify_url.as_bytes(), EcLevel::M)
        .context("encoding verification URL")?;
    let img = code.render::<Luma<u8>>().quiet_zone(true).module_dimensions(8, 8).build();
    img.save(path).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Single-page certificate document. Fails before any ledger write happens,
/// so a failed save never leaves a dangling certificate row.
pub fn render_certificate_pdf(
    data: &CertificateData<'_>,
    branding: &Branding,
    path: &Path,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let (doc, page, layer) = PdfDocument::new(
        format!("Certificate {}", data.number),
        Mm(PAGE_W),
        Mm(PAGE_H),
        "certificate",
    );
    let layer = doc.get_page(page).get_layer(layer);

    let regular = doc.add_builtin_font(BuiltinFont::Helvetica)?;
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold)?;

    let accent = parse_hex_color(&branding.primary_color).unwrap_or((0.11, 0.30, 0.85));
    let black = (0.1, 0.1, 0.12);
    let gray = (0.35, 0.35, 0.38);

    draw_border(&layer, accent, 8.0, 1.6);
    draw_border(&layer, accent, 11.0, 0.5);

    centered_text(&layer, "Certificate of Completion", 34.0, 168.0, &bold, accent);
    centered_text(&layer, "This certifies that", 14.0, 148.0, &regular, gray);
    centered_text(&layer, data.recipient_name, 28.0, 130.0, &bold, black);
    centered_text(&layer, "has successfully completed", 14.0, 114.0, &regular, gray);
    centered_text(&layer, data.course_title, 22.0, 98.0, &bold, accent);
    centered_text(
        &layer,
        &format!("Score: {}", format_score(data.score, data.max_score)),
        14.0,
        80.0,
        &regular,
        black,
    );
    centered_text(
        &layer,
        &format!("Issued on {}", data.issued_on.format("%Y-%m-%d")),
        12.0,
        68.0,
        &regular,
        gray,
    );

    draw_qr_modules(&layer, data.verify_url, QR_MARGIN, QR_MARGIN, QR_SIZE)?;
    set_fill(&layer, gray);
    layer.use_text("Scan to verify", 9.0, Mm(QR_MARGIN), Mm(QR_MARGIN - 4.5), &regular);

    // issuer block, bottom right
    let no_line = format!("Certificate No. {}", data.number);
    set_fill(&layer, black);
    layer.use_text(
        no_line.as_str(),
        10.0,
        Mm(PAGE_W - 16.0 - text_width_mm(&no_line, 10.0)),
        Mm(22.0),
        &regular,
    );
    set_fill(&layer, gray);
    layer.use_text(
        branding.company_name.as_str(),
        10.0,
        Mm(PAGE_W - 16.0 - text_width_mm(&branding.company_name, 10.0)),
        Mm(16.5),
        &bold,
    );

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    doc.save(&mut BufWriter::new(file)).context("writing certificate pdf")?;
    Ok(())
}

/// "18 / 20 (90%)", or "0 / 0 (N/A)" when nothing was scoreable.
pub fn format_score(score: i32, max_score: i32) -> String {
    match scoring::percentage(score, max_score) {
        Some(pct) => format!("{} / {} ({}%)", score, max_score, pct),
        None => format!("{} / {} (N/A)", score, max_score),
    }
}

/// "#RRGGBB" to unit-range RGB.
pub fn parse_hex_color(hex: &str) -> Option<(f32, f32, f32)> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some((
        channel(0)? as f32 / 255.0,
        channel(2)? as f32 / 255.0,
        channel(4)? as f32 / 255.0,
    ))
}

fn set_fill(layer: &PdfLayerReference, (r, g, b): (f32, f32, f32)) {
    layer.set_fill_color(Color::Rgb(Rgb::new(r, g, b, None)));
}

// Built-in Helvetica carries no metrics we can query; 0.5em average advance
// is close enough to center display lines on a fixed layout.
fn text_width_mm(text: &str, font_size: f32) -> f32 {
    const PT_TO_MM: f32 = 0.352_778;
    text.chars().count() as f32 * font_size * 0.5 * PT_TO_MM
}

fn centered_text(
    layer: &PdfLayerReference,
    text: &str,
    font_size: f32,
    y: f32,
    font: &IndirectFontRef,
    color: (f32, f32, f32),
) {
    set_fill(layer, color);
    let x = (PAGE_W - text_width_mm(text, font_size)) / 2.0;
    layer.use_text(text, font_size, Mm(x), Mm(y), font);
}

fn draw_border(layer: &PdfLayerReference, color: (f32, f32, f32), inset: f32, thickness: f32) {
    let (r, g, b) = color;
    layer.set_outline_color(Color::Rgb(Rgb::new(r, g, b, None)));
    layer.set_outline_thickness(thickness);
    let corners = [
        (inset, inset),
        (PAGE_W - inset, inset),
        (PAGE_W - inset, PAGE_H - inset),
        (inset, PAGE_H - inset),
    ];
    let line = Line {
        points: corners
            .iter()
            .map(|&(x, y)| (Point::new(Mm(x), Mm(y)), false))
            .collect(),
        is_closed: true,
    };
    layer.add_line(line);
}

fn filled_rect(layer: &PdfLayerReference, x0: f32, y0: f32, x1: f32, y1: f32) {
    let ring = vec![
        (Point::new(Mm(x0), Mm(y0)), false),
        (Point::new(Mm(x1), Mm(y0)), false),
        (Point::new(Mm(x1), Mm(y1)), false),
        (Point::new(Mm(x0), Mm(y1)), false),
    ];
    layer.add_polygon(Polygon {
        rings: vec![ring],
        mode: PaintMode::Fill,
        winding_order: WindingOrder::NonZero,
    });
}

fn draw_qr_modules(
    layer: &PdfLayerReference,
    verify_url: &str,
    x: f32,
    y: f32,
    size: f32,
) -> Result<()> {
    let code = QrCode::with_error_correction_level(verify_url.as_bytes(), EcLevel::M)
        .context("encoding verification URL")?;
    let width = code.width();
    let module = size / width as f32;

    // quiet zone
    set_fill(layer, (1.0, 1.0, 1.0));
    filled_rect(layer, x - 2.0, y - 2.0, x + size + 2.0, y + size + 2.0);

    set_fill(layer, (0.0, 0.0, 0.0));
    for (i, color) in code.to_colors().iter().enumerate() {
        if *color != qrcode::Color::Dark {
            continue;
        }
        let col = (i % width) as f32;
        let row = (i / width) as f32;
        // matrix row 0 is the top of the symbol; PDF y grows upward
        let x0 = x + col * module;
        let y0 = y + size - (row + 1.0) * module;
        filled_rect(layer, x0, y0, x0 + module, y0 + module);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colors_parse_and_reject() {
        assert_eq!(parse_hex_color("#000000"), Some((0.0, 0.0, 0.0)));
        assert_eq!(parse_hex_color("#FF0000").map(|c| c.0), Some(1.0));
        assert_eq!(parse_hex_color("1D4ED8"), None);
        assert_eq!(parse_hex_color("#12345"), None);
        assert_eq!(parse_hex_color("#GGGGGG"), None);
    }

    #[test]
    fn score_line_handles_zero_max() {
        assert_eq!(format_score(18, 20), "18 / 20 (90%)");
        assert_eq!(format_score(0, 0), "0 / 0 (N/A)");
    }
}
