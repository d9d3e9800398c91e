use chrono::NaiveDate;
use tempfile::TempDir;

use rustilms_server::renderer::{self, CertificateData};
use rustilms_server::settings::Branding;
use rustilms_server::token;

fn sample_data<'a>(number: &'a str, url: &'a str) -> CertificateData<'a> {
    CertificateData {
        recipient_name: "Ada Lovelace",
        course_title: "Workplace Safety Fundamentals",
        score: 18,
        max_score: 20,
        number,
        verify_url: url,
        issued_on: NaiveDate::from_ymd_opt(2026, 8, 8).unwrap(),
    }
}

#[test]
fn qr_png_lands_on_disk_with_png_magic() {
    let dir = TempDir::new().unwrap();
    let number = token::generate_number(chrono::Utc::now());
    let url = token::verification_url("https://lms.example.com", &number);
    let path = dir.path().join("qrcodes").join(format!("{number}.png"));

    renderer::render_qr_png(&url, &path).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert!(bytes.len() > 100);
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
}

#[test]
fn certificate_pdf_lands_on_disk_with_pdf_magic() {
    let dir = TempDir::new().unwrap();
    let number = token::generate_number(chrono::Utc::now());
    let url = token::verification_url("https://lms.example.com", &number);
    let path = dir.path().join("certificates").join(format!("{number}.pdf"));

    renderer::render_certificate_pdf(&sample_data(&number, &url), &Branding::default(), &path)
        .unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert!(bytes.len() > 1_000);
    assert_eq!(&bytes[..5], b"%PDF-");
}

#[test]
fn zero_max_score_renders_without_dividing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("zero.pdf");
    let data = CertificateData {
        score: 0,
        max_score: 0,
        ..sample_data("CERT-1700000000000-0A1B2C3D", "https://lms.example.com/certificates/verify/CERT-1700000000000-0A1B2C3D")
    };

    renderer::render_certificate_pdf(&data, &Branding::default(), &path).unwrap();
    assert!(path.exists());
}

#[test]
fn unparseable_branding_color_falls_back_to_default() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("branded.pdf");
    let branding = Branding {
        primary_color: "cornflower".into(),
        company_name: "Acme Safety Ltd".into(),
        logo_url: None,
    };

    renderer::render_certificate_pdf(
        &sample_data("CERT-1-0A1B2C3D", "https://lms.example.com/certificates/verify/CERT-1-0A1B2C3D"),
        &branding,
        &path,
    )
    .unwrap();
    assert!(path.exists());
}
