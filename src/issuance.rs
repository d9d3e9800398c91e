// Couples a passing completion to a credential: allocate a number, render
// both artifacts to disk, then insert the ledger row last. Orphaned files
// from a failed insert are acceptable garbage; a row pointing at missing
// files is not.

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::{self, Db};
use crate::error::AppError;
use crate::models::{Certificate, CertificateTemplate, Course, IssueCertificateRequest, User};
use crate::renderer::{self, CertificateData};
use crate::settings::Branding;
use crate::token;

const NUMBER_CONSTRAINT: &str = "certificates_number_key";
const ACTIVE_CONSTRAINT: &str = "certificates_active_user_course_key";

/// `Some(0)` expires the moment it is issued; `None` never expires.
pub fn compute_expiry(issued_at: DateTime<Utc>, expiry_days: Option<i32>) -> Option<DateTime<Utc>> {
    expiry_days.map(|days| issued_at + Duration::days(days as i64))
}

pub async fn find_active(
    db: &Db,
    user_id: Uuid,
    course_id: Uuid,
) -> Result<Option<Certificate>, sqlx::Error> {
    sqlx::query_as::<_, Certificate>(
        "SELECT * FROM certificates WHERE user_id = $1 AND course_id = $2 AND revoked_at IS NULL",
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_optional(db)
    .await
}

pub async fn issue(
    db: &Db,
    cfg: &AppConfig,
    branding: &Branding,
    req: &IssueCertificateRequest,
) -> Result<Certificate, AppError> {
    if req.max_score < 0 || req.score < 0 {
        return Err(AppError::validation("score and maxScore must be non-negative"));
    }
    if matches!(req.expiry_days, Some(days) if days < 0) {
        return Err(AppError::validation("expiryDays must be non-negative"));
    }

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(req.user_id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    let course = sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = $1")
        .bind(req.course_id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound("course"))?;

    // An explicitly requested template must exist; the course default may
    // have been deleted out from under us and silently falls away.
    let template = match req.template_id.or(course.certificate_template_id) {
        Some(id) => {
            let found = sqlx::query_as::<_, CertificateTemplate>(
                "SELECT * FROM certificate_templates WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(db)
            .await?;
            if found.is_none() && req.template_id.is_some() {
                return Err(AppError::NotFound("certificate template"));
            }
            found
        }
        None => None,
    };

    if let Some(existing) = find_active(db, req.user_id, req.course_id).await? {
        return Ok(existing);
    }

    let expiry_days = req
        .expiry_days
        .or_else(|| template.as_ref().and_then(|t| t.default_expiry_days))
        .or(course.certificate_expiry_days);

    let effective_branding = Branding {
        primary_color: template
            .as_ref()
            .and_then(|t| t.primary_color.clone())
            .unwrap_or_else(|| branding.primary_color.clone()),
        ..branding.clone()
    };

    // A number collision is practically unreachable, but the ledger has the
    // final say; regenerate and re-render on the off chance.
    for _ in 0..3 {
        let issued_at = Utc::now();
        let number = token::generate_number(issued_at);
        let verify_url = token::verification_url(&cfg.base_url, &number);

        let qr_path = cfg.qrcodes_dir().join(format!("{number}.png"));
        let pdf_path = cfg.certificates_dir().join(format!("{number}.pdf"));

        renderer::render_qr_png(&verify_url, &qr_path)?;
        renderer::render_certificate_pdf(
            &CertificateData {
                recipient_name: &user.name,
                course_title: &course.title,
                score: req.score,
                max_score: req.max_score,
                number: &number,
                verify_url: &verify_url,
                issued_on: issued_at.date_naive(),
            },
            &effective_branding,
            &pdf_path,
        )?;

        let inserted = sqlx::query_as::<_, Certificate>(
            "INSERT INTO certificates \
             (number, user_id, course_id, template_id, score, max_score, \
              pdf_url, qr_code_url, issued_at, expiry_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING *",
        )
        .bind(&number)
        .bind(req.user_id)
        .bind(req.course_id)
        .bind(template.as_ref().map(|t| t.id))
        .bind(req.score)
        .bind(req.max_score)
        .bind(format!("/files/certificates/{number}.pdf"))
        .bind(format!("/files/qrcodes/{number}.png"))
        .bind(issued_at)
        .bind(compute_expiry(issued_at, expiry_days))
        .fetch_one(db)
        .await;

        match inserted {
            Ok(cert) => {
                tracing::info!(number = %cert.number, user = %user.id, course = %course.id, "certificate issued");
                return Ok(cert);
            }
            Err(err) if db::is_unique_violation(&err, NUMBER_CONSTRAINT) => {
                tracing::warn!(number = %number, "certificate number collision, regenerating");
                continue;
            }
            Err(err) if db::is_unique_violation(&err, ACTIVE_CONSTRAINT) => {
                // lost a duplicate-trigger race; the winner's row is the answer
                return find_active(db, req.user_id, req.course_id)
                    .await?
                    .ok_or_else(|| anyhow!("active certificate vanished after conflict").into());
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err(anyhow!("could not allocate a unique certificate number").into())
}

/// Terminal; the first revocation timestamp is never overwritten and the
/// artifacts stay on disk.
pub async fn revoke(db: &Db, id: Uuid, reason: &str) -> Result<Certificate, AppError> {
    if reason.trim().is_empty() {
        return Err(AppError::validation("reason is required"));
    }
    let updated = sqlx::query_as::<_, Certificate>(
        "UPDATE certificates SET revoked_at = now(), revoked_reason = $2 \
         WHERE id = $1 AND revoked_at IS NULL \
         RETURNING *",
    )
    .bind(id)
    .bind(reason.trim())
    .fetch_optional(db)
    .await?;

    match updated {
        Some(cert) => {
            tracing::info!(number = %cert.number, "certificate revoked");
            Ok(cert)
        }
        None => {
            sqlx::query_as::<_, Certificate>("SELECT * FROM certificates WHERE id = $1")
                .bind(id)
                .fetch_optional(db)
                .await?
                .ok_or(AppError::NotFound("certificate"))?;
            Err(AppError::conflict("certificate is already revoked"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_day_expiry_lands_on_issuance_instant() {
        let issued = Utc::now();
        assert_eq!(compute_expiry(issued, Some(0)), Some(issued));
    }

    #[test]
    fn missing_expiry_means_never() {
        assert_eq!(compute_expiry(Utc::now(), None), None);
    }

    #[test]
    fn positive_expiry_adds_whole_days() {
        let issued = Utc::now();
        assert_eq!(compute_expiry(issued, Some(365)), Some(issued + Duration::days(365)));
    }
}
