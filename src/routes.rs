use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::config::AppConfig;
use crate::db::{self, Db};
use crate::enrollment;
use crate::error::AppError;
use crate::issuance;
use crate::models::*;
use crate::scoring::{self, AnswerInput};
use crate::settings;
use crate::token;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub cfg: Arc<AppConfig>,
}

pub fn router(db: Db, cfg: Arc<AppConfig>) -> Router {
    Router::new()
        // quiz attempt engine
        .route("/api/quizzes/:id/start", post(start_quiz))
        .route("/api/quizzes/:id/attempts/:attempt_id/submit", post(submit_quiz))
        // certificate ledger
        .route("/api/certificates", get(list_certificates).post(issue_certificate))
        .route("/api/certificates/:id", get(get_certificate).patch(revoke_certificate))
        .route("/api/certificates/:id/download", get(download_certificate))
        // public verification
        .route("/api/certificates/verify/:number", get(verify_certificate))
        .route("/certificates/verify/:number", get(verify_page))
        // template administration
        .route("/api/certificate-templates", get(list_templates).post(create_template))
        .route(
            "/api/certificate-templates/:id",
            patch(update_template).delete(delete_template),
        )
        // rendered artifacts
        .route("/files/certificates/:name", get(serve_certificate_pdf))
        .route("/files/qrcodes/:name", get(serve_qr_png))
        .with_state(AppState { db, cfg })
}

// --- quiz attempt engine ---

const ATTEMPT_SEQUENCE_CONSTRAINT: &str = "quiz_attempts_sequence_key";

async fn start_quiz(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(quiz_id): Path<Uuid>,
) -> Result<Json<StartAttemptResponse>, AppError> {
    let db = &state.db;
    let quiz = sqlx::query_as::<_, Quiz>("SELECT * FROM quizzes WHERE id = $1")
        .bind(quiz_id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound("quiz"))?;

    let enrollment = sqlx::query_as::<_, Enrollment>(
        "SELECT * FROM enrollments WHERE user_id = $1 AND course_id = $2",
    )
    .bind(user.id)
    .bind(quiz.course_id)
    .fetch_optional(db)
    .await?
    .ok_or(AppError::Forbidden)?;
    if enrollment.status == enrollment::STATUS_COMPLETED {
        return Err(AppError::conflict("enrollment is already completed"));
    }

    // The unique constraint on (quiz, user, attempt_no) closes the race
    // between two concurrent starts; losing side recomputes once.
    let mut attempt: Option<QuizAttempt> = None;
    for _ in 0..2 {
        let prior: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM quiz_attempts WHERE quiz_id = $1 AND user_id = $2",
        )
        .bind(quiz_id)
        .bind(user.id)
        .fetch_one(db)
        .await?;
        let next_no = prior as i32 + 1;
        if next_no > quiz.attempts_allowed {
            return Err(AppError::conflict("attempt limit exceeded"));
        }

        let inserted = sqlx::query_as::<_, QuizAttempt>(
            "INSERT INTO quiz_attempts (quiz_id, user_id, attempt_no) \
             VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(quiz_id)
        .bind(user.id)
        .bind(next_no)
        .fetch_one(db)
        .await;
        match inserted {
            Ok(row) => {
                attempt = Some(row);
                break;
            }
            Err(err) if db::is_unique_violation(&err, ATTEMPT_SEQUENCE_CONSTRAINT) => continue,
            Err(err) => return Err(err.into()),
        }
    }
    let attempt =
        attempt.ok_or_else(|| AppError::conflict("concurrent attempt start, please retry"))?;

    enrollment::record_activity(db, enrollment.id).await?;

    let mut questions = sqlx::query_as::<_, Question>(
        "SELECT * FROM questions WHERE quiz_id = $1 ORDER BY position",
    )
    .bind(quiz_id)
    .fetch_all(db)
    .await?;
    let options = load_options(db, &questions).await?;

    // Fresh permutation per start; the order is returned, never stored.
    if quiz.randomize {
        questions.shuffle(&mut rand::thread_rng());
    }

    let questions = questions
        .into_iter()
        .enumerate()
        .map(|(i, q)| {
            let opts = options
                .get(&q.id)
                .into_iter()
                .flatten()
                .map(|o| OptionView { id: o.id, label: o.label.clone(), order: o.position })
                .collect();
            QuestionView {
                id: q.id,
                question_type: q.question_type,
                prompt_html: q.prompt_html,
                points: q.points,
                order: i as i32,
                options: opts,
            }
        })
        .collect();

    Ok(Json(StartAttemptResponse {
        attempt: AttemptView {
            id: attempt.id,
            attempt_no: attempt.attempt_no,
            started_at: attempt.started_at,
            time_limit_sec: quiz.time_limit_sec,
        },
        questions,
    }))
}

#[derive(Deserialize, Debug)]
struct SubmitRequest {
    answers: Vec<AnswerInput>,
}

async fn submit_quiz(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((quiz_id, attempt_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, AppError> {
    let db = &state.db;
    let attempt = sqlx::query_as::<_, QuizAttempt>(
        "SELECT * FROM quiz_attempts WHERE id = $1 AND quiz_id = $2",
    )
    .bind(attempt_id)
    .bind(quiz_id)
    .fetch_optional(db)
    .await?
    .ok_or(AppError::NotFound("attempt"))?;
    if attempt.user_id != user.id {
        return Err(AppError::Forbidden);
    }
    if attempt.submitted_at.is_some() {
        return Err(AppError::conflict("attempt already submitted"));
    }

    let quiz = sqlx::query_as::<_, Quiz>("SELECT * FROM quizzes WHERE id = $1")
        .bind(quiz_id)
        .fetch_one(db)
        .await?;
    let course = sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = $1")
        .bind(quiz.course_id)
        .fetch_one(db)
        .await?;

    let questions = sqlx::query_as::<_, Question>(
        "SELECT * FROM questions WHERE quiz_id = $1 ORDER BY position",
    )
    .bind(quiz_id)
    .fetch_all(db)
    .await?;
    let mut options = load_options(db, &questions).await?;
    let graded_input: Vec<(Question, Vec<QuestionOption>)> = questions
        .into_iter()
        .map(|q| {
            let opts = options.remove(&q.id).unwrap_or_default();
            (q, opts)
        })
        .collect();

    let graded = scoring::grade(&graded_input, &req.answers);
    let pass_mark = scoring::effective_pass_mark(quiz.pass_mark_override, course.pass_mark);
    let passed = scoring::is_passing(graded.score, graded.max_score, pass_mark);

    // Attempts are immutable once submitted; the WHERE clause rejects a
    // concurrent double-submit that got past the read above.
    let updated = sqlx::query_as::<_, QuizAttempt>(
        "UPDATE quiz_attempts \
         SET score = $2, max_score = $3, passed = $4, submitted_at = now() \
         WHERE id = $1 AND submitted_at IS NULL \
         RETURNING *",
    )
    .bind(attempt_id)
    .bind(graded.score)
    .bind(graded.max_score)
    .bind(passed)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::conflict("attempt already submitted"))?;

    let mut certificate = None;
    if passed {
        let enrollment = sqlx::query_as::<_, Enrollment>(
            "SELECT * FROM enrollments WHERE user_id = $1 AND course_id = $2",
        )
        .bind(user.id)
        .bind(course.id)
        .fetch_optional(db)
        .await?;
        if let Some(enrollment) = enrollment {
            enrollment::record_completion(db, enrollment.id).await?;
        }

        if course.requires_certificate {
            let branding = settings::load_branding(db).await?;
            let cert = issuance::issue(
                db,
                &state.cfg,
                &branding,
                &IssueCertificateRequest {
                    user_id: user.id,
                    course_id: course.id,
                    score: graded.score,
                    max_score: graded.max_score,
                    template_id: None,
                    expiry_days: None,
                },
            )
            .await?;
            let recipient = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
                .bind(user.id)
                .fetch_one(db)
                .await?;
            certificate =
                Some(CertificateView::new(cert, recipient.name, course.title.clone(), Utc::now()));
        }
    }

    Ok(Json(SubmitResponse {
        attempt: updated,
        percentage: scoring::percentage(graded.score, graded.max_score),
        pass_mark,
        certificate,
    }))
}

async fn load_options(
    db: &Db,
    questions: &[Question],
) -> Result<HashMap<Uuid, Vec<QuestionOption>>, sqlx::Error> {
    let ids: Vec<Uuid> = questions.iter().map(|q| q.id).collect();
    let rows = sqlx::query_as::<_, QuestionOption>(
        "SELECT * FROM question_options WHERE question_id = ANY($1) ORDER BY position",
    )
    .bind(ids)
    .fetch_all(db)
    .await?;
    let mut by_question: HashMap<Uuid, Vec<QuestionOption>> = HashMap::new();
    for row in rows {
        by_question.entry(row.question_id).or_default().push(row);
    }
    Ok(by_question)
}

// --- certificate ledger ---

#[derive(sqlx::FromRow)]
struct CertificateJoinRow {
    #[sqlx(flatten)]
    certificate: Certificate,
    recipient_name: String,
    course_title: String,
}

const CERTIFICATE_JOIN: &str = "SELECT c.*, u.name AS recipient_name, co.title AS course_title \
     FROM certificates c \
     JOIN users u ON u.id = c.user_id \
     JOIN courses co ON co.id = c.course_id";

impl CertificateJoinRow {
    fn into_view(self) -> CertificateView {
        CertificateView::new(self.certificate, self.recipient_name, self.course_title, Utc::now())
    }
}

async fn fetch_view_by_id(db: &Db, id: Uuid) -> Result<Option<CertificateJoinRow>, sqlx::Error> {
    sqlx::query_as::<_, CertificateJoinRow>(&format!("{CERTIFICATE_JOIN} WHERE c.id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

async fn list_certificates(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<CertificateListQuery>,
) -> Result<Json<Vec<CertificateView>>, AppError> {
    // learners only ever see their own ledger entries
    let user_filter = if user.role >= crate::auth::Role::Manager {
        query.user_id
    } else {
        Some(user.id)
    };
    let rows = sqlx::query_as::<_, CertificateJoinRow>(&format!(
        "{CERTIFICATE_JOIN} \
         WHERE ($1::uuid IS NULL OR c.user_id = $1) \
           AND ($2::uuid IS NULL OR c.course_id = $2) \
         ORDER BY c.issued_at DESC"
    ))
    .bind(user_filter)
    .bind(query.course_id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(rows.into_iter().map(CertificateJoinRow::into_view).collect()))
}

async fn issue_certificate(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<IssueCertificateRequest>,
) -> Result<(StatusCode, Json<CertificateView>), AppError> {
    user.require_admin()?;
    let branding = settings::load_branding(&state.db).await?;
    let cert = issuance::issue(&state.db, &state.cfg, &branding, &req).await?;
    let view = fetch_view_by_id(&state.db, cert.id)
        .await?
        .ok_or(AppError::NotFound("certificate"))?
        .into_view();
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_certificate(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CertificateView>, AppError> {
    let row = fetch_view_by_id(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("certificate"))?;
    if !user.can_view_user(row.certificate.user_id) {
        return Err(AppError::Forbidden);
    }
    Ok(Json(row.into_view()))
}

async fn revoke_certificate(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<RevokeRequest>,
) -> Result<Json<CertificateView>, AppError> {
    user.require_admin()?;
    let cert = issuance::revoke(&state.db, id, &req.reason).await?;
    let view = fetch_view_by_id(&state.db, cert.id)
        .await?
        .ok_or(AppError::NotFound("certificate"))?
        .into_view();
    Ok(Json(view))
}

async fn download_certificate(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let row = fetch_view_by_id(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("certificate"))?;
    if !user.can_view_user(row.certificate.user_id) {
        return Err(AppError::Forbidden);
    }
    let number = &row.certificate.number;
    let path = state.cfg.certificates_dir().join(format!("{number}.pdf"));
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{number}.pdf\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

// --- public verification ---

async fn verify_certificate(
    State(state): State<AppState>,
    Path(number): Path<String>,
) -> Result<Response, AppError> {
    let row = sqlx::query_as::<_, CertificateJoinRow>(&format!(
        "{CERTIFICATE_JOIN} WHERE c.number = $1"
    ))
    .bind(&number)
    .fetch_optional(&state.db)
    .await?;

    let Some(row) = row else {
        // not-found is distinguishable from found-but-invalid
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "valid": false, "error": "certificate not found" })),
        )
            .into_response());
    };

    let view = row.into_view();
    Ok(Json(VerifyResponse {
        valid: !view.is_expired && !view.is_revoked,
        status: view.status,
        is_expired: view.is_expired,
        is_revoked: view.is_revoked,
        certificate: view,
    })
    .into_response())
}

async fn verify_page(
    State(state): State<AppState>,
    Path(number): Path<String>,
) -> Result<Html<String>, AppError> {
    let row = sqlx::query_as::<_, CertificateJoinRow>(&format!(
        "{CERTIFICATE_JOIN} WHERE c.number = $1"
    ))
    .bind(&number)
    .fetch_optional(&state.db)
    .await?;

    let html = match row {
        None => verify_page_html(
            "Certificate not found",
            "#B91C1C",
            &format!(
                "<p>No certificate with number <code>{}</code> exists.</p>",
                escape_html(&number)
            ),
        ),
        Some(row) => {
            let view = row.into_view();
            let (title, color) = match view.status {
                CertificateStatus::Active => ("Certificate is valid", "#15803D"),
                CertificateStatus::Expired => ("Certificate has expired", "#B45309"),
                CertificateStatus::Revoked => ("Certificate has been revoked", "#B91C1C"),
            };
            let cert = &view.certificate;
            let expiry = cert
                .expiry_at
                .map(|t| t.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "never".into());
            let body = format!(
                "<dl>\
                 <dt>Recipient</dt><dd>{}</dd>\
                 <dt>Course</dt><dd>{}</dd>\
                 <dt>Score</dt><dd>{}</dd>\
                 <dt>Number</dt><dd><code>{}</code></dd>\
                 <dt>Issued</dt><dd>{}</dd>\
                 <dt>Expires</dt><dd>{}</dd>\
                 </dl>",
                escape_html(&view.recipient_name),
                escape_html(&view.course_title),
                crate::renderer::format_score(cert.score, cert.max_score),
                escape_html(&cert.number),
                cert.issued_at.format("%Y-%m-%d"),
                expiry,
            );
            verify_page_html(title, color, &body)
        }
    };
    Ok(Html(html))
}

fn verify_page_html(title: &str, color: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>Certificate Verification</title>
  <style>
    body{{font-family:system-ui,sans-serif;max-width:640px;margin:48px auto;padding:0 16px}}
    h1{{color:{color};font-size:1.4rem}}
    dt{{font-weight:600;margin-top:12px}}
    dd{{margin:2px 0 0 0;color:#333}}
    code{{background:#f3f4f6;padding:2px 4px;border-radius:3px}}
  </style>
</head>
<body>
<h1>{title}</h1>
{body}
</body>
</html>"#
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// --- template administration ---

async fn list_templates(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Result<Json<Vec<CertificateTemplate>>, AppError> {
    let rows = sqlx::query_as::<_, CertificateTemplate>(
        "SELECT * FROM certificate_templates ORDER BY created_at",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(Json(rows))
}

async fn create_template(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreateTemplateRequest>,
) -> Result<(StatusCode, Json<CertificateTemplate>), AppError> {
    user.require_admin()?;
    if req.name.trim().is_empty() {
        return Err(AppError::validation("name is required"));
    }
    let row = sqlx::query_as::<_, CertificateTemplate>(
        "INSERT INTO certificate_templates (name, primary_color, default_expiry_days) \
         VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(req.name.trim())
    .bind(req.primary_color)
    .bind(req.default_expiry_days)
    .fetch_one(&state.db)
    .await?;
    Ok((StatusCode::CREATED, Json(row)))
}

async fn update_template(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTemplateRequest>,
) -> Result<Json<CertificateTemplate>, AppError> {
    user.require_admin()?;
    let row = sqlx::query_as::<_, CertificateTemplate>(
        "UPDATE certificate_templates \
         SET name = COALESCE($2, name), \
             primary_color = COALESCE($3, primary_color), \
             default_expiry_days = COALESCE($4, default_expiry_days) \
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(req.name)
    .bind(req.primary_color)
    .bind(req.default_expiry_days)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("certificate template"))?;
    Ok(Json(row))
}

async fn delete_template(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    user.require_admin()?;
    let result = sqlx::query("DELETE FROM certificate_templates WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("certificate template"));
    }
    Ok(StatusCode::NO_CONTENT)
}

// --- rendered artifacts ---

/// Filenames are derived from certificate numbers, so anything that is not
/// `<well-formed number><expected ext>` is rejected before touching the
/// filesystem. The number charset alone excludes separators and dots.
fn checked_artifact_stem<'a>(name: &'a str, ext: &str) -> Option<&'a str> {
    let stem = name.strip_suffix(ext)?;
    token::is_well_formed(stem).then_some(stem)
}

async fn serve_certificate_pdf(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    checked_artifact_stem(&name, ".pdf").ok_or(AppError::NotFound("file"))?;
    serve_file(state.cfg.certificates_dir().join(&name), "application/pdf").await
}

async fn serve_qr_png(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    checked_artifact_stem(&name, ".png").ok_or(AppError::NotFound("file"))?;
    serve_file(state.cfg.qrcodes_dir().join(&name), "image/png").await
}

async fn serve_file(path: std::path::PathBuf, content_type: &'static str) -> Result<Response, AppError> {
    let bytes = tokio::fs::read(&path).await.map_err(|_| AppError::NotFound("file"))?;
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_names_must_be_certificate_shaped() {
        assert_eq!(
            checked_artifact_stem("CERT-1700000000000-0A1B2C3D.pdf", ".pdf"),
            Some("CERT-1700000000000-0A1B2C3D")
        );
        assert!(checked_artifact_stem("CERT-1700000000000-0A1B2C3D.pdf", ".png").is_none());
        assert!(checked_artifact_stem("../../etc/passwd", ".pdf").is_none());
        assert!(checked_artifact_stem("..%2F..%2Fsecret.pdf", ".pdf").is_none());
        assert!(checked_artifact_stem("evil.sh", ".pdf").is_none());
    }

    #[test]
    fn html_escaping_neutralizes_markup() {
        assert_eq!(
            escape_html("<script>alert('x')</script>"),
            "&lt;script&gt;alert('x')&lt;/script&gt;"
        );
    }
}
