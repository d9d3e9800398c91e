use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub pass_mark: i32,
    pub requires_certificate: bool,
    pub certificate_template_id: Option<Uuid>,
    pub certificate_expiry_days: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub status: String,
    pub assigned_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub attempts_allowed: i32,
    pub time_limit_sec: Option<i32>,
    pub randomize: bool,
    pub pass_mark_override: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub question_type: String,
    pub prompt_html: String,
    pub points: i32,
    pub position: i32,
    pub answer_key: Option<String>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOption {
    pub id: Uuid,
    pub question_id: Uuid,
    pub label: String,
    pub is_correct: bool,
    pub position: i32,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct QuizAttempt {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub user_id: Uuid,
    pub attempt_no: i32,
    pub score: i32,
    pub max_score: i32,
    pub passed: bool,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CertificateTemplate {
    pub id: Uuid,
    pub name: String,
    pub primary_color: Option<String>,
    pub default_expiry_days: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub id: Uuid,
    pub number: String,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub template_id: Option<Uuid>,
    pub score: i32,
    pub max_score: i32,
    pub pdf_url: String,
    pub qr_code_url: String,
    pub issued_at: DateTime<Utc>,
    pub expiry_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CertificateStatus {
    Active,
    Expired,
    Revoked,
}

impl Certificate {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// `expiry_at == issued_at` counts as expired at any later instant.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expiry_at, Some(expiry) if expiry <= now)
    }

    /// Revocation wins over expiry in display.
    pub fn status(&self, now: DateTime<Utc>) -> CertificateStatus {
        if self.is_revoked() {
            CertificateStatus::Revoked
        } else if self.is_expired(now) {
            CertificateStatus::Expired
        } else {
            CertificateStatus::Active
        }
    }
}

// --- wire DTOs ---

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AttemptView {
    pub id: Uuid,
    pub attempt_no: i32,
    pub started_at: DateTime<Utc>,
    pub time_limit_sec: Option<i32>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OptionView {
    pub id: Uuid,
    pub label: String,
    pub order: i32,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub question_type: String,
    pub prompt_html: String,
    pub points: i32,
    pub order: i32,
    pub options: Vec<OptionView>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StartAttemptResponse {
    pub attempt: AttemptView,
    pub questions: Vec<QuestionView>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub attempt: QuizAttempt,
    pub percentage: Option<u32>,
    pub pass_mark: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<CertificateView>,
}

/// Certificate as returned to clients: the row plus derived lifecycle state
/// and the display names verification screens need.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CertificateView {
    #[serde(flatten)]
    pub certificate: Certificate,
    pub status: CertificateStatus,
    pub is_expired: bool,
    pub is_revoked: bool,
    pub recipient_name: String,
    pub course_title: String,
}

impl CertificateView {
    pub fn new(
        certificate: Certificate,
        recipient_name: String,
        course_title: String,
        now: DateTime<Utc>,
    ) -> Self {
        let status = certificate.status(now);
        let is_expired = certificate.is_expired(now);
        let is_revoked = certificate.is_revoked();
        CertificateView {
            certificate,
            status,
            is_expired,
            is_revoked,
            recipient_name,
            course_title,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub valid: bool,
    pub status: CertificateStatus,
    pub is_expired: bool,
    pub is_revoked: bool,
    pub certificate: CertificateView,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct IssueCertificateRequest {
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub score: i32,
    pub max_score: i32,
    pub template_id: Option<Uuid>,
    pub expiry_days: Option<i32>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RevokeRequest {
    pub reason: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CertificateListQuery {
    pub user_id: Option<Uuid>,
    pub course_id: Option<Uuid>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateTemplateRequest {
    pub name: String,
    pub primary_color: Option<String>,
    pub default_expiry_days: Option<i32>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTemplateRequest {
    pub name: Option<String>,
    pub primary_color: Option<String>,
    pub default_expiry_days: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn cert(expiry: Option<DateTime<Utc>>, revoked: Option<DateTime<Utc>>) -> Certificate {
        let issued = Utc::now();
        Certificate {
            id: Uuid::new_v4(),
            number: "CERT-1700000000000-0A1B2C3D".into(),
            user_id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            template_id: None,
            score: 9,
            max_score: 10,
            pdf_url: "/files/certificates/x.pdf".into(),
            qr_code_url: "/files/qrcodes/x.png".into(),
            issued_at: issued,
            expiry_at: expiry,
            revoked_at: revoked,
            revoked_reason: None,
        }
    }

    #[test]
    fn no_expiry_never_expires() {
        let c = cert(None, None);
        assert!(!c.is_expired(Utc::now() + Duration::days(10_000)));
        assert_eq!(c.status(Utc::now()), CertificateStatus::Active);
    }

    #[test]
    fn revocation_wins_over_expiry() {
        let now = Utc::now();
        let c = cert(Some(now - Duration::days(1)), Some(now));
        assert!(c.is_expired(now));
        assert_eq!(c.status(now), CertificateStatus::Revoked);
    }

    #[test]
    fn zero_day_expiry_is_immediately_expired() {
        let c = cert(None, None);
        let expired_at_issue = Certificate { expiry_at: Some(c.issued_at), ..c };
        let just_after = expired_at_issue.issued_at + Duration::milliseconds(1);
        assert!(expired_at_issue.is_expired(just_after));
        assert_eq!(expired_at_issue.status(just_after), CertificateStatus::Expired);
    }
}
