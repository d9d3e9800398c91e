// Grading rules for quiz submissions. Policy choices documented in DESIGN.md:
// multi_choice is exact-set all-or-nothing, short_answer is a trimmed
// case-insensitive match against the stored key.

use serde::Deserialize;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::models::{Question, QuestionOption};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionKind {
    SingleChoice,
    MultiChoice,
    TrueFalse,
    ShortAnswer,
}

impl QuestionKind {
    pub fn parse(s: &str) -> Option<QuestionKind> {
        match s {
            "single_choice" => Some(QuestionKind::SingleChoice),
            "multi_choice" => Some(QuestionKind::MultiChoice),
            "true_false" => Some(QuestionKind::TrueFalse),
            "short_answer" => Some(QuestionKind::ShortAnswer),
            _ => None,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AnswerInput {
    pub question_id: Uuid,
    #[serde(default)]
    pub selected_option_ids: Vec<Uuid>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradedQuiz {
    pub score: i32,
    pub max_score: i32,
}

/// Sum earned points over every question; unanswered questions earn zero but
/// still count toward the possible total. Unknown question types never award
/// points.
pub fn grade(questions: &[(Question, Vec<QuestionOption>)], answers: &[AnswerInput]) -> GradedQuiz {
    let mut score = 0;
    let mut max_score = 0;
    for (question, options) in questions {
        max_score += question.points;
        let answer = answers.iter().find(|a| a.question_id == question.id);
        if let Some(answer) = answer {
            if is_correct(question, options, answer) {
                score += question.points;
            }
        }
    }
    GradedQuiz { score, max_score }
}

fn is_correct(question: &Question, options: &[QuestionOption], answer: &AnswerInput) -> bool {
    match QuestionKind::parse(&question.question_type) {
        Some(QuestionKind::SingleChoice) | Some(QuestionKind::TrueFalse) => {
            let [selected] = answer.selected_option_ids.as_slice() else {
                return false;
            };
            options.iter().any(|o| o.id == *selected && o.is_correct)
        }
        Some(QuestionKind::MultiChoice) => {
            let correct: BTreeSet<Uuid> =
                options.iter().filter(|o| o.is_correct).map(|o| o.id).collect();
            let selected: BTreeSet<Uuid> = answer
                .selected_option_ids
                .iter()
                .copied()
                .filter(|id| options.iter().any(|o| o.id == *id))
                .collect();
            !correct.is_empty() && selected == correct
        }
        Some(QuestionKind::ShortAnswer) => match (&question.answer_key, &answer.text) {
            (Some(key), Some(text)) => key.trim().eq_ignore_ascii_case(text.trim()),
            _ => false,
        },
        None => false,
    }
}

/// Rounded percentage; undefined when nothing was scoreable.
pub fn percentage(score: i32, max_score: i32) -> Option<u32> {
    if max_score <= 0 {
        return None;
    }
    Some(((score as f64 / max_score as f64) * 100.0).round() as u32)
}

/// Quiz-level override beats the course default.
pub fn effective_pass_mark(quiz_override: Option<i32>, course_default: i32) -> i32 {
    quiz_override.unwrap_or(course_default)
}

/// An undefined percentage never passes.
pub fn is_passing(score: i32, max_score: i32, pass_mark: i32) -> bool {
    percentage(score, max_score).is_some_and(|pct| pct as i32 >= pass_mark)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(kind: &str, points: i32, answer_key: Option<&str>) -> Question {
        Question {
            id: Uuid::new_v4(),
            quiz_id: Uuid::new_v4(),
            question_type: kind.into(),
            prompt_html: "<p>?</p>".into(),
            points,
            position: 0,
            answer_key: answer_key.map(Into::into),
        }
    }

    fn option(question_id: Uuid, is_correct: bool) -> QuestionOption {
        QuestionOption {
            id: Uuid::new_v4(),
            question_id,
            label: "opt".into(),
            is_correct,
            position: 0,
        }
    }

    fn answer(question_id: Uuid, selected: Vec<Uuid>) -> AnswerInput {
        AnswerInput { question_id, selected_option_ids: selected, text: None }
    }

    #[test]
    fn single_choice_requires_the_correct_option() {
        let q = question("single_choice", 5, None);
        let right = option(q.id, true);
        let wrong = option(q.id, false);
        let options = vec![right.clone(), wrong.clone()];

        let graded = grade(
            &[(q.clone(), options.clone())],
            &[answer(q.id, vec![right.id])],
        );
        assert_eq!(graded, GradedQuiz { score: 5, max_score: 5 });

        let graded = grade(&[(q.clone(), options.clone())], &[answer(q.id, vec![wrong.id])]);
        assert_eq!(graded.score, 0);

        // selecting both options is not a correct single-choice answer
        let graded = grade(&[(q.clone(), options)], &[answer(q.id, vec![right.id, wrong.id])]);
        assert_eq!(graded.score, 0);
    }

    #[test]
    fn multi_choice_is_all_or_nothing() {
        let q = question("multi_choice", 4, None);
        let a = option(q.id, true);
        let b = option(q.id, true);
        let c = option(q.id, false);
        let options = vec![a.clone(), b.clone(), c.clone()];

        let exact = grade(&[(q.clone(), options.clone())], &[answer(q.id, vec![a.id, b.id])]);
        assert_eq!(exact.score, 4);

        let partial = grade(&[(q.clone(), options.clone())], &[answer(q.id, vec![a.id])]);
        assert_eq!(partial.score, 0);

        let overshoot =
            grade(&[(q.clone(), options)], &[answer(q.id, vec![a.id, b.id, c.id])]);
        assert_eq!(overshoot.score, 0);
    }

    #[test]
    fn short_answer_matches_case_insensitively() {
        let q = question("short_answer", 2, Some("Ferris"));
        let yes = AnswerInput {
            question_id: q.id,
            selected_option_ids: vec![],
            text: Some("  ferris ".into()),
        };
        let graded = grade(&[(q.clone(), vec![])], &[yes]);
        assert_eq!(graded.score, 2);

        let no = AnswerInput {
            question_id: q.id,
            selected_option_ids: vec![],
            text: Some("crab".into()),
        };
        assert_eq!(grade(&[(q, vec![])], &[no]).score, 0);
    }

    #[test]
    fn unanswered_questions_count_toward_max() {
        let q1 = question("single_choice", 3, None);
        let q2 = question("short_answer", 7, Some("x"));
        let o = option(q1.id, true);
        let graded = grade(
            &[(q1.clone(), vec![o.clone()]), (q2, vec![])],
            &[answer(q1.id, vec![o.id])],
        );
        assert_eq!(graded, GradedQuiz { score: 3, max_score: 10 });
    }

    #[test]
    fn quiz_override_beats_course_pass_mark() {
        // course says 70, quiz insists on 80: a 75% attempt fails
        let mark = effective_pass_mark(Some(80), 70);
        assert_eq!(mark, 80);
        assert!(!is_passing(75, 100, mark));
        assert!(is_passing(75, 100, effective_pass_mark(None, 70)));
    }

    #[test]
    fn zero_max_score_is_undefined_and_never_passes() {
        assert_eq!(percentage(0, 0), None);
        assert!(!is_passing(0, 0, 0));
    }

    #[test]
    fn percentage_rounds_to_nearest() {
        assert_eq!(percentage(2, 3), Some(67));
        assert_eq!(percentage(1, 3), Some(33));
        assert_eq!(percentage(10, 10), Some(100));
    }
}
