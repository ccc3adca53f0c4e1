//! Family sign-off: an engineer accepts, dismisses or sends back a family
//! before it goes further.

use fontwatch_process::{FieldDef, Interaction, ProcessEngine, ProcessError, TaskType};
use serde_json::Value;

pub const TASK_NAME: &str = "family-review";
pub const APPROVE_CALLBACK: &str = "callbackApprove";
pub const APPROVE_INTERACTION: &str = "uiApprove";
pub const REVIEWER_ROLE: &str = "engineer";

const ACTIONS: [(&str, &str); 3] = [("Accept", "accept"), ("Request changes", "edit"), ("Dismiss", "dismiss")];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FamilyReview {
    pub family: String,
    pub source: String,
    pub requester: Option<String>,
    pub action: Option<String>,
    /// Only stored for dismissals.
    pub reason: Option<String>,
}

pub type ReviewEngine = ProcessEngine<FamilyReview>;

fn required<'a>(payload: &'a Value, key: &str) -> Result<&'a str, ProcessError> {
    payload[key]
        .as_str()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ProcessError::task(format!("{key} is required")))
}

fn render_approve(review: &FamilyReview) -> Interaction {
    Interaction::new([REVIEWER_ROLE])
        .info(format!(
            "Review **{}** from source `{}`.",
            review.family, review.source
        ))
        .choice("action", "Decision", ACTIONS)
        .line("reason", "Why is it dismissed?")
        .when("action", "dismiss")
}

/// The review task type.
pub fn review_task() -> Result<TaskType<FamilyReview>, &'static str> {
    TaskType::builder(TASK_NAME)
        .field(FieldDef::new("family", |s: &FamilyReview| &s.family, |s| &mut s.family, String::new))
        .field(FieldDef::new("source", |s: &FamilyReview| &s.source, |s| &mut s.source, String::new))
        .field(FieldDef::new(
            "requester",
            |s: &FamilyReview| &s.requester,
            |s| &mut s.requester,
            || None,
        ))
        .field(FieldDef::new("action", |s: &FamilyReview| &s.action, |s| &mut s.action, || None))
        .field(
            FieldDef::new("reason", |s: &FamilyReview| &s.reason, |s| &mut s.reason, || None)
                .expected_when(|s| s.action.as_deref() == Some("dismiss"))
                .validate(|_, value| match value.as_str() {
                    Some(reason) if !reason.trim().is_empty() => Ok(()),
                    _ => Err("a dismissal needs a reason".to_string()),
                }),
        )
        .on_init(|ctx, payload| {
            let family = required(payload, "family")?.to_string();
            let source = required(payload, "sourceId")?.to_string();
            let state = ctx.state_mut();
            state.family = family;
            state.source = source;
            state.requester = payload["requester"].as_str().map(str::to_string);
            ctx.pending("waiting for sign-off");
            ctx.expect_answer(APPROVE_CALLBACK, Some(APPROVE_INTERACTION))?;
            Ok(())
        })
        .callback(APPROVE_CALLBACK, |ctx, answer| {
            let action = answer["action"].as_str().unwrap_or_default();
            match action {
                "accept" => {
                    ctx.state_mut().action = Some(action.to_string());
                    let family = ctx.state().family.clone();
                    ctx.ok(format!("**{family}** accepted"));
                },
                "dismiss" => {
                    let reason = required(answer, "reason")?.to_string();
                    ctx.state_mut().action = Some(action.to_string());
                    ctx.state_mut().reason = Some(reason.clone());
                    ctx.fail(format!("dismissed: {reason}"));
                },
                "edit" => {
                    ctx.state_mut().action = Some(action.to_string());
                    ctx.log_data("changes requested", answer.clone());
                    ctx.expect_answer(APPROVE_CALLBACK, Some(APPROVE_INTERACTION))?;
                },
                _ => return Err(ProcessError::task("Pick one of the actions from the list.")),
            }
            Ok(())
        })
        .interaction(APPROVE_INTERACTION, render_approve)
        .build()
}
