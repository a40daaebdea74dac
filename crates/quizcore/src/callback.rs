//! Callback-data grammar carried by inline buttons.
//!
//! | data                         | action                 |
//! |------------------------------|------------------------|
//! | `quiz`                       | next question          |
//! | `answer_<A-D>`               | select an option       |
//! | `stats` / `menu` / `about`   | screens                |
//! | `end_session`                | clear session          |
//! | `report`                     | open report menu       |
//! | `report_<reason>_<id>`       | file a report          |
//! | `back_to_answer`             | redraw result screen   |
//! | `check_subscription`         | re-check channel       |

use crate::model::{OptionTag, ReportReason};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Quiz,
    Answer(OptionTag),
    Stats,
    Menu,
    About,
    EndSession,
    Report,
    ReportReason { reason: ReportReason, question_id: i64 },
    BackToAnswer,
    CheckSubscription,
}

/// Callback data that matches no known action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown callback data: {0}")]
pub struct UnknownCallback(pub String);

impl FromStr for CallbackAction {
    type Err = UnknownCallback;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let unknown = || UnknownCallback(data.to_string());

        match data {
            "quiz" => return Ok(CallbackAction::Quiz),
            "stats" => return Ok(CallbackAction::Stats),
            "menu" => return Ok(CallbackAction::Menu),
            "about" => return Ok(CallbackAction::About),
            "end_session" => return Ok(CallbackAction::EndSession),
            "report" => return Ok(CallbackAction::Report),
            "back_to_answer" => return Ok(CallbackAction::BackToAnswer),
            "check_subscription" => return Ok(CallbackAction::CheckSubscription),
            _ => {}
        }

        if let Some(tag) = data.strip_prefix("answer_") {
            return OptionTag::from_str(tag).map(CallbackAction::Answer).map_err(|_| unknown());
        }

        if let Some(rest) = data.strip_prefix("report_") {
            // Reasons may contain '_', the id never does.
            let (reason, id) = rest.rsplit_once('_').ok_or_else(unknown)?;
            let reason = ReportReason::from_str(reason).map_err(|_| unknown())?;
            let question_id = id.parse::<i64>().map_err(|_| unknown())?;
            return Ok(CallbackAction::ReportReason { reason, question_id });
        }

        Err(unknown())
    }
}

impl fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackAction::Quiz => f.write_str("quiz"),
            CallbackAction::Answer(tag) => write!(f, "answer_{tag}"),
            CallbackAction::Stats => f.write_str("stats"),
            CallbackAction::Menu => f.write_str("menu"),
            CallbackAction::About => f.write_str("about"),
            CallbackAction::EndSession => f.write_str("end_session"),
            CallbackAction::Report => f.write_str("report"),
            CallbackAction::ReportReason { reason, question_id } => write!(f, "report_{reason}_{question_id}"),
            CallbackAction::BackToAnswer => f.write_str("back_to_answer"),
            CallbackAction::CheckSubscription => f.write_str("check_subscription"),
        }
    }
}
