//! lifecycle view assembly: merge question and answer streams into display rows

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::codec::{display_text, Field};
use crate::records::{AnswerRecord, QuestionRecord};

/// what to do with a request id present in both streams
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollapsePolicy {
    /// one open row and one resolved row
    #[default]
    KeepBoth,
    /// drop the open row, keep the resolved one
    CollapseResolved,
}

/// per-row status relative to the viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RowStatus {
    /// viewer asked it and may withdraw it
    Cancelable,
    /// someone else asked it; viewer may answer
    Answerable,
    /// answered, no action
    Resolved,
}

impl RowStatus {
    /// button label, if the row has an action
    pub fn action_label(&self) -> Option<&'static str> {
        match self {
            RowStatus::Cancelable => Some("Cancel"),
            RowStatus::Answerable => Some("Answer"),
            RowStatus::Resolved => None,
        }
    }
}

/// action offered on a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RowAction {
    Cancel,
    Answer,
    None,
}

impl From<RowStatus> for RowAction {
    fn from(status: RowStatus) -> Self {
        match status {
            RowStatus::Cancelable => RowAction::Cancel,
            RowStatus::Answerable => RowAction::Answer,
            RowStatus::Resolved => RowAction::None,
        }
    }
}

/// question or answer cast to a common row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedRow {
    pub request_id: Field,
    pub requester: Address,
    pub divinity: Address,
    pub answer: Option<Field>,
}

impl From<&QuestionRecord> for MergedRow {
    fn from(q: &QuestionRecord) -> Self {
        Self {
            request_id: q.request_id,
            requester: q.requester,
            divinity: q.divinity,
            answer: None,
        }
    }
}

impl From<&AnswerRecord> for MergedRow {
    fn from(a: &AnswerRecord) -> Self {
        Self {
            request_id: a.request_id,
            requester: a.requester,
            divinity: a.divinity,
            answer: Some(a.answer),
        }
    }
}

impl MergedRow {
    pub fn status_for(&self, viewer: &Address) -> RowStatus {
        match self.answer {
            Some(_) => RowStatus::Resolved,
            None if self.requester == *viewer => RowStatus::Cancelable,
            None => RowStatus::Answerable,
        }
    }
}

/// display row handed to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewRow {
    pub request_id: Field,
    pub requester: Address,
    pub divinity: Address,
    pub answer: Option<Field>,
    pub status: RowStatus,
    pub question_text: String,
    pub answer_text: String,
}

impl ViewRow {
    pub fn new(row: MergedRow, viewer: &Address) -> Self {
        Self {
            request_id: row.request_id,
            requester: row.requester,
            divinity: row.divinity,
            answer: row.answer,
            status: row.status_for(viewer),
            question_text: display_text(Some(row.request_id)),
            answer_text: display_text(row.answer),
        }
    }

    pub fn requester_short(&self) -> String {
        self.requester.short()
    }

    pub fn divinity_short(&self) -> String {
        self.divinity.short()
    }

    pub fn action(&self) -> RowAction {
        RowAction::from(self.status)
    }

    pub fn can_cancel(&self) -> bool {
        self.status == RowStatus::Cancelable
    }

    pub fn can_answer(&self) -> bool {
        self.status == RowStatus::Answerable
    }
}

/// questions first, then answers, each in source order
pub fn merge(
    questions: &[QuestionRecord],
    answers: &[AnswerRecord],
    policy: CollapsePolicy,
) -> Vec<MergedRow> {
    let answered: HashSet<Field> = match policy {
        CollapsePolicy::KeepBoth => HashSet::new(),
        CollapsePolicy::CollapseResolved => answers.iter().map(|a| a.request_id).collect(),
    };

    questions
        .iter()
        .filter(|q| !answered.contains(&q.request_id))
        .map(MergedRow::from)
        .chain(answers.iter().map(MergedRow::from))
        .collect()
}

/// merge and compute status/display text for `viewer`
pub fn assemble(
    questions: &[QuestionRecord],
    answers: &[AnswerRecord],
    viewer: &Address,
    policy: CollapsePolicy,
) -> Vec<ViewRow> {
    merge(questions, answers, policy)
        .into_iter()
        .map(|row| ViewRow::new(row, viewer))
        .collect()
}
