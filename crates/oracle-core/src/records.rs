//! normalized question/answer records and the raw shapes they are read from

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::codec::Field;

/// one submitted question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
    /// correlation key, also the packed question text
    pub request_id: Field,
    pub requester: Address,
    /// designated answerer
    pub divinity: Address,
}

/// resolution of a question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub request_id: Field,
    /// packed answer text
    pub answer: Field,
    pub requester: Address,
    pub divinity: Address,
    /// note owner, `None` for layouts that do not track it
    pub owner: Option<Address>,
}

/// which stream a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Question,
    Answer,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Question => write!(f, "question"),
            RecordKind::Answer => write!(f, "answer"),
        }
    }
}

/// raw record as handed over by a record source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawRecord {
    /// note preimage, fields by position
    Preimage(Vec<Field>),
    /// structured value returned by a read-only contract function
    Structured(serde_json::Value),
    /// note preimage already split into named fields
    Named(BTreeMap<String, Field>),
}

impl RawRecord {
    pub fn shape(&self) -> &'static str {
        match self {
            RawRecord::Preimage(_) => "preimage",
            RawRecord::Structured(_) => "structured",
            RawRecord::Named(_) => "named",
        }
    }
}
