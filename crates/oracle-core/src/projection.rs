//! record projection: raw source records -> normalized question/answer records
//!
//! three source shapes exist, one per storage scheme the oracle contract has
//! gone through:
//!
//! - storage scan: note preimages read from a storage slot, fields by position
//! - contract query: structured values returned by `get_questions`/`get_answers`
//! - legacy hybrid: note preimages split into named fields
//!
//! the strategy is chosen once (see [`crate::config::OracleSettings`]) and the
//! output is identical for all of them. any malformed record rejects its whole
//! batch; nothing is defaulted.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::address::Address;
use crate::codec::{parse_field, Field};
use crate::records::{AnswerRecord, QuestionRecord, RawRecord, RecordKind};
use crate::{OracleError, Result};

/// storage slot of the payment token note
pub const PAYMENT_TOKEN_SLOT: u64 = 1;
/// storage slot of the fee note
pub const FEE_SLOT: u64 = 2;
/// storage slot of the token contract's pending shields
pub const PENDING_SHIELDS_SLOT: u64 = 5;

/// positional layout of question/answer notes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotLayout {
    pub question_slot: u64,
    pub answer_slot: u64,
    /// answer notes carry a trailing owner field
    pub tracks_owner: bool,
}

impl SlotLayout {
    /// questions in slot 1, answers in slot 2, no owner
    pub const fn minimal() -> Self {
        Self {
            question_slot: 1,
            answer_slot: 2,
            tracks_owner: false,
        }
    }

    /// questions in slot 3, answers in slot 4, answers carry owner
    pub const fn with_owner() -> Self {
        Self {
            question_slot: 3,
            answer_slot: 4,
            tracks_owner: true,
        }
    }

    /// `[request, requester, divinity]`
    pub const fn question_width(&self) -> usize {
        3
    }

    /// `[request, answer, requester, divinity(, owner)]`
    pub const fn answer_width(&self) -> usize {
        if self.tracks_owner {
            5
        } else {
            4
        }
    }

    pub fn slot(&self, kind: RecordKind) -> u64 {
        match kind {
            RecordKind::Question => self.question_slot,
            RecordKind::Answer => self.answer_slot,
        }
    }
}

/// read-only contract function used as a record source
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionHandle(pub String);

impl FunctionHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FunctionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}()", self.0)
    }
}

/// what to ask a record source for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceDescriptor {
    /// note preimages stored in a slot
    StorageSlot(u64),
    /// note preimages stored in a slot, split into named fields
    NamedSlot(u64),
    /// result of a read-only function call
    Function(FunctionHandle),
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::StorageSlot(slot) => write!(f, "slot {}", slot),
            SourceDescriptor::NamedSlot(slot) => write!(f, "named slot {}", slot),
            SourceDescriptor::Function(handle) => write!(f, "{}", handle),
        }
    }
}

/// how raw records are sourced and read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceStrategy {
    StorageScan {
        layout: SlotLayout,
    },
    ContractQuery {
        questions: FunctionHandle,
        answers: FunctionHandle,
    },
    LegacyHybrid {
        layout: SlotLayout,
    },
}

impl Default for SourceStrategy {
    fn default() -> Self {
        Self::contract_query()
    }
}

impl SourceStrategy {
    /// `get_questions` / `get_answers`
    pub fn contract_query() -> Self {
        Self::ContractQuery {
            questions: FunctionHandle::new("get_questions"),
            answers: FunctionHandle::new("get_answers"),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SourceStrategy::StorageScan { .. } => "storage-scan",
            SourceStrategy::ContractQuery { .. } => "contract-query",
            SourceStrategy::LegacyHybrid { .. } => "legacy-hybrid",
        }
    }

    pub fn descriptor(&self, kind: RecordKind) -> SourceDescriptor {
        match self {
            SourceStrategy::StorageScan { layout } => SourceDescriptor::StorageSlot(layout.slot(kind)),
            SourceStrategy::LegacyHybrid { layout } => SourceDescriptor::NamedSlot(layout.slot(kind)),
            SourceStrategy::ContractQuery { questions, answers } => match kind {
                RecordKind::Question => SourceDescriptor::Function(questions.clone()),
                RecordKind::Answer => SourceDescriptor::Function(answers.clone()),
            },
        }
    }
}

type FieldResult<T> = std::result::Result<T, String>;

/// turns raw batches into normalized records
#[derive(Debug, Clone, Default)]
pub struct Projector {
    strategy: SourceStrategy,
}

impl Projector {
    pub fn new(strategy: SourceStrategy) -> Self {
        Self { strategy }
    }

    pub fn descriptor(&self, kind: RecordKind) -> SourceDescriptor {
        self.strategy.descriptor(kind)
    }

    pub fn project_questions(&self, raw: &[RawRecord]) -> Result<Vec<QuestionRecord>> {
        raw.iter()
            .enumerate()
            .map(|(index, record)| {
                self.question(record)
                    .map_err(|reason| malformed(RecordKind::Question, index, reason))
            })
            .collect()
    }

    pub fn project_answers(&self, raw: &[RawRecord]) -> Result<Vec<AnswerRecord>> {
        raw.iter()
            .enumerate()
            .map(|(index, record)| {
                self.answer(record)
                    .map_err(|reason| malformed(RecordKind::Answer, index, reason))
            })
            .collect()
    }

    fn question(&self, record: &RawRecord) -> FieldResult<QuestionRecord> {
        match (&self.strategy, record) {
            (SourceStrategy::StorageScan { layout }, RawRecord::Preimage(items)) => {
                expect_width(items, layout.question_width())?;
                Ok(QuestionRecord {
                    request_id: items[0],
                    requester: Address::from_field(items[1]),
                    divinity: Address::from_field(items[2]),
                })
            }
            (SourceStrategy::ContractQuery { .. }, RawRecord::Structured(value)) => {
                Ok(QuestionRecord {
                    request_id: field_property(value, "request")?,
                    requester: address_property(value, "requester_address")?,
                    divinity: address_property(value, "divinity_address")?,
                })
            }
            (SourceStrategy::LegacyHybrid { .. }, RawRecord::Named(fields)) => Ok(QuestionRecord {
                request_id: named(fields, "request")?,
                requester: Address::from_field(named(fields, "requester")?),
                divinity: Address::from_field(named(fields, "divinity")?),
            }),
            (strategy, other) => Err(shape_mismatch(strategy, other)),
        }
    }

    fn answer(&self, record: &RawRecord) -> FieldResult<AnswerRecord> {
        match (&self.strategy, record) {
            (SourceStrategy::StorageScan { layout }, RawRecord::Preimage(items)) => {
                expect_width(items, layout.answer_width())?;
                Ok(AnswerRecord {
                    request_id: items[0],
                    answer: items[1],
                    requester: Address::from_field(items[2]),
                    divinity: Address::from_field(items[3]),
                    owner: layout
                        .tracks_owner
                        .then(|| Address::from_field(items[4])),
                })
            }
            (SourceStrategy::ContractQuery { .. }, RawRecord::Structured(value)) => {
                Ok(AnswerRecord {
                    request_id: field_property(value, "request")?,
                    answer: field_property(value, "answer")?,
                    requester: address_property(value, "requester")?,
                    divinity: address_property(value, "divinity")?,
                    owner: Some(address_property(value, "owner")?),
                })
            }
            (SourceStrategy::LegacyHybrid { layout }, RawRecord::Named(fields)) => {
                let owner = if layout.tracks_owner {
                    Some(Address::from_field(named(fields, "owner")?))
                } else {
                    None
                };
                Ok(AnswerRecord {
                    request_id: named(fields, "request")?,
                    answer: named(fields, "answer")?,
                    requester: Address::from_field(named(fields, "requester")?),
                    divinity: Address::from_field(named(fields, "divinity")?),
                    owner,
                })
            }
            (strategy, other) => Err(shape_mismatch(strategy, other)),
        }
    }
}

fn malformed(kind: RecordKind, index: usize, reason: String) -> OracleError {
    OracleError::MalformedRecord {
        kind,
        index,
        reason,
    }
}

fn shape_mismatch(strategy: &SourceStrategy, record: &RawRecord) -> String {
    format!(
        "{} record cannot be read with the {} strategy",
        record.shape(),
        strategy.name()
    )
}

fn expect_width(items: &[Field], width: usize) -> FieldResult<()> {
    if items.len() != width {
        return Err(format!(
            "expected {} preimage fields, got {}",
            width,
            items.len()
        ));
    }
    Ok(())
}

fn named(fields: &BTreeMap<String, Field>, key: &str) -> FieldResult<Field> {
    fields
        .get(key)
        .copied()
        .ok_or_else(|| format!("missing field `{}`", key))
}

fn property<'a>(value: &'a Value, key: &str) -> FieldResult<&'a Value> {
    match value {
        Value::Object(map) => map
            .get(key)
            .filter(|v| !v.is_null())
            .ok_or_else(|| format!("missing field `{}`", key)),
        other => Err(format!("expected an object, got {}", json_kind(other))),
    }
}

fn field_property(value: &Value, key: &str) -> FieldResult<Field> {
    numeric(property(value, key)?).map_err(|e| format!("field `{}`: {}", key, e))
}

fn address_property(value: &Value, key: &str) -> FieldResult<Address> {
    address(property(value, key)?).map_err(|e| format!("field `{}`: invalid address: {}", key, e))
}

/// integer, `0x` hex string or decimal string
fn numeric(value: &Value) -> FieldResult<Field> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(Field::from)
            .ok_or_else(|| format!("{} is not an unsigned integer", n)),
        Value::String(s) => parse_field(s).map_err(|e| e.to_string()),
        other => Err(format!("expected a number, got {}", json_kind(other))),
    }
}

/// `{ "address": .. }` wrapper, raw integer, or formatted address string
fn address(value: &Value) -> FieldResult<Address> {
    match value {
        Value::Object(map) => match map.get("address") {
            Some(inner) => address(inner),
            None => Err("object without `address` property".to_string()),
        },
        Value::String(s) if s.starts_with("0x") || s.starts_with("0X") => {
            Address::parse(s).map_err(|e| e.to_string())
        }
        other => numeric(other).map(Address::from_field),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn addr(n: u64) -> Address {
        Address::from_field(Field::from(n))
    }

    fn scan() -> Projector {
        Projector::new(SourceStrategy::StorageScan {
            layout: SlotLayout::with_owner(),
        })
    }

    fn legacy() -> Projector {
        Projector::new(SourceStrategy::LegacyHybrid {
            layout: SlotLayout::with_owner(),
        })
    }

    fn question_preimage(id: u64, requester: u64, divinity: u64) -> RawRecord {
        RawRecord::Preimage(vec![
            Field::from(id),
            Field::from(requester),
            Field::from(divinity),
        ])
    }

    fn named_fields(pairs: &[(&str, u64)]) -> RawRecord {
        RawRecord::Named(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), Field::from(*v)))
                .collect(),
        )
    }

    #[test]
    fn test_strategies_yield_identical_questions() {
        let from_scan = scan()
            .project_questions(&[question_preimage(5, 0xa, 0xb), question_preimage(6, 0xb, 0xa)])
            .unwrap();

        let from_query = Projector::default()
            .project_questions(&[
                RawRecord::Structured(json!({
                    "request": 5,
                    "requester_address": { "address": "0xa" },
                    "divinity_address": { "address": 11 },
                })),
                RawRecord::Structured(json!({
                    "request": "0x6",
                    "requester_address": addr(0xb).to_string(),
                    "divinity_address": "10",
                })),
            ])
            .unwrap();

        let from_legacy = legacy()
            .project_questions(&[
                named_fields(&[("request", 5), ("requester", 0xa), ("divinity", 0xb)]),
                named_fields(&[("request", 6), ("requester", 0xb), ("divinity", 0xa)]),
            ])
            .unwrap();

        assert_eq!(from_scan, from_query);
        assert_eq!(from_scan, from_legacy);
        assert_eq!(from_scan[0].requester, addr(0xa));
        assert_eq!(from_scan[1].divinity, addr(0xa));
    }

    #[test]
    fn test_answer_owner_tracking() {
        let minimal = Projector::new(SourceStrategy::StorageScan {
            layout: SlotLayout::minimal(),
        });
        let answers = minimal
            .project_answers(&[RawRecord::Preimage(vec![
                Field::from(5u64),
                Field::from(42u64),
                Field::from(0xau64),
                Field::from(0xbu64),
            ])])
            .unwrap();
        assert_eq!(answers[0].answer, Field::from(42u64));
        assert_eq!(answers[0].owner, None);

        let answers = scan()
            .project_answers(&[RawRecord::Preimage(vec![
                Field::from(5u64),
                Field::from(42u64),
                Field::from(0xau64),
                Field::from(0xbu64),
                Field::from(0xau64),
            ])])
            .unwrap();
        assert_eq!(answers[0].owner, Some(addr(0xa)));
    }

    #[test]
    fn test_query_answers() {
        let answers = Projector::default()
            .project_answers(&[RawRecord::Structured(json!({
                "request": 5,
                "answer": 42,
                "requester": { "address": 10 },
                "divinity": { "address": 11 },
                "owner": { "address": 10 },
            }))])
            .unwrap();
        assert_eq!(
            answers,
            vec![AnswerRecord {
                request_id: Field::from(5u64),
                answer: Field::from(42u64),
                requester: addr(10),
                divinity: addr(11),
                owner: Some(addr(10)),
            }]
        );
    }

    #[test]
    fn test_missing_divinity_rejects_whole_batch() {
        let err = Projector::default()
            .project_questions(&[
                RawRecord::Structured(json!({
                    "request": 5,
                    "requester_address": { "address": 10 },
                    "divinity_address": { "address": 11 },
                })),
                RawRecord::Structured(json!({
                    "request": 6,
                    "requester_address": { "address": 10 },
                })),
            ])
            .unwrap_err();
        match err {
            OracleError::MalformedRecord { kind, index, reason } => {
                assert_eq!(kind, RecordKind::Question);
                assert_eq!(index, 1);
                assert!(reason.contains("divinity_address"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = legacy()
            .project_questions(&[named_fields(&[("request", 5), ("requester", 0xa)])])
            .unwrap_err();
        assert!(matches!(err, OracleError::MalformedRecord { index: 0, .. }));
    }

    #[test]
    fn test_null_property_counts_as_missing() {
        let err = Projector::default()
            .project_questions(&[RawRecord::Structured(json!({
                "request": 5,
                "requester_address": null,
                "divinity_address": { "address": 11 },
            }))])
            .unwrap_err();
        assert!(err.to_string().contains("missing field `requester_address`"));
    }

    #[test]
    fn test_short_preimage_rejected() {
        let err = scan()
            .project_questions(&[RawRecord::Preimage(vec![Field::from(5u64), Field::from(1u64)])])
            .unwrap_err();
        assert!(err.to_string().contains("expected 3 preimage fields, got 2"));
    }

    #[test]
    fn test_invalid_address_encoding_rejected() {
        let err = Projector::default()
            .project_questions(&[RawRecord::Structured(json!({
                "request": 5,
                "requester_address": { "address": "0xnothex" },
                "divinity_address": { "address": 11 },
            }))])
            .unwrap_err();
        assert!(err.to_string().contains("invalid address"));

        let err = Projector::default()
            .project_questions(&[RawRecord::Structured(json!({
                "request": 5,
                "requester_address": { "addr": 10 },
                "divinity_address": { "address": 11 },
            }))])
            .unwrap_err();
        assert!(matches!(err, OracleError::MalformedRecord { .. }));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let err = scan()
            .project_questions(&[named_fields(&[("request", 5)])])
            .unwrap_err();
        assert!(err.to_string().contains("storage-scan"));
    }

    #[test]
    fn test_descriptors() {
        let layout = SlotLayout::minimal();
        let strategy = SourceStrategy::StorageScan { layout };
        assert_eq!(
            strategy.descriptor(RecordKind::Question),
            SourceDescriptor::StorageSlot(1)
        );
        assert_eq!(
            SourceStrategy::LegacyHybrid { layout }.descriptor(RecordKind::Answer),
            SourceDescriptor::NamedSlot(2)
        );
        assert_eq!(
            SourceStrategy::contract_query().descriptor(RecordKind::Answer),
            SourceDescriptor::Function(FunctionHandle::new("get_answers"))
        );
    }

    #[test]
    fn test_empty_batch() {
        assert!(scan().project_answers(&[]).unwrap().is_empty());
    }
}
