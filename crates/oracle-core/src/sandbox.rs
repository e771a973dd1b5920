//! in-memory rollup network for tests and demos
//!
//! models what the oracle and token contracts do observably: fee escrow via an
//! approved unshield, requester-only cancel with refund, divinity-only answer
//! with payout, owner-scoped note visibility. records are served in any of the
//! three source shapes.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tracing::{debug, info};

use crate::address::{Address, TxHash};
use crate::client::{Deployer, OracleActions, RecordSource, TokenActions};
use crate::codec::{field_bytes, field_hex, Field};
use crate::config::DeploymentConfig;
use crate::projection::{
    SlotLayout, SourceDescriptor, FEE_SLOT, PAYMENT_TOKEN_SLOT, PENDING_SHIELDS_SLOT,
};
use crate::records::{AnswerRecord, QuestionRecord, RawRecord};
use crate::{OracleError, Result};

/// note made visible to an account after deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredNote {
    pub owner: Address,
    pub contract: Address,
    pub slot: u64,
    pub value: Field,
    pub tx_hash: TxHash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ApprovedAction {
    Unshield,
    Transfer,
}

/// authorization witness: `spender` may run `action` on `owner`'s tokens once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Approval {
    action: ApprovedAction,
    owner: Address,
    spender: Address,
    nonce: Field,
}

#[derive(Debug, Clone, Copy)]
struct PendingShield {
    amount: u128,
    secret_hash: Field,
}

#[derive(Debug)]
struct TokenState {
    address: Address,
    admin: Address,
    private: HashMap<Address, u128>,
    public: HashMap<Address, u128>,
    pending_shields: Vec<PendingShield>,
    approvals: HashMap<Approval, u128>,
}

#[derive(Debug)]
struct OracleState {
    address: Address,
    fee: u128,
    escrow: u128,
    questions: Vec<QuestionRecord>,
    answers: Vec<AnswerRecord>,
}

#[derive(Debug)]
struct Ledger {
    layout: SlotLayout,
    token: Option<TokenState>,
    oracle: Option<OracleState>,
    notes: Vec<RegisteredNote>,
    fetch_failure: Option<String>,
    tx_counter: u64,
}

impl OracleState {
    /// release one fee from escrow; rejected if the question never paid one
    fn release_fee(&mut self) -> Result<u128> {
        self.escrow = self
            .escrow
            .checked_sub(self.fee)
            .ok_or_else(|| OracleError::ActionRejected("escrow underflow".into()))?;
        Ok(self.fee)
    }
}

impl Ledger {
    fn next_tx(&mut self) -> TxHash {
        self.tx_counter += 1;
        TxHash(*blake3::hash(&self.tx_counter.to_le_bytes()).as_bytes())
    }

    fn oracle_mut(&mut self) -> Result<&mut OracleState> {
        self.oracle
            .as_mut()
            .ok_or_else(|| OracleError::ActionRejected("oracle not deployed".into()))
    }

    fn token_mut(&mut self) -> Result<&mut TokenState> {
        self.token
            .as_mut()
            .ok_or_else(|| OracleError::ActionRejected("token not deployed".into()))
    }

    fn token(&self) -> Result<&TokenState> {
        self.token
            .as_ref()
            .ok_or_else(|| OracleError::SourceFetch("token not deployed".into()))
    }
}

/// shared in-memory network
#[derive(Clone)]
pub struct Sandbox {
    ledger: Arc<Mutex<Ledger>>,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new(SlotLayout::with_owner())
    }
}

impl Sandbox {
    /// `layout` decides which slots hold question/answer notes
    pub fn new(layout: SlotLayout) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(Ledger {
                layout,
                token: None,
                oracle: None,
                notes: Vec::new(),
                fetch_failure: None,
                tx_counter: 0,
            })),
        }
    }

    /// handle acting as `caller`
    pub fn wallet(&self, caller: Address) -> SandboxWallet {
        SandboxWallet {
            caller,
            ledger: self.ledger.clone(),
        }
    }

    /// make every fetch fail with `message` until cleared
    pub fn fail_fetches(&self, message: Option<&str>) {
        self.ledger.lock().fetch_failure = message.map(str::to_string);
    }

    pub fn registered_notes(&self) -> Vec<RegisteredNote> {
        self.ledger.lock().notes.clone()
    }

    /// fees currently held by the oracle
    pub fn escrow(&self) -> u128 {
        self.ledger.lock().oracle.as_ref().map_or(0, |o| o.escrow)
    }

    /// store a question note directly, bypassing contract checks
    pub fn seed_question(&self, record: QuestionRecord) -> Result<()> {
        self.ledger.lock().oracle_mut()?.questions.push(record);
        Ok(())
    }

    /// store an answer note directly, bypassing contract checks
    pub fn seed_answer(&self, record: AnswerRecord) -> Result<()> {
        self.ledger.lock().oracle_mut()?.answers.push(record);
        Ok(())
    }
}

/// sandbox account; implements every collaborator trait for its caller
#[derive(Clone)]
pub struct SandboxWallet {
    caller: Address,
    ledger: Arc<Mutex<Ledger>>,
}

impl SandboxWallet {
    pub fn address(&self) -> Address {
        self.caller
    }

    fn approve(
        &self,
        action: ApprovedAction,
        owner: &Address,
        spender: &Address,
        amount: u128,
    ) -> Result<Field> {
        if *owner != self.caller {
            return Err(OracleError::ActionRejected(
                "cannot authorize on behalf of another account".into(),
            ));
        }
        let nonce = Field::from_big_endian(&rand::random::<[u8; 31]>());
        let mut ledger = self.ledger.lock();
        ledger.token_mut()?.approvals.insert(
            Approval {
                action,
                owner: *owner,
                spender: *spender,
                nonce,
            },
            amount,
        );
        debug!("{:?} approved for {} ({})", action, spender.short(), amount);
        Ok(nonce)
    }
}

fn question_visible(q: &QuestionRecord, viewer: &Address) -> bool {
    q.requester == *viewer || q.divinity == *viewer
}

fn answer_visible(a: &AnswerRecord, viewer: &Address) -> bool {
    a.requester == *viewer || a.divinity == *viewer || a.owner == Some(*viewer)
}

fn question_preimage(q: &QuestionRecord) -> RawRecord {
    RawRecord::Preimage(vec![q.request_id, q.requester.to_field(), q.divinity.to_field()])
}

fn answer_preimage(a: &AnswerRecord, layout: &SlotLayout) -> RawRecord {
    let mut items = vec![
        a.request_id,
        a.answer,
        a.requester.to_field(),
        a.divinity.to_field(),
    ];
    if layout.tracks_owner {
        items.push(a.owner.unwrap_or(a.requester).to_field());
    }
    RawRecord::Preimage(items)
}

fn question_named(q: &QuestionRecord) -> RawRecord {
    let mut fields = BTreeMap::new();
    fields.insert("request".to_string(), q.request_id);
    fields.insert("requester".to_string(), q.requester.to_field());
    fields.insert("divinity".to_string(), q.divinity.to_field());
    RawRecord::Named(fields)
}

fn answer_named(a: &AnswerRecord, layout: &SlotLayout) -> RawRecord {
    let mut fields = BTreeMap::new();
    fields.insert("request".to_string(), a.request_id);
    fields.insert("answer".to_string(), a.answer);
    fields.insert("requester".to_string(), a.requester.to_field());
    fields.insert("divinity".to_string(), a.divinity.to_field());
    if layout.tracks_owner {
        fields.insert("owner".to_string(), a.owner.unwrap_or(a.requester).to_field());
    }
    RawRecord::Named(fields)
}

fn question_structured(q: &QuestionRecord) -> RawRecord {
    RawRecord::Structured(json!({
        "request": field_hex(q.request_id),
        "requester_address": { "address": q.requester.to_string() },
        "divinity_address": { "address": q.divinity.to_string() },
    }))
}

fn answer_structured(a: &AnswerRecord) -> RawRecord {
    RawRecord::Structured(json!({
        "request": field_hex(a.request_id),
        "answer": field_hex(a.answer),
        "requester": { "address": a.requester.to_string() },
        "divinity": { "address": a.divinity.to_string() },
        "owner": { "address": a.owner.unwrap_or(a.requester).to_string() },
    }))
}

#[async_trait]
impl RecordSource for SandboxWallet {
    async fn fetch(&self, viewer: &Address, source: &SourceDescriptor) -> Result<Vec<RawRecord>> {
        tokio::task::yield_now().await;

        let ledger = self.ledger.lock();
        if let Some(message) = &ledger.fetch_failure {
            return Err(OracleError::SourceFetch(message.clone()));
        }
        let oracle = ledger
            .oracle
            .as_ref()
            .ok_or_else(|| OracleError::SourceFetch("oracle not deployed".into()))?;
        let layout = ledger.layout;

        let questions: Vec<&QuestionRecord> = oracle
            .questions
            .iter()
            .filter(|q| question_visible(q, viewer))
            .collect();
        let answers: Vec<&AnswerRecord> = oracle
            .answers
            .iter()
            .filter(|a| answer_visible(a, viewer))
            .collect();

        let records = match source {
            SourceDescriptor::StorageSlot(slot) if *slot == layout.question_slot => {
                questions.into_iter().map(question_preimage).collect()
            }
            SourceDescriptor::StorageSlot(slot) if *slot == layout.answer_slot => {
                answers.into_iter().map(|a| answer_preimage(a, &layout)).collect()
            }
            SourceDescriptor::NamedSlot(slot) if *slot == layout.question_slot => {
                questions.into_iter().map(question_named).collect()
            }
            SourceDescriptor::NamedSlot(slot) if *slot == layout.answer_slot => {
                answers.into_iter().map(|a| answer_named(a, &layout)).collect()
            }
            SourceDescriptor::StorageSlot(_) | SourceDescriptor::NamedSlot(_) => Vec::new(),
            SourceDescriptor::Function(handle) => match handle.name() {
                "get_questions" => questions.into_iter().map(question_structured).collect(),
                "get_answers" => answers.into_iter().map(answer_structured).collect(),
                other => {
                    return Err(OracleError::SourceFetch(format!(
                        "unknown function {}",
                        other
                    )))
                }
            },
        };

        debug!("served {} records from {} to {}", records.len(), source, viewer.short());
        Ok(records)
    }
}

#[async_trait]
impl OracleActions for SandboxWallet {
    async fn submit_question(&self, question: Field, divinity: Address, nonce: Field) -> Result<TxHash> {
        tokio::task::yield_now().await;

        let mut guard = self.ledger.lock();
        let ledger = &mut *guard;
        let oracle = ledger
            .oracle
            .as_mut()
            .ok_or_else(|| OracleError::ActionRejected("oracle not deployed".into()))?;
        let token = ledger
            .token
            .as_mut()
            .ok_or_else(|| OracleError::ActionRejected("token not deployed".into()))?;

        if question.is_zero() {
            return Err(OracleError::ActionRejected("empty question".into()));
        }
        if oracle.questions.iter().any(|q| q.request_id == question) {
            return Err(OracleError::ActionRejected("question already pending".into()));
        }

        let approval = Approval {
            action: ApprovedAction::Unshield,
            owner: self.caller,
            spender: oracle.address,
            nonce,
        };
        match token.approvals.get(&approval) {
            Some(amount) if *amount >= oracle.fee => {}
            Some(amount) => {
                return Err(OracleError::ActionRejected(format!(
                    "approved {} but fee is {}",
                    amount, oracle.fee
                )))
            }
            None => {
                return Err(OracleError::ActionRejected(
                    "missing authorization witness for fee unshield".into(),
                ))
            }
        }

        let balance = token.private.entry(self.caller).or_default();
        if *balance < oracle.fee {
            return Err(OracleError::InsufficientBalance {
                have: *balance,
                need: oracle.fee,
            });
        }
        *balance -= oracle.fee;
        token.approvals.remove(&approval);
        oracle.escrow += oracle.fee;
        oracle.questions.push(QuestionRecord {
            request_id: question,
            requester: self.caller,
            divinity,
        });

        info!("question submitted by {} to {}", self.caller.short(), divinity.short());
        Ok(ledger.next_tx())
    }

    async fn submit_answer(&self, request_id: Field, requester: Address, answer: Field) -> Result<TxHash> {
        tokio::task::yield_now().await;

        let mut guard = self.ledger.lock();
        let ledger = &mut *guard;
        let oracle = ledger
            .oracle
            .as_mut()
            .ok_or_else(|| OracleError::ActionRejected("oracle not deployed".into()))?;

        if oracle
            .answers
            .iter()
            .any(|a| a.request_id == request_id && a.requester == requester)
        {
            return Err(OracleError::ActionRejected("question already answered".into()));
        }
        let index = oracle
            .questions
            .iter()
            .position(|q| q.request_id == request_id && q.requester == requester)
            .ok_or_else(|| OracleError::ActionRejected("no pending question for request".into()))?;
        let question = oracle.questions[index];
        if question.divinity != self.caller {
            return Err(OracleError::ActionRejected(
                "only the divinity may answer".into(),
            ));
        }

        let fee = oracle.release_fee()?;
        oracle.questions.remove(index);
        oracle.answers.push(AnswerRecord {
            request_id,
            answer,
            requester,
            divinity: question.divinity,
            owner: Some(requester),
        });
        if let Some(token) = ledger.token.as_mut() {
            *token.private.entry(question.divinity).or_default() += fee;
        }

        info!("question answered by {}", self.caller.short());
        Ok(ledger.next_tx())
    }

    async fn cancel_question(&self, request_id: Field) -> Result<TxHash> {
        tokio::task::yield_now().await;

        let mut guard = self.ledger.lock();
        let ledger = &mut *guard;
        let oracle = ledger
            .oracle
            .as_mut()
            .ok_or_else(|| OracleError::ActionRejected("oracle not deployed".into()))?;

        let index = match oracle
            .questions
            .iter()
            .position(|q| q.request_id == request_id && q.requester == self.caller)
        {
            Some(index) => index,
            None if oracle.questions.iter().any(|q| q.request_id == request_id) => {
                return Err(OracleError::ActionRejected(
                    "only the requester may cancel".into(),
                ))
            }
            None => {
                return Err(OracleError::ActionRejected(
                    "no pending question for request".into(),
                ))
            }
        };

        let fee = oracle.release_fee()?;
        oracle.questions.remove(index);
        if let Some(token) = ledger.token.as_mut() {
            *token.private.entry(self.caller).or_default() += fee;
        }

        info!("question canceled by {}", self.caller.short());
        Ok(ledger.next_tx())
    }
}

#[async_trait]
impl TokenActions for SandboxWallet {
    async fn balance_of_private(&self, owner: &Address) -> Result<u128> {
        tokio::task::yield_now().await;
        let ledger = self.ledger.lock();
        Ok(ledger.token()?.private.get(owner).copied().unwrap_or(0))
    }

    async fn balance_of_public(&self, owner: &Address) -> Result<u128> {
        tokio::task::yield_now().await;
        let ledger = self.ledger.lock();
        Ok(ledger.token()?.public.get(owner).copied().unwrap_or(0))
    }

    async fn approve_unshield(&self, owner: &Address, spender: &Address, amount: u128) -> Result<Field> {
        tokio::task::yield_now().await;
        self.approve(ApprovedAction::Unshield, owner, spender, amount)
    }

    async fn approve_transfer(&self, owner: &Address, to: &Address, amount: u128) -> Result<Field> {
        tokio::task::yield_now().await;
        self.approve(ApprovedAction::Transfer, owner, to, amount)
    }

    async fn transfer(&self, from: &Address, to: &Address, amount: u128, nonce: Field) -> Result<TxHash> {
        tokio::task::yield_now().await;
        let mut ledger = self.ledger.lock();
        let token = ledger.token_mut()?;

        let approval = Approval {
            action: ApprovedAction::Transfer,
            owner: *from,
            spender: self.caller,
            nonce,
        };
        if *from != self.caller {
            match token.approvals.get(&approval) {
                Some(approved) if *approved == amount => {}
                _ => {
                    return Err(OracleError::ActionRejected(
                        "missing authorization witness for transfer".into(),
                    ))
                }
            }
        }

        let balance = token.private.entry(*from).or_default();
        if *balance < amount {
            return Err(OracleError::InsufficientBalance {
                have: *balance,
                need: amount,
            });
        }
        *balance -= amount;
        token.approvals.remove(&approval);
        *token.private.entry(*to).or_default() += amount;

        info!("transferred {} from {} to {}", amount, from.short(), to.short());
        Ok(ledger.next_tx())
    }

    async fn mint_private(&self, amount: u128, secret_hash: Field) -> Result<TxHash> {
        tokio::task::yield_now().await;
        let mut ledger = self.ledger.lock();
        let token = ledger.token_mut()?;
        if token.admin != self.caller {
            return Err(OracleError::ActionRejected("caller is not the token admin".into()));
        }
        token.pending_shields.push(PendingShield {
            amount,
            secret_hash,
        });
        let contract = token.address;
        let tx_hash = ledger.next_tx();
        ledger.notes.push(RegisteredNote {
            owner: self.caller,
            contract,
            slot: PENDING_SHIELDS_SLOT,
            value: secret_hash,
            tx_hash,
        });
        Ok(tx_hash)
    }

    async fn redeem_shield(&self, to: &Address, amount: u128, secret: Field) -> Result<TxHash> {
        tokio::task::yield_now().await;
        let secret_hash = self.secret_hash(secret);
        let mut ledger = self.ledger.lock();
        let token = ledger.token_mut()?;
        let index = token
            .pending_shields
            .iter()
            .position(|p| p.secret_hash == secret_hash && p.amount == amount)
            .ok_or_else(|| OracleError::ActionRejected("no pending shield matches secret".into()))?;
        token.pending_shields.remove(index);
        *token.private.entry(*to).or_default() += amount;
        Ok(ledger.next_tx())
    }

    fn secret_hash(&self, secret: Field) -> Field {
        let digest = blake3::hash(&field_bytes(secret));
        Field::from_big_endian(&digest.as_bytes()[..31])
    }
}

#[async_trait]
impl Deployer for SandboxWallet {
    async fn deploy_token(&self, admin: &Address) -> Result<Address> {
        tokio::task::yield_now().await;
        let mut ledger = self.ledger.lock();
        if ledger.token.is_some() {
            return Err(OracleError::ActionRejected("token already deployed".into()));
        }
        let address = Address::random();
        ledger.token = Some(TokenState {
            address,
            admin: *admin,
            private: HashMap::new(),
            public: HashMap::new(),
            pending_shields: Vec::new(),
            approvals: HashMap::new(),
        });
        info!("token deployed at {}", address.short());
        Ok(address)
    }

    async fn deploy_oracle(&self, token: &Address, fee: u64) -> Result<(Address, TxHash)> {
        tokio::task::yield_now().await;
        let mut ledger = self.ledger.lock();
        match ledger.token.as_ref() {
            Some(t) if t.address == *token => {}
            _ => return Err(OracleError::ActionRejected(format!("unknown token {}", token))),
        }
        if ledger.oracle.is_some() {
            return Err(OracleError::ActionRejected("oracle already deployed".into()));
        }
        let address = Address::random();
        ledger.oracle = Some(OracleState {
            address,
            fee: u128::from(fee),
            escrow: 0,
            questions: Vec::new(),
            answers: Vec::new(),
        });
        let tx_hash = ledger.next_tx();
        info!("oracle deployed at {} (fee {})", address.short(), fee);
        Ok((address, tx_hash))
    }

    async fn register_deployment_notes(&self, deployment: &DeploymentConfig) -> Result<()> {
        tokio::task::yield_now().await;
        let mut ledger = self.ledger.lock();
        match ledger.oracle.as_ref() {
            Some(o) if o.address == deployment.oracle => {}
            _ => {
                return Err(OracleError::ActionRejected(format!(
                    "unknown oracle {}",
                    deployment.oracle
                )))
            }
        }
        for (slot, value) in [
            (PAYMENT_TOKEN_SLOT, deployment.token.to_field()),
            (FEE_SLOT, Field::from(deployment.fee)),
        ] {
            ledger.notes.push(RegisteredNote {
                owner: self.caller,
                contract: deployment.oracle,
                slot,
                value,
                tx_hash: deployment.tx_hash,
            });
        }
        debug!("registered deployment notes for {}", self.caller.short());
        Ok(())
    }
}
