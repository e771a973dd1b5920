//! oracle session: the fetch -> project -> assemble pipeline and guarded row actions
//!
//! a refresh takes a ticket when issued and only commits if no later-issued
//! refresh has committed first. a failed refresh leaves the committed rows
//! untouched. row actions hold a per-request guard for their whole duration.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::address::{Address, TxHash};
use crate::client::Collaborators;
use crate::codec::{encode_text, field_hex, Field};
use crate::config::{DeploymentConfig, DeploymentState, OracleSettings, MINT_AMOUNT};
use crate::poller::PollHandle;
use crate::projection::Projector;
use crate::records::RecordKind;
use crate::token::{self, Balances};
use crate::view::{assemble, CollapsePolicy, ViewRow};
use crate::{OracleError, Result};

/// outcome of a refresh that fetched and projected successfully
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// rows replaced
    Applied,
    /// a later-issued refresh already committed, result dropped
    Superseded,
}

#[derive(Debug, Default)]
struct Snapshot {
    ticket: u64,
    rows: Arc<Vec<ViewRow>>,
}

/// removes its request id from the pending set on drop
struct ActionGuard<'a> {
    pending: &'a Mutex<HashSet<Field>>,
    request_id: Field,
}

impl<'a> ActionGuard<'a> {
    fn acquire(pending: &'a Mutex<HashSet<Field>>, request_id: Field) -> Result<Self> {
        if !pending.lock().insert(request_id) {
            return Err(OracleError::ActionInProgress(field_hex(request_id)));
        }
        Ok(Self {
            pending,
            request_id,
        })
    }
}

impl Drop for ActionGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.request_id);
    }
}

/// background pollers of a session, stopped together
pub struct Pollers {
    pub balances: PollHandle,
    pub balance_updates: watch::Receiver<Balances>,
    pub refresh: Option<PollHandle>,
}

impl Pollers {
    pub async fn stop(self) {
        self.balances.stop().await;
        if let Some(refresh) = self.refresh {
            refresh.stop().await;
        }
    }
}

pub struct OracleSession {
    viewer: Address,
    deployment: DeploymentConfig,
    collaborators: Collaborators,
    projector: Projector,
    policy: CollapsePolicy,
    issued: AtomicU64,
    snapshot: RwLock<Snapshot>,
    pending: Mutex<HashSet<Field>>,
}

impl OracleSession {
    /// fails with [`OracleError::NotDeployed`] until the oracle is deployed
    pub fn new(
        viewer: Address,
        state: &DeploymentState,
        collaborators: Collaborators,
        settings: &OracleSettings,
    ) -> Result<Self> {
        let deployment = *state.require()?;
        debug!(
            "session for {} on oracle {} via {}",
            viewer.short(),
            deployment.oracle.short(),
            settings.strategy.name()
        );
        Ok(Self {
            viewer,
            deployment,
            collaborators,
            projector: Projector::new(settings.strategy.clone()),
            policy: settings.collapse,
            issued: AtomicU64::new(0),
            snapshot: RwLock::new(Snapshot::default()),
            pending: Mutex::new(HashSet::new()),
        })
    }

    pub fn viewer(&self) -> &Address {
        &self.viewer
    }

    pub fn deployment(&self) -> &DeploymentConfig {
        &self.deployment
    }

    /// last committed rows
    pub fn rows(&self) -> Arc<Vec<ViewRow>> {
        self.snapshot.read().rows.clone()
    }

    /// first committed row for `request_id`
    pub fn row(&self, request_id: Field) -> Option<ViewRow> {
        self.snapshot
            .read()
            .rows
            .iter()
            .find(|r| r.request_id == request_id)
            .cloned()
    }

    /// whether an action is in flight for `request_id`
    pub fn is_pending(&self, request_id: Field) -> bool {
        self.pending.lock().contains(&request_id)
    }

    /// fetch both streams, project and assemble, commit unless superseded
    pub async fn refresh(&self) -> Result<Refresh> {
        let ticket = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let source = &self.collaborators.source;
        let question_source = self.projector.descriptor(RecordKind::Question);
        let answer_source = self.projector.descriptor(RecordKind::Answer);

        let (raw_questions, raw_answers) = tokio::try_join!(
            source.fetch(&self.viewer, &question_source),
            source.fetch(&self.viewer, &answer_source),
        )?;
        let questions = self.projector.project_questions(&raw_questions)?;
        let answers = self.projector.project_answers(&raw_answers)?;
        let rows = assemble(&questions, &answers, &self.viewer, self.policy);

        let mut snapshot = self.snapshot.write();
        if snapshot.ticket > ticket {
            debug!(ticket, committed = snapshot.ticket, "refresh superseded");
            return Ok(Refresh::Superseded);
        }
        debug!(ticket, rows = rows.len(), "refresh applied");
        *snapshot = Snapshot {
            ticket,
            rows: Arc::new(rows),
        };
        Ok(Refresh::Applied)
    }

    async fn refresh_after_action(&self) {
        if let Err(e) = self.refresh().await {
            warn!("refresh after action failed: {}", e);
        }
    }

    /// withdraw an open question; only its requester may
    pub async fn cancel(&self, request_id: Field) -> Result<TxHash> {
        let _guard = ActionGuard::acquire(&self.pending, request_id)?;
        let tx = self
            .collaborators
            .oracle
            .cancel_question(request_id)
            .await
            .map_err(OracleError::into_rejection)?;
        info!("canceled {} ({})", field_hex(request_id), tx.short());
        self.refresh_after_action().await;
        Ok(tx)
    }

    /// answer an open question addressed to the viewer
    pub async fn answer(&self, request_id: Field, requester: Address, text: &str) -> Result<TxHash> {
        let answer = encode_text(text)?;
        let _guard = ActionGuard::acquire(&self.pending, request_id)?;
        let tx = self
            .collaborators
            .oracle
            .submit_answer(request_id, requester, answer)
            .await
            .map_err(OracleError::into_rejection)?;
        info!("answered {} ({})", field_hex(request_id), tx.short());
        self.refresh_after_action().await;
        Ok(tx)
    }

    /// ask `divinity` a question, paying the oracle fee
    ///
    /// the fee is authorized as an unshield from the viewer to the oracle;
    /// the returned nonce binds the authorization to the submission.
    pub async fn ask(&self, question: &str, divinity: Address) -> Result<TxHash> {
        let request_id = encode_text(question)?;
        let _guard = ActionGuard::acquire(&self.pending, request_id)?;
        let nonce = self
            .collaborators
            .token
            .approve_unshield(&self.viewer, &self.deployment.oracle, u128::from(self.deployment.fee))
            .await
            .map_err(OracleError::into_rejection)?;
        let tx = self
            .collaborators
            .oracle
            .submit_question(request_id, divinity, nonce)
            .await
            .map_err(OracleError::into_rejection)?;
        info!("asked {} ({})", divinity.short(), tx.short());
        self.refresh_after_action().await;
        Ok(tx)
    }

    pub async fn balances(&self) -> Result<Balances> {
        token::fetch_balances(self.collaborators.token.as_ref(), &self.viewer).await
    }

    /// mint [`MINT_AMOUNT`] private tokens to the viewer
    pub async fn mint(&self) -> Result<TxHash> {
        self.mint_to(self.viewer, MINT_AMOUNT).await
    }

    /// mint `amount` private tokens to `to`; only the token admin may
    pub async fn mint_to(&self, to: Address, amount: u128) -> Result<TxHash> {
        token::mint(self.collaborators.token.as_ref(), &to, amount)
            .await
            .map_err(OracleError::into_rejection)
    }

    /// authorize `to` to pull `amount` of the viewer's private tokens,
    /// returns the nonce `to` must present with the transfer
    pub async fn approve_transfer(&self, to: Address, amount: u128) -> Result<Field> {
        let nonce = self
            .collaborators
            .token
            .approve_transfer(&self.viewer, &to, amount)
            .await
            .map_err(OracleError::into_rejection)?;
        info!("approved transfer of {} to {} with nonce {}", amount, to.short(), field_hex(nonce));
        Ok(nonce)
    }

    pub fn watch_balances(&self, period: Duration) -> (PollHandle, watch::Receiver<Balances>) {
        token::watch_balances(self.collaborators.token.clone(), self.viewer, period)
    }

    /// start the pollers `settings` ask for: balances always, records when
    /// `refresh_poll_ms` is set
    pub fn start_pollers(self: &Arc<Self>, settings: &OracleSettings) -> Pollers {
        let (balances, balance_updates) = self.watch_balances(settings.balance_poll_interval());
        let refresh = settings
            .refresh_poll_interval()
            .map(|period| self.spawn_refresh_poller(period));
        Pollers {
            balances,
            balance_updates,
            refresh,
        }
    }

    /// refresh every `period` until the handle is stopped or dropped
    pub fn spawn_refresh_poller(self: &Arc<Self>, period: Duration) -> PollHandle {
        let session = Arc::clone(self);
        PollHandle::spawn("refresh", period, move || {
            let session = session.clone();
            async move {
                if let Err(e) = session.refresh().await {
                    warn!("periodic refresh failed: {}", e);
                }
            }
        })
    }
}
