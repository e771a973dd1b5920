//! collaborator interfaces to the rollup client runtime
//!
//! everything stateful on the network side (note discovery, authorization
//! witnesses, transaction submission and finality) lives behind these traits.
//! [`crate::sandbox::Sandbox`] provides an in-memory implementation.

use std::sync::Arc;

use async_trait::async_trait;

use crate::address::{Address, TxHash};
use crate::codec::Field;
use crate::config::DeploymentConfig;
use crate::projection::SourceDescriptor;
use crate::records::RawRecord;
use crate::Result;

/// raw record retrieval on behalf of a viewing identity
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// fails with [`crate::OracleError::SourceFetch`] on transport/auth errors
    async fn fetch(&self, viewer: &Address, source: &SourceDescriptor) -> Result<Vec<RawRecord>>;
}

/// state-changing oracle calls, each resolving once finalized
#[async_trait]
pub trait OracleActions: Send + Sync {
    async fn submit_question(&self, question: Field, divinity: Address, nonce: Field) -> Result<TxHash>;

    async fn submit_answer(&self, request_id: Field, requester: Address, answer: Field) -> Result<TxHash>;

    async fn cancel_question(&self, request_id: Field) -> Result<TxHash>;
}

/// token contract calls
#[async_trait]
pub trait TokenActions: Send + Sync {
    async fn balance_of_private(&self, owner: &Address) -> Result<u128>;

    async fn balance_of_public(&self, owner: &Address) -> Result<u128>;

    /// authorize `spender` to unshield `amount` of `owner`'s private tokens,
    /// returns the nonce the spender must present
    async fn approve_unshield(&self, owner: &Address, spender: &Address, amount: u128) -> Result<Field>;

    /// authorize `to` to transfer `amount` of `owner`'s private tokens to itself
    async fn approve_transfer(&self, owner: &Address, to: &Address, amount: u128) -> Result<Field>;

    /// private transfer; a caller other than `from` must present an approved nonce
    async fn transfer(&self, from: &Address, to: &Address, amount: u128, nonce: Field) -> Result<TxHash>;

    async fn mint_private(&self, amount: u128, secret_hash: Field) -> Result<TxHash>;

    async fn redeem_shield(&self, to: &Address, amount: u128, secret: Field) -> Result<TxHash>;

    /// hash binding a pending shield to its redeem secret
    fn secret_hash(&self, secret: Field) -> Field;
}

/// contract deployment and note registration
#[async_trait]
pub trait Deployer: Send + Sync {
    async fn deploy_token(&self, admin: &Address) -> Result<Address>;

    async fn deploy_oracle(&self, token: &Address, fee: u64) -> Result<(Address, TxHash)>;

    /// make the deployment's payment-token and fee notes visible to the caller
    async fn register_deployment_notes(&self, deployment: &DeploymentConfig) -> Result<()>;
}

/// shared handles to the collaborators a session needs
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn RecordSource>,
    pub oracle: Arc<dyn OracleActions>,
    pub token: Arc<dyn TokenActions>,
}

impl Collaborators {
    /// use one wallet for every role
    pub fn from_wallet<W>(wallet: W) -> Self
    where
        W: RecordSource + OracleActions + TokenActions + 'static,
    {
        let wallet = Arc::new(wallet);
        Self {
            source: wallet.clone(),
            oracle: wallet.clone(),
            token: wallet,
        }
    }
}
