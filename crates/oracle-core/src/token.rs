//! token balances and minting

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::address::{Address, TxHash};
use crate::client::TokenActions;
use crate::codec::{Field, PLACEHOLDER};
use crate::poller::PollHandle;
use crate::Result;

/// private and public balance, `None` until first fetched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    pub private: Option<u128>,
    pub public: Option<u128>,
}

impl Balances {
    pub fn private_display(&self) -> String {
        display_amount(self.private)
    }

    pub fn public_display(&self) -> String {
        display_amount(self.public)
    }
}

fn display_amount(amount: Option<u128>) -> String {
    amount.map_or_else(|| PLACEHOLDER.to_string(), |a| a.to_string())
}

pub async fn fetch_balances(token: &dyn TokenActions, owner: &Address) -> Result<Balances> {
    let private = token.balance_of_private(owner).await?;
    let public = token.balance_of_public(owner).await?;
    Ok(Balances {
        private: Some(private),
        public: Some(public),
    })
}

/// mint `amount` private tokens to `to`: mint into a pending shield, then redeem it
pub async fn mint(token: &dyn TokenActions, to: &Address, amount: u128) -> Result<TxHash> {
    let secret = Field::from_big_endian(&rand::random::<[u8; 31]>());
    let secret_hash = token.secret_hash(secret);

    let mint_tx = token.mint_private(amount, secret_hash).await?;
    debug!("minted {} into pending shield ({})", amount, mint_tx.short());

    let redeem_tx = token.redeem_shield(to, amount, secret).await?;
    info!("minted {} tokens to {}", amount, to.short());
    Ok(redeem_tx)
}

/// poll balances of `owner` every `period`
///
/// the receiver starts at `Balances::default()` (both unknown). failed polls
/// keep the last value.
pub fn watch_balances(
    token: Arc<dyn TokenActions>,
    owner: Address,
    period: Duration,
) -> (PollHandle, watch::Receiver<Balances>) {
    let (tx, rx) = watch::channel(Balances::default());
    let tx = Arc::new(tx);

    let handle = PollHandle::spawn("balances", period, move || {
        let token = token.clone();
        let tx = tx.clone();
        async move {
            match fetch_balances(token.as_ref(), &owner).await {
                Ok(balances) => {
                    tx.send_if_modified(|current| {
                        if *current != balances {
                            *current = balances;
                            true
                        } else {
                            false
                        }
                    });
                }
                Err(e) => warn!("balance poll failed: {}", e),
            }
        }
    });

    (handle, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_balances_use_placeholder() {
        let balances = Balances::default();
        assert_eq!(balances.private_display(), "-");
        assert_eq!(balances.public_display(), "-");

        let balances = Balances {
            private: Some(1000),
            public: Some(0),
        };
        assert_eq!(balances.private_display(), "1000");
        assert_eq!(balances.public_display(), "0");
    }
}
