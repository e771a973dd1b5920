//! token + oracle deployment

use tracing::info;

use crate::address::Address;
use crate::client::Deployer;
use crate::config::{DeploymentConfig, DeploymentState};
use crate::{OracleError, Result};

/// deploy a token administered by `admin`, then an oracle charging `fee` in it
///
/// registers the payment-token and fee notes for the deployer and moves
/// `state` to deployed. fails with [`OracleError::AlreadyDeployed`] without
/// touching the network when `state` is already deployed.
pub async fn deploy(
    deployer: &dyn Deployer,
    admin: &Address,
    fee: u64,
    state: &mut DeploymentState,
) -> Result<DeploymentConfig> {
    if state.is_deployed() {
        return Err(OracleError::AlreadyDeployed);
    }

    let token = deployer.deploy_token(admin).await?;
    let (oracle, tx_hash) = deployer.deploy_oracle(&token, fee).await?;
    let config = DeploymentConfig {
        oracle,
        token,
        fee,
        tx_hash,
    };
    deployer.register_deployment_notes(&config).await?;
    state.mark_deployed(config)?;

    info!(
        "deployed oracle {} with token {} (fee {}, tx {})",
        oracle, token, fee, tx_hash
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_FEE;
    use crate::projection::{FEE_SLOT, PAYMENT_TOKEN_SLOT};
    use crate::sandbox::Sandbox;

    #[tokio::test]
    async fn test_deploy_registers_notes() {
        let sandbox = Sandbox::default();
        let admin = sandbox.wallet(Address::random());
        let mut state = DeploymentState::default();

        let config = deploy(&admin, &admin.address(), DEFAULT_FEE, &mut state)
            .await
            .unwrap();
        assert_eq!(state, DeploymentState::Deployed(config));
        assert_eq!(config.fee, DEFAULT_FEE);

        let slots: Vec<u64> = sandbox.registered_notes().iter().map(|n| n.slot).collect();
        assert_eq!(slots, vec![PAYMENT_TOKEN_SLOT, FEE_SLOT]);
    }

    #[tokio::test]
    async fn test_deploy_twice_fails() {
        let sandbox = Sandbox::default();
        let admin = sandbox.wallet(Address::random());
        let mut state = DeploymentState::default();
        deploy(&admin, &admin.address(), 1, &mut state).await.unwrap();

        let err = deploy(&admin, &admin.address(), 1, &mut state)
            .await
            .unwrap_err();
        assert_eq!(err, OracleError::AlreadyDeployed);
    }
}
