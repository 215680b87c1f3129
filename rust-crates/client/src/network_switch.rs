use crate::{
    chain::WalletBridge,
    config::NetworkConfig,
};
use tracing::{
    info,
    warn,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainSwitch {
    /// Embedded wallets are assumed to already be on the right chain.
    Skipped,
    Switched,
    /// The wallet did not know the chain and was asked to register it.
    Registered,
    Failed,
}

/// Asks the wallet to move to the configured chain, registering it when the
/// wallet reports it as unknown. Never fails: a wrong chain surfaces later as
/// a rejected contract call.
pub async fn ensure_expected_chain<W: WalletBridge>(
    wallet: &W,
    network: &NetworkConfig,
) -> ChainSwitch {
    if wallet.is_embedded() {
        return ChainSwitch::Skipped;
    }

    let chain_id = network.chain_id_hex();
    match wallet.switch_chain(&chain_id).await {
        Ok(()) => ChainSwitch::Switched,
        Err(err) if err.is_unrecognized_chain() => {
            info!(%chain_id, chain = %network.chain_name, "wallet does not know chain; registering it");
            match wallet.add_chain(&network.add_chain_params()).await {
                Ok(()) => ChainSwitch::Registered,
                Err(err) => {
                    warn!(%err, %chain_id, "failed to register chain with wallet");
                    ChainSwitch::Failed
                }
            }
        }
        Err(err) => {
            warn!(%err, %chain_id, "failed to switch wallet chain");
            ChainSwitch::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use crate::{
        chain::{
            UNRECOGNIZED_CHAIN,
            USER_REJECTED_REQUEST,
            WalletError,
        },
        test_helpers::{
            FakeWallet,
            WalletRequest,
        },
    };
    use deployments::DeploymentEnv;

    fn mainnet() -> NetworkConfig {
        NetworkConfig::from_preset(DeploymentEnv::Mainnet)
    }

    #[tokio::test]
    async fn ensure_expected_chain__known_chain__switches_only() {
        // given
        let wallet = FakeWallet::default();

        // when
        let outcome = ensure_expected_chain(&wallet, &mainnet()).await;

        // then
        assert_eq!(outcome, ChainSwitch::Switched);
        assert_eq!(
            wallet.requests(),
            vec![WalletRequest::SwitchChain("0xa4ec".to_string())]
        );
    }

    #[tokio::test]
    async fn ensure_expected_chain__unknown_chain__registers_full_config() {
        // given
        let wallet = FakeWallet::default();
        wallet.fail_switch(WalletError::new(Some(UNRECOGNIZED_CHAIN), "Unrecognized chain ID"));

        // when
        let outcome = ensure_expected_chain(&wallet, &mainnet()).await;

        // then
        assert_eq!(outcome, ChainSwitch::Registered);
        assert_eq!(
            wallet.requests(),
            vec![
                WalletRequest::SwitchChain("0xa4ec".to_string()),
                WalletRequest::AddChain(mainnet().add_chain_params()),
            ]
        );
    }

    #[tokio::test]
    async fn ensure_expected_chain__other_error__is_swallowed_without_registering() {
        // given
        let wallet = FakeWallet::default();
        wallet.fail_switch(WalletError::new(Some(USER_REJECTED_REQUEST), "User rejected"));

        // when
        let outcome = ensure_expected_chain(&wallet, &mainnet()).await;

        // then
        assert_eq!(outcome, ChainSwitch::Failed);
        assert_eq!(wallet.requests().len(), 1);
    }

    #[tokio::test]
    async fn ensure_expected_chain__registration_fails__reports_failure() {
        // given
        let wallet = FakeWallet::default();
        wallet.fail_switch(WalletError::new(Some(UNRECOGNIZED_CHAIN), "Unrecognized chain ID"));
        wallet.fail_add_chain(WalletError::new(None, "nope"));

        // when
        let outcome = ensure_expected_chain(&wallet, &mainnet()).await;

        // then
        assert_eq!(outcome, ChainSwitch::Failed);
    }

    #[tokio::test]
    async fn ensure_expected_chain__embedded_wallet__makes_no_requests() {
        // given
        let wallet = FakeWallet::embedded();

        // when
        let outcome = ensure_expected_chain(&wallet, &mainnet()).await;

        // then
        assert_eq!(outcome, ChainSwitch::Skipped);
        assert!(wallet.requests().is_empty());
    }
}
