//! Chooses which identity signs an outgoing transaction.

use crate::{
    chain::{
        ChainError,
        IdentityKind,
        OperationKind,
        TxReceipt,
        TxRequest,
        TxSender,
        WalletBridge,
    },
    config::NetworkConfig,
    network_switch::ensure_expected_chain,
};
use ethers::types::{
    Address,
    TxHash,
};
use std::sync::{
    Arc,
    atomic::{
        AtomicBool,
        Ordering,
    },
};
use tracing::{
    debug,
    info,
    warn,
};

/// Session-wide opt-in to signing with the interactive wallet.
///
/// Clones share the same flag. The resolver clears it when an interactive
/// attempt cannot be honoured.
#[derive(Clone, Debug, Default)]
pub struct WalletPreference {
    interactive: Arc<AtomicBool>,
}

impl WalletPreference {
    pub fn new(interactive: bool) -> Self {
        Self {
            interactive: Arc::new(AtomicBool::new(interactive)),
        }
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive.load(Ordering::SeqCst)
    }

    pub fn set_interactive(&self, interactive: bool) {
        self.interactive.store(interactive, Ordering::SeqCst);
    }
}

/// The signer picked for one transaction.
#[derive(Clone, Debug)]
pub enum ResolvedSigner<P, S> {
    Platform(P),
    Interactive(S),
}

impl<P: TxSender, S: TxSender> ResolvedSigner<P, S> {
    pub fn is_interactive(&self) -> bool {
        matches!(self, ResolvedSigner::Interactive(_))
    }
}

impl<P: TxSender, S: TxSender> TxSender for ResolvedSigner<P, S> {
    fn address(&self) -> Address {
        match self {
            ResolvedSigner::Platform(signer) => signer.address(),
            ResolvedSigner::Interactive(signer) => signer.address(),
        }
    }

    fn kind(&self) -> IdentityKind {
        match self {
            ResolvedSigner::Platform(_) => IdentityKind::Platform,
            ResolvedSigner::Interactive(_) => IdentityKind::Interactive,
        }
    }

    async fn submit(&self, request: &TxRequest) -> Result<TxHash, ChainError> {
        match self {
            ResolvedSigner::Platform(signer) => signer.submit(request).await,
            ResolvedSigner::Interactive(signer) => signer.submit(request).await,
        }
    }

    async fn wait_for_confirmation(
        &self,
        tx_hash: TxHash,
    ) -> Result<TxReceipt, ChainError> {
        match self {
            ResolvedSigner::Platform(signer) => {
                signer.wait_for_confirmation(tx_hash).await
            }
            ResolvedSigner::Interactive(signer) => {
                signer.wait_for_confirmation(tx_hash).await
            }
        }
    }
}

pub struct IdentityResolver<P, W> {
    platform: P,
    wallet: Option<W>,
    preference: WalletPreference,
    network: NetworkConfig,
}

impl<P, W> IdentityResolver<P, W>
where
    P: TxSender + Clone,
    W: WalletBridge,
{
    pub fn new(
        platform: P,
        wallet: Option<W>,
        preference: WalletPreference,
        network: NetworkConfig,
    ) -> Self {
        Self {
            platform,
            wallet,
            preference,
            network,
        }
    }

    /// The configured platform signer. Never prompts.
    pub fn platform_identity(&self) -> P {
        self.platform.clone()
    }

    pub fn preference(&self) -> &WalletPreference {
        &self.preference
    }

    pub fn has_wallet(&self) -> bool {
        self.wallet.is_some()
    }

    /// Embedded wallets are interactive regardless of the stored preference.
    pub fn interactive_forced(&self) -> bool {
        self.wallet.as_ref().is_some_and(|wallet| wallet.is_embedded())
    }

    pub fn wants_interactive(&self) -> bool {
        self.interactive_forced() || self.preference.is_interactive()
    }

    /// Interactive signer when opted in and available, platform otherwise.
    ///
    /// Any wallet failure clears the stored preference and falls back to the
    /// platform identity.
    pub async fn effective_identity(
        &self,
        prefer_interactive: bool,
    ) -> ResolvedSigner<P, W::Session> {
        if !prefer_interactive && !self.interactive_forced() {
            return ResolvedSigner::Platform(self.platform_identity());
        }

        let Some(wallet) = self.wallet.as_ref() else {
            warn!("interactive signing requested but no wallet is configured; using platform identity");
            self.preference.set_interactive(false);
            return ResolvedSigner::Platform(self.platform_identity());
        };

        match wallet.request_session().await {
            Ok(session) => {
                let switch = ensure_expected_chain(wallet, &self.network).await;
                debug!(?switch, "wallet chain check finished");
                info!(address = ?session.address(), "using wallet session");
                ResolvedSigner::Interactive(session)
            }
            Err(err) => {
                warn!(%err, "wallet session unavailable; falling back to platform identity");
                self.preference.set_interactive(false);
                ResolvedSigner::Platform(self.platform_identity())
            }
        }
    }

    /// Effective identity under the stored preference.
    pub async fn current_identity(&self) -> ResolvedSigner<P, W::Session> {
        self.effective_identity(self.preference.is_interactive())
            .await
    }

    pub async fn identity_for(
        &self,
        operation: OperationKind,
    ) -> ResolvedSigner<P, W::Session> {
        if operation.requires_platform() {
            return ResolvedSigner::Platform(self.platform_identity());
        }
        self.current_identity().await
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use crate::{
        chain::{
            USER_REJECTED_REQUEST,
            WalletError,
        },
        test_helpers::{
            FakeSender,
            FakeWallet,
            WalletRequest,
            address,
        },
    };
    use deployments::DeploymentEnv;

    fn resolver(
        wallet: Option<FakeWallet>,
        preference: &WalletPreference,
    ) -> IdentityResolver<FakeSender, FakeWallet> {
        IdentityResolver::new(
            FakeSender::platform(address(1)),
            wallet,
            preference.clone(),
            NetworkConfig::from_preset(DeploymentEnv::Mainnet),
        )
    }

    #[tokio::test]
    async fn effective_identity__not_preferred__returns_platform_without_wallet_io() {
        // given
        let wallet = FakeWallet::default();
        let preference = WalletPreference::default();
        let resolver = resolver(Some(wallet.clone()), &preference);

        // when
        let signer = resolver.effective_identity(false).await;

        // then
        assert_eq!(signer.kind(), IdentityKind::Platform);
        assert_eq!(signer.address(), address(1));
        assert!(wallet.requests().is_empty());
    }

    #[tokio::test]
    async fn effective_identity__preferred_without_wallet__falls_back_and_clears_flag() {
        // given
        let preference = WalletPreference::new(true);
        let resolver = resolver(None, &preference);

        // when
        let signer = resolver.current_identity().await;

        // then
        assert_eq!(signer.kind(), IdentityKind::Platform);
        assert!(!preference.is_interactive());
    }

    #[tokio::test]
    async fn effective_identity__wallet_declines__falls_back_and_clears_flag() {
        // given
        let wallet = FakeWallet::default();
        wallet.fail_session(WalletError::new(
            Some(USER_REJECTED_REQUEST),
            "User rejected the request.",
        ));
        let preference = WalletPreference::new(true);
        let resolver = resolver(Some(wallet.clone()), &preference);

        // when
        let signer = resolver.current_identity().await;

        // then
        assert_eq!(signer.kind(), IdentityKind::Platform);
        assert!(!preference.is_interactive());
        assert_eq!(wallet.requests(), vec![WalletRequest::RequestAccounts]);
    }

    #[tokio::test]
    async fn effective_identity__wallet_grants__switches_chain_and_returns_session() {
        // given
        let wallet = FakeWallet::with_session(FakeSender::interactive(address(7)));
        let preference = WalletPreference::new(true);
        let resolver = resolver(Some(wallet.clone()), &preference);

        // when
        let signer = resolver.current_identity().await;

        // then
        assert_eq!(signer.kind(), IdentityKind::Interactive);
        assert_eq!(signer.address(), address(7));
        assert!(preference.is_interactive());
        assert_eq!(
            wallet.requests(),
            vec![
                WalletRequest::RequestAccounts,
                WalletRequest::SwitchChain("0xa4ec".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn effective_identity__embedded_wallet__is_interactive_without_switching() {
        // given
        let wallet = FakeWallet::embedded();
        let preference = WalletPreference::default();
        let resolver = resolver(Some(wallet.clone()), &preference);

        // when
        let signer = resolver.effective_identity(false).await;

        // then
        assert!(signer.is_interactive());
        assert_eq!(wallet.requests(), vec![WalletRequest::RequestAccounts]);
    }

    #[tokio::test]
    async fn identity_for__admin_operation_with_interactive_session__uses_platform() {
        // given
        let wallet = FakeWallet::default();
        let preference = WalletPreference::new(true);
        let resolver = resolver(Some(wallet.clone()), &preference);

        // when
        let create = resolver.identity_for(OperationKind::CreateMatch).await;
        let settle = resolver.identity_for(OperationKind::SubmitResult).await;
        let withdraw = resolver.identity_for(OperationKind::WithdrawFees).await;
        let claim = resolver.identity_for(OperationKind::Claim).await;

        // then
        assert_eq!(create.kind(), IdentityKind::Platform);
        assert_eq!(settle.kind(), IdentityKind::Platform);
        assert_eq!(withdraw.kind(), IdentityKind::Platform);
        assert_eq!(claim.kind(), IdentityKind::Interactive);
        assert!(preference.is_interactive());
    }

    #[tokio::test]
    async fn effective_identity__repeated_calls__preference_persists() {
        // given
        let wallet = FakeWallet::default();
        let preference = WalletPreference::new(true);
        let resolver = resolver(Some(wallet), &preference);

        // when
        let first = resolver.current_identity().await;
        let second = resolver.current_identity().await;

        // then
        assert!(first.is_interactive());
        assert!(second.is_interactive());
        assert!(resolver.wants_interactive());
    }
}
