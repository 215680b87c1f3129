//! User-facing market operations wired through identity, pre-flight checks
//! and the transaction orchestrator.

use crate::{
    chain::{
        ChainError,
        IdentityKind,
        MarketCall,
        MarketReader,
        OperationKind,
        TxRequest,
        TxSender,
        WalletBridge,
    },
    config::{
        MarketConfig,
        NetworkConfig,
    },
    identity::{
        IdentityResolver,
        ResolvedSigner,
    },
    leaderboard::compute_leaderboard_with_fee,
    orchestrator::{
        Outcome,
        TxOrchestrator,
    },
    preflight::{
        self,
        PreflightError,
    },
    reconciler::DataReconciler,
    types::{
        LeaderboardEntry,
        unix_now,
    },
};
use ethers::types::{
    Address,
    U256,
};
use tokio::sync::watch;
use tracing::{
    info,
    warn,
};

/// The identity currently shown to the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Connection {
    pub address: Address,
    pub kind: IdentityKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OwnerStatus {
    pub owner: Address,
    pub platform_is_owner: bool,
    /// `None` when no admin address is configured.
    pub admin_is_owner: Option<bool>,
}

pub struct AppController<R, P, W> {
    reader: R,
    resolver: IdentityResolver<P, W>,
    orchestrator: TxOrchestrator,
    reconciler: DataReconciler<R>,
    market: MarketConfig,
    network: NetworkConfig,
    identity: watch::Sender<Option<Address>>,
}

impl<R, P, W> AppController<R, P, W>
where
    R: MarketReader,
    P: TxSender + Clone,
    W: WalletBridge,
{
    pub fn new(
        reader: R,
        resolver: IdentityResolver<P, W>,
        orchestrator: TxOrchestrator,
        market: MarketConfig,
        network: NetworkConfig,
    ) -> Self {
        let (identity, _) = watch::channel(None);
        Self {
            reconciler: DataReconciler::new(reader.clone()),
            reader,
            resolver,
            orchestrator,
            market,
            network,
            identity,
        }
    }

    pub fn reconciler(&self) -> &DataReconciler<R> {
        &self.reconciler
    }

    pub fn orchestrator(&self) -> &TxOrchestrator {
        &self.orchestrator
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    pub fn market(&self) -> &MarketConfig {
        &self.market
    }

    pub fn wallet_available(&self) -> bool {
        self.resolver.has_wallet()
    }

    pub fn interactive_forced(&self) -> bool {
        self.resolver.interactive_forced()
    }

    /// Address the reconciler should track; `None` until connected.
    pub fn subscribe_identity(&self) -> watch::Receiver<Option<Address>> {
        self.identity.subscribe()
    }

    fn publish<S: TxSender>(&self, signer: &S) -> Connection {
        let address = signer.address();
        self.identity.send_if_modified(|current| {
            if *current == Some(address) {
                false
            } else {
                *current = Some(address);
                true
            }
        });
        Connection {
            address,
            kind: signer.kind(),
        }
    }

    /// Resolves the effective identity and starts tracking its address.
    pub async fn connect(&self) -> Connection {
        let signer = self.resolver.current_identity().await;
        let connection = self.publish(&signer);
        info!(
            address = ?connection.address,
            identity = connection.kind.label(),
            "connected"
        );
        connection
    }

    /// Flips between wallet and platform signing, then reconnects.
    ///
    /// Embedded wallets stay interactive. A wallet that cannot be reached
    /// leaves the platform identity in place.
    pub async fn toggle_wallet_mode(&self) -> Connection {
        if !self.resolver.interactive_forced() {
            let preference = self.resolver.preference();
            preference.set_interactive(!preference.is_interactive());
        }
        self.connect().await
    }

    async fn signer_for(&self, operation: OperationKind) -> ResolvedSigner<P, W::Session> {
        let signer = self.resolver.identity_for(operation).await;
        if !operation.requires_platform() {
            self.publish(&signer);
        }
        signer
    }

    async fn run(&self, call: MarketCall) -> Outcome {
        let operation = call.kind();
        self.orchestrator
            .execute(TxRequest::new(call), self.signer_for(operation))
            .await
    }

    fn blocked(&self, operation: OperationKind, err: PreflightError) -> Outcome {
        self.orchestrator.reject(operation, err.to_string())
    }

    /// Places a prediction at the configured entry fee.
    pub async fn place_prediction(&self, match_id: U256, home: &str, away: &str) -> Outcome {
        if self.orchestrator.is_busy() {
            return Outcome::Busy;
        }
        let view = self.reconciler.view();
        let (home_score, away_score) =
            match preflight::check_prediction(&view, match_id, home, away, unix_now()) {
                Ok(scores) => scores,
                Err(err) => return self.blocked(OperationKind::Predict, err),
            };
        self.run(MarketCall::PredictMatch {
            match_id,
            home_score,
            away_score,
            stake: self.market.entry_fee,
        })
        .await
    }

    pub async fn claim_winnings(&self) -> Outcome {
        if self.orchestrator.is_busy() {
            return Outcome::Busy;
        }
        if let Err(err) = preflight::check_claim(&self.reconciler.view()) {
            return self.blocked(OperationKind::Claim, err);
        }
        self.run(MarketCall::ClaimWinnings).await
    }

    pub async fn create_match(&self, home_team: &str, away_team: &str, kickoff_time: u64) -> Outcome {
        if self.orchestrator.is_busy() {
            return Outcome::Busy;
        }
        if let Err(err) =
            preflight::check_new_match(home_team, away_team, kickoff_time, unix_now())
        {
            return self.blocked(OperationKind::CreateMatch, err);
        }
        self.run(MarketCall::CreateMatch {
            home_team: home_team.trim().to_string(),
            away_team: away_team.trim().to_string(),
            kickoff_time,
        })
        .await
    }

    pub async fn submit_result(&self, match_id: U256, home: &str, away: &str) -> Outcome {
        if self.orchestrator.is_busy() {
            return Outcome::Busy;
        }
        let m = match self.reader.get_match(match_id).await {
            Ok(m) => m,
            Err(err) => {
                warn!(%err, %match_id, "match lookup before settlement failed");
                return self.orchestrator.reject(
                    OperationKind::SubmitResult,
                    format!("Could not load match {match_id}: {err}"),
                );
            }
        };
        let (home_score, away_score) =
            match preflight::check_settlement(&m, home, away, unix_now()) {
                Ok(scores) => scores,
                Err(err) => return self.blocked(OperationKind::SubmitResult, err),
            };
        self.run(MarketCall::SubmitResult {
            match_id,
            home_score,
            away_score,
        })
        .await
    }

    pub async fn withdraw_platform_fees(&self) -> Outcome {
        self.run(MarketCall::WithdrawPlatformFees).await
    }

    pub async fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        compute_leaderboard_with_fee(&self.reader, self.market.platform_fee_percent).await
    }

    /// Whether the platform identity owns the contract. Mismatches are
    /// logged, not fatal.
    /// Reads `owner()` and compares it with the platform key and, when one is
    /// configured, the expected admin address. Mismatches are warned about only.
    pub async fn owner_status(&self) -> Result<OwnerStatus, ChainError> {
        let owner = self.reader.owner().await?;
        let platform = self.resolver.platform_identity().address();
        let platform_is_owner = owner == platform;
        if !platform_is_owner {
            warn!(?owner, ?platform, "platform identity is not the contract owner");
        }
        let admin_is_owner = self.market.admin_address.map(|admin| {
            if admin != owner {
                warn!(?owner, ?admin, "configured admin address is not the contract owner");
            }
            admin == owner
        });
        Ok(OwnerStatus {
            owner,
            platform_is_owner,
            admin_is_owner,
        })
    }

    pub async fn check_owner(&self) -> Result<bool, ChainError> {
        self.owner_status()
            .await
            .map(|status| status.platform_is_owner)
    }
}
