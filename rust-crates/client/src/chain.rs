//! Seams between the client core and the chain.

use crate::{
    config::AddChainParams,
    types::{
        Match,
        Prediction,
        View,
    },
};
use ethers::types::{
    Address,
    TxHash,
    U256,
};
use std::future::Future;

/// EIP-1193 code for a request the wallet's user declined.
pub const USER_REJECTED_REQUEST: i64 = 4001;
/// EIP-1193 code for a chain the wallet does not know about.
pub const UNRECOGNIZED_CHAIN: i64 = 4902;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("{message}")]
    Rpc {
        code: Option<i64>,
        message: String,
        reason: Option<String>,
    },
    #[error("transaction {0:?} was dropped before confirmation")]
    Dropped(TxHash),
    #[error("execution reverted in transaction {0:?}")]
    Reverted(TxHash),
}

impl ChainError {
    pub fn rpc(message: impl Into<String>) -> Self {
        ChainError::Rpc {
            code: None,
            message: message.into(),
            reason: None,
        }
    }

    pub fn code(&self) -> Option<i64> {
        match self {
            ChainError::Rpc { code, .. } => *code,
            _ => None,
        }
    }

    /// Revert reason decoded from the chain, when one was supplied.
    pub fn reason(&self) -> Option<&str> {
        match self {
            ChainError::Rpc { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("wallet request failed (code {code:?}): {message}")]
pub struct WalletError {
    pub code: Option<i64>,
    pub message: String,
}

impl WalletError {
    pub fn new(code: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_unrecognized_chain(&self) -> bool {
        self.code == Some(UNRECOGNIZED_CHAIN)
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code == Some(USER_REJECTED_REQUEST)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdentityKind {
    Platform,
    Interactive,
}

impl IdentityKind {
    pub fn label(self) -> &'static str {
        match self {
            IdentityKind::Platform => "platform",
            IdentityKind::Interactive => "wallet",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Predict,
    Claim,
    CreateMatch,
    SubmitResult,
    WithdrawFees,
}

impl OperationKind {
    /// Fixed gas ceiling attached to every call of this kind.
    pub fn gas_limit(self) -> u64 {
        match self {
            OperationKind::Predict => 600_000,
            OperationKind::Claim => 300_000,
            OperationKind::CreateMatch => 800_000,
            OperationKind::SubmitResult => 800_000,
            OperationKind::WithdrawFees => 500_000,
        }
    }

    /// Owner-gated calls are always signed by the platform identity.
    pub fn requires_platform(self) -> bool {
        matches!(
            self,
            OperationKind::CreateMatch
                | OperationKind::SubmitResult
                | OperationKind::WithdrawFees
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            OperationKind::Predict => "prediction",
            OperationKind::Claim => "claim",
            OperationKind::CreateMatch => "match creation",
            OperationKind::SubmitResult => "result submission",
            OperationKind::WithdrawFees => "fee withdrawal",
        }
    }

    pub fn results_view(self) -> Option<View> {
        match self {
            OperationKind::Predict => Some(View::MyBets),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MarketCall {
    PredictMatch {
        match_id: U256,
        home_score: u8,
        away_score: u8,
        stake: U256,
    },
    ClaimWinnings,
    CreateMatch {
        home_team: String,
        away_team: String,
        kickoff_time: u64,
    },
    SubmitResult {
        match_id: U256,
        home_score: u8,
        away_score: u8,
    },
    WithdrawPlatformFees,
}

impl MarketCall {
    pub fn kind(&self) -> OperationKind {
        match self {
            MarketCall::PredictMatch { .. } => OperationKind::Predict,
            MarketCall::ClaimWinnings => OperationKind::Claim,
            MarketCall::CreateMatch { .. } => OperationKind::CreateMatch,
            MarketCall::SubmitResult { .. } => OperationKind::SubmitResult,
            MarketCall::WithdrawPlatformFees => OperationKind::WithdrawFees,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxRequest {
    pub call: MarketCall,
    pub gas_limit: u64,
}

impl TxRequest {
    pub fn new(call: MarketCall) -> Self {
        let gas_limit = call.kind().gas_limit();
        Self { call, gas_limit }
    }

    pub fn kind(&self) -> OperationKind {
        self.call.kind()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
}

/// Read-only view of the market contract and chain balances.
pub trait MarketReader: Clone + Send + Sync + 'static {
    fn contract_address(&self) -> Address;

    fn match_counter(&self) -> impl Future<Output = Result<U256, ChainError>> + Send;

    fn get_match(
        &self,
        id: U256,
    ) -> impl Future<Output = Result<Match, ChainError>> + Send;

    fn active_matches(&self)
    -> impl Future<Output = Result<Vec<Match>, ChainError>> + Send;

    /// Match ids and predictions as parallel arrays, index-aligned.
    fn user_predictions(
        &self,
        user: Address,
    ) -> impl Future<Output = Result<(Vec<U256>, Vec<Prediction>), ChainError>> + Send;

    fn match_predictions(
        &self,
        id: U256,
    ) -> impl Future<Output = Result<Vec<Prediction>, ChainError>> + Send;

    fn user_winnings(
        &self,
        user: Address,
    ) -> impl Future<Output = Result<U256, ChainError>> + Send;

    fn owner(&self) -> impl Future<Output = Result<Address, ChainError>> + Send;

    fn balance_of(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<U256, ChainError>> + Send;
}

/// A signing capability bound to one address.
pub trait TxSender: Send + Sync {
    fn address(&self) -> Address;

    fn kind(&self) -> IdentityKind;

    fn submit(
        &self,
        request: &TxRequest,
    ) -> impl Future<Output = Result<TxHash, ChainError>> + Send;

    fn wait_for_confirmation(
        &self,
        tx_hash: TxHash,
    ) -> impl Future<Output = Result<TxReceipt, ChainError>> + Send;
}

/// An interactive wallet reached over EIP-1193 requests.
pub trait WalletBridge: Send + Sync {
    type Session: TxSender;

    /// Embedded wallets are always interactive and already on the right chain.
    fn is_embedded(&self) -> bool;

    fn request_session(
        &self,
    ) -> impl Future<Output = Result<Self::Session, WalletError>> + Send;

    fn switch_chain(
        &self,
        chain_id_hex: &str,
    ) -> impl Future<Output = Result<(), WalletError>> + Send;

    fn add_chain(
        &self,
        params: &AddChainParams,
    ) -> impl Future<Output = Result<(), WalletError>> + Send;
}
