//! JSON-RPC backed implementations of the chain seams.

use crate::{
    chain::{
        ChainError,
        IdentityKind,
        MarketCall,
        MarketReader,
        TxReceipt,
        TxRequest,
        TxSender,
        WalletBridge,
        WalletError,
    },
    config::{
        AddChainParams,
        ClientSettings,
    },
    controller::AppController,
    identity::{
        IdentityResolver,
        WalletPreference,
    },
    orchestrator::TxOrchestrator,
    types::{
        Match,
        Prediction,
        saturating_u64,
    },
};
use ethers::{
    abi::Tokenizable,
    contract::ContractError,
    middleware::SignerMiddleware,
    providers::{
        Http,
        Middleware,
        MiddlewareError,
        PendingTransaction,
        Provider,
        ProviderError,
        RpcError,
    },
    signers::{
        LocalWallet,
        Signer,
    },
    types::{
        Address,
        TxHash,
        U64,
        U256,
    },
};
use generated_abi::prediction_market_types::{
    PredictionMarket,
    contract_instance,
};
use serde::Serialize;
use std::{
    sync::Arc,
    time::Duration,
};

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(1_000);

pub type PlatformClient = SignerMiddleware<Provider<Http>, LocalWallet>;
pub type PlatformSender = ContractSender<PlatformClient>;
pub type WalletSessionSender = ContractSender<Provider<Http>>;
pub type LiveController = AppController<RpcMarketReader, PlatformSender, Eip1193Bridge>;

pub fn connect(url: &str) -> Result<Provider<Http>, ChainError> {
    Provider::<Http>::try_from(url)
        .map(|provider| provider.interval(RECEIPT_POLL_INTERVAL))
        .map_err(|err| ChainError::rpc(format!("invalid RPC url {url}: {err}")))
}

/// `getMatch`/`getActiveMatches` element: id, teams, kickoff, pool, settled,
/// final score, distributed.
pub type MatchTuple = (U256, String, String, U256, U256, bool, u8, u8, bool);

/// `getUserPredictions`/`getMatchPredictions` element: predictor, scores,
/// amount, timestamp.
pub type PredictionTuple = (Address, u8, u8, U256, U256);

impl From<MatchTuple> for Match {
    fn from(
        (
            id,
            home_team,
            away_team,
            kickoff_time,
            prize_pool,
            results_submitted,
            final_home_score,
            final_away_score,
            prizes_distributed,
        ): MatchTuple,
    ) -> Self {
        Match {
            id,
            home_team,
            away_team,
            kickoff_time: saturating_u64(kickoff_time),
            prize_pool,
            results_submitted,
            final_home_score,
            final_away_score,
            prizes_distributed,
        }
    }
}

impl From<PredictionTuple> for Prediction {
    fn from((predictor, home_score, away_score, amount, timestamp): PredictionTuple) -> Self {
        Prediction {
            predictor,
            home_score,
            away_score,
            amount,
            timestamp: saturating_u64(timestamp),
        }
    }
}

/// Re-reads a decoded return value through its ABI token, so the binding may
/// hand back either a generated struct or a plain tuple.
fn reshape<D, T>(value: D) -> Result<T, ChainError>
where
    D: Tokenizable,
    T: Tokenizable,
{
    T::from_token(value.into_token())
        .map_err(|err| ChainError::rpc(format!("unexpected contract return shape: {err}")))
}

fn decode_match<D: Tokenizable>(value: D) -> Result<Match, ChainError> {
    reshape::<D, MatchTuple>(value).map(Match::from)
}

fn decode_predictions<D: Tokenizable>(values: Vec<D>) -> Result<Vec<Prediction>, ChainError> {
    values
        .into_iter()
        .map(|value| reshape::<D, PredictionTuple>(value).map(Prediction::from))
        .collect()
}

fn contract_error<M: Middleware>(err: ContractError<M>) -> ChainError {
    let code = err
        .as_middleware_error()
        .and_then(|inner| MiddlewareError::as_error_response(inner))
        .map(|response| response.code);
    ChainError::Rpc {
        code,
        message: err.to_string(),
        reason: err.decode_revert::<String>(),
    }
}

fn provider_error(err: ProviderError) -> ChainError {
    ChainError::Rpc {
        code: RpcError::as_error_response(&err).map(|response| response.code),
        message: err.to_string(),
        reason: None,
    }
}

fn wallet_error(err: ProviderError) -> WalletError {
    WalletError::new(
        RpcError::as_error_response(&err).map(|response| response.code),
        err.to_string(),
    )
}

/// Read-only access through a public RPC endpoint.
#[derive(Clone, Debug)]
pub struct RpcMarketReader {
    provider: Arc<Provider<Http>>,
    contract: PredictionMarket<Provider<Http>>,
}

impl RpcMarketReader {
    pub fn new(provider: Provider<Http>, contract_address: Address) -> Self {
        let provider = Arc::new(provider);
        let contract = contract_instance(contract_address, provider.clone());
        Self { provider, contract }
    }
}

impl MarketReader for RpcMarketReader {
    fn contract_address(&self) -> Address {
        self.contract.address()
    }

    async fn match_counter(&self) -> Result<U256, ChainError> {
        self.contract
            .match_counter()
            .call()
            .await
            .map_err(contract_error)
    }

    async fn get_match(&self, id: U256) -> Result<Match, ChainError> {
        self.contract
            .get_match(id)
            .call()
            .await
            .map_err(contract_error)
            .and_then(decode_match)
    }

    async fn active_matches(&self) -> Result<Vec<Match>, ChainError> {
        let infos = self
            .contract
            .get_active_matches()
            .call()
            .await
            .map_err(contract_error)?;
        infos.into_iter().map(decode_match).collect()
    }

    async fn user_predictions(
        &self,
        user: Address,
    ) -> Result<(Vec<U256>, Vec<Prediction>), ChainError> {
        let (ids, infos) = self
            .contract
            .get_user_predictions(user)
            .call()
            .await
            .map_err(contract_error)?;
        Ok((ids, decode_predictions(infos)?))
    }

    async fn match_predictions(&self, id: U256) -> Result<Vec<Prediction>, ChainError> {
        let infos = self
            .contract
            .get_match_predictions(id)
            .call()
            .await
            .map_err(contract_error)?;
        decode_predictions(infos)
    }

    async fn user_winnings(&self, user: Address) -> Result<U256, ChainError> {
        self.contract
            .user_winnings(user)
            .call()
            .await
            .map_err(contract_error)
    }

    async fn owner(&self) -> Result<Address, ChainError> {
        self.contract.owner().call().await.map_err(contract_error)
    }

    async fn balance_of(&self, address: Address) -> Result<U256, ChainError> {
        self.provider
            .get_balance(address, None)
            .await
            .map_err(provider_error)
    }
}

/// Sends market calls through a middleware stack on behalf of `from`.
#[derive(Clone, Debug)]
pub struct ContractSender<M> {
    contract: PredictionMarket<M>,
    from: Address,
    kind: IdentityKind,
}

impl<M: Middleware + 'static> ContractSender<M> {
    pub fn new(contract: PredictionMarket<M>, from: Address, kind: IdentityKind) -> Self {
        Self {
            contract,
            from,
            kind,
        }
    }
}

/// Platform signer: a local key behind a signing middleware.
pub fn platform_sender(
    provider: Provider<Http>,
    wallet: LocalWallet,
    contract_address: Address,
) -> PlatformSender {
    let from = wallet.address();
    let client = Arc::new(SignerMiddleware::new(provider, wallet));
    ContractSender::new(
        contract_instance(contract_address, client),
        from,
        IdentityKind::Platform,
    )
}

impl<M: Middleware + 'static> TxSender for ContractSender<M> {
    fn address(&self) -> Address {
        self.from
    }

    fn kind(&self) -> IdentityKind {
        self.kind
    }

    async fn submit(&self, request: &TxRequest) -> Result<TxHash, ChainError> {
        let call = match &request.call {
            MarketCall::PredictMatch {
                match_id,
                home_score,
                away_score,
                stake,
            } => self
                .contract
                .predict_match(*match_id, *home_score, *away_score)
                .value(*stake),
            MarketCall::ClaimWinnings => self.contract.claim_winnings(),
            MarketCall::CreateMatch {
                home_team,
                away_team,
                kickoff_time,
            } => self.contract.create_match(
                home_team.clone(),
                away_team.clone(),
                U256::from(*kickoff_time),
            ),
            MarketCall::SubmitResult {
                match_id,
                home_score,
                away_score,
            } => self
                .contract
                .submit_result(*match_id, *home_score, *away_score),
            MarketCall::WithdrawPlatformFees => self.contract.withdraw_platform_fees(),
        };
        let call = call.from(self.from).gas(request.gas_limit);
        let pending = call.send().await.map_err(contract_error)?;
        Ok(*pending)
    }

    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> Result<TxReceipt, ChainError> {
        let client = self.contract.client();
        let receipt = PendingTransaction::new(tx_hash, client.provider())
            .confirmations(1)
            .await
            .map_err(provider_error)?;
        match receipt {
            None => Err(ChainError::Dropped(tx_hash)),
            Some(receipt) if receipt.status == Some(U64::zero()) => {
                Err(ChainError::Reverted(tx_hash))
            }
            Some(receipt) => Ok(TxReceipt {
                tx_hash,
                block_number: receipt.block_number.map(|block| block.as_u64()),
                gas_used: receipt.gas_used,
            }),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwitchChainParams<'a> {
    chain_id: &'a str,
}

/// EIP-1193 wallet reached over JSON-RPC. Transactions are signed by the
/// wallet through `eth_sendTransaction`.
#[derive(Clone, Debug)]
pub struct Eip1193Bridge {
    provider: Arc<Provider<Http>>,
    contract_address: Address,
    embedded: bool,
}

impl Eip1193Bridge {
    pub fn new(provider: Provider<Http>, contract_address: Address, embedded: bool) -> Self {
        Self {
            provider: Arc::new(provider),
            contract_address,
            embedded,
        }
    }
}

impl WalletBridge for Eip1193Bridge {
    type Session = WalletSessionSender;

    fn is_embedded(&self) -> bool {
        self.embedded
    }

    async fn request_session(&self) -> Result<WalletSessionSender, WalletError> {
        let accounts: Vec<Address> = self
            .provider
            .request("eth_requestAccounts", ())
            .await
            .map_err(wallet_error)?;
        let from = accounts
            .first()
            .copied()
            .ok_or_else(|| WalletError::new(None, "wallet returned no accounts"))?;
        Ok(ContractSender::new(
            contract_instance(self.contract_address, self.provider.clone()),
            from,
            IdentityKind::Interactive,
        ))
    }

    async fn switch_chain(&self, chain_id_hex: &str) -> Result<(), WalletError> {
        let params = [SwitchChainParams {
            chain_id: chain_id_hex,
        }];
        self.provider
            .request::<_, serde_json::Value>("wallet_switchEthereumChain", params)
            .await
            .map(|_| ())
            .map_err(wallet_error)
    }

    async fn add_chain(&self, params: &AddChainParams) -> Result<(), WalletError> {
        self.provider
            .request::<_, serde_json::Value>("wallet_addEthereumChain", [params])
            .await
            .map(|_| ())
            .map_err(wallet_error)
    }
}

/// Wires the RPC reader, platform signer and optional wallet bridge into a
/// controller for the configured network.
pub fn live_controller(
    settings: &ClientSettings,
    platform_wallet: LocalWallet,
    prefer_interactive: bool,
    orchestrator: TxOrchestrator,
) -> Result<LiveController, ChainError> {
    let contract_address = settings.market.contract_address;
    let provider = connect(&settings.network.rpc_url)?;
    let reader = RpcMarketReader::new(provider.clone(), contract_address);
    let platform = platform_sender(provider, platform_wallet, contract_address);
    let wallet = settings
        .wallet_url
        .as_deref()
        .map(|url| {
            connect(url).map(|provider| {
                Eip1193Bridge::new(provider, contract_address, settings.embedded_wallet)
            })
        })
        .transpose()?;
    let resolver = IdentityResolver::new(
        platform,
        wallet,
        WalletPreference::new(prefer_interactive),
        settings.network.clone(),
    );
    Ok(AppController::new(
        reader,
        resolver,
        orchestrator,
        settings.market.clone(),
        settings.network.clone(),
    ))
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    fn ghana_togo() -> MatchTuple {
        (
            U256::from(4),
            "Ghana".to_string(),
            "Togo".to_string(),
            U256::from(1_700_000_000u64),
            U256::from(10),
            true,
            2,
            2,
            false,
        )
    }

    #[test]
    fn decode_match__abi_tuple__copies_every_field() {
        // given
        let returned = ghana_togo();

        // when
        let m = decode_match(returned).unwrap();

        // then
        assert_eq!(m.id, U256::from(4));
        assert_eq!(m.fixture(), "Ghana vs Togo");
        assert_eq!(m.kickoff_time, 1_700_000_000);
        assert_eq!(m.prize_pool, U256::from(10));
        assert_eq!(m.final_score(), Some((2, 2)));
        assert!(!m.prizes_distributed);
    }

    #[test]
    fn decode_match__wrong_shape__is_an_rpc_error() {
        let returned = (U256::from(4), "Ghana".to_string());

        assert!(matches!(decode_match(returned), Err(ChainError::Rpc { .. })));
    }

    #[test]
    fn decode_predictions__oversized_timestamp__saturates() {
        // given
        let returned: Vec<PredictionTuple> = vec![(
            Address::repeat_byte(1),
            1,
            0,
            U256::from(5),
            U256::MAX,
        )];

        // when
        let predictions = decode_predictions(returned).unwrap();

        // then
        assert_eq!(predictions[0].predictor, Address::repeat_byte(1));
        assert_eq!((predictions[0].home_score, predictions[0].away_score), (1, 0));
        assert_eq!(predictions[0].timestamp, u64::MAX);
    }

    #[test]
    fn provider_error__json_rpc_response__keeps_the_code() {
        // given
        let err = ProviderError::JsonRpcClientError(Box::new(
            ethers::providers::HttpClientError::JsonRpcError(
                ethers::providers::JsonRpcError {
                    code: 4001,
                    message: "User rejected the request.".to_string(),
                    data: None,
                },
            ),
        ));

        // when
        let wallet = wallet_error(err);

        // then
        assert!(wallet.is_user_rejection());
    }

    #[test]
    fn connect__malformed_url__is_an_rpc_error() {
        assert!(matches!(connect("not a url"), Err(ChainError::Rpc { .. })));
    }

    #[test]
    fn switch_chain_params__serialize__as_wallet_expects() {
        let params = [SwitchChainParams { chain_id: "0xa4ec" }];

        assert_eq!(
            serde_json::to_value(params).unwrap(),
            serde_json::json!([{ "chainId": "0xa4ec" }])
        );
    }
}
