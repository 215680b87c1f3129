//! In-memory stand-ins for the chain seams.

use crate::{
    chain::{
        ChainError,
        IdentityKind,
        MarketReader,
        TxReceipt,
        TxRequest,
        TxSender,
        WalletBridge,
        WalletError,
    },
    config::AddChainParams,
    types::{
        Match,
        Prediction,
    },
};
use ethers::types::{
    Address,
    TxHash,
    U256,
};
use std::{
    collections::{
        BTreeMap,
        HashMap,
        HashSet,
    },
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
};
use tokio::sync::Notify;

pub fn address(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Individual reads that can be told to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FakeRead {
    Counter,
    Active,
    Match(u64),
    UserPredictions,
    MatchPredictions(u64),
    Winnings,
    Balance,
    Owner,
}

#[derive(Default)]
struct FakeMarketState {
    matches: BTreeMap<U256, Match>,
    predictions: BTreeMap<U256, Vec<Prediction>>,
    winnings: HashMap<Address, U256>,
    balances: HashMap<Address, U256>,
    owner: Address,
    failing: HashSet<FakeRead>,
    reads: usize,
}

#[derive(Clone)]
pub struct FakeMarket {
    contract: Address,
    state: Arc<Mutex<FakeMarketState>>,
}

impl Default for FakeMarket {
    fn default() -> Self {
        Self {
            contract: address(0xC0),
            state: Arc::default(),
        }
    }
}

impl FakeMarket {
    pub fn add_match(&self, m: Match) {
        lock(&self.state).matches.insert(m.id, m);
    }

    pub fn update_match(&self, id: u64, update: impl FnOnce(&mut Match)) {
        if let Some(m) = lock(&self.state).matches.get_mut(&U256::from(id)) {
            update(m);
        }
    }

    pub fn add_prediction(&self, match_id: u64, prediction: Prediction) {
        let mut state = lock(&self.state);
        let id = U256::from(match_id);
        if let Some(m) = state.matches.get_mut(&id) {
            m.prize_pool += prediction.amount;
        }
        state.predictions.entry(id).or_default().push(prediction);
    }

    pub fn set_winnings(&self, user: Address, amount: U256) {
        lock(&self.state).winnings.insert(user, amount);
    }

    pub fn set_balance(&self, holder: Address, amount: U256) {
        lock(&self.state).balances.insert(holder, amount);
    }

    pub fn set_owner(&self, owner: Address) {
        lock(&self.state).owner = owner;
    }

    pub fn fail(&self, read: FakeRead) {
        lock(&self.state).failing.insert(read);
    }

    pub fn heal(&self, read: FakeRead) {
        lock(&self.state).failing.remove(&read);
    }

    pub fn reads(&self) -> usize {
        lock(&self.state).reads
    }

    fn check(&self, read: FakeRead) -> Result<MutexGuard<'_, FakeMarketState>, ChainError> {
        let mut state = lock(&self.state);
        state.reads += 1;
        if state.failing.contains(&read) {
            return Err(ChainError::rpc(format!("fake read {read:?} failed")));
        }
        Ok(state)
    }
}

impl MarketReader for FakeMarket {
    fn contract_address(&self) -> Address {
        self.contract
    }

    async fn match_counter(&self) -> Result<U256, ChainError> {
        let state = self.check(FakeRead::Counter)?;
        Ok(state.matches.keys().max().copied().unwrap_or_default())
    }

    async fn get_match(&self, id: U256) -> Result<Match, ChainError> {
        let state = self.check(FakeRead::Match(id.low_u64()))?;
        state
            .matches
            .get(&id)
            .cloned()
            .ok_or_else(|| ChainError::rpc(format!("no match {id}")))
    }

    async fn active_matches(&self) -> Result<Vec<Match>, ChainError> {
        let state = self.check(FakeRead::Active)?;
        Ok(state
            .matches
            .values()
            .filter(|m| !m.results_submitted)
            .cloned()
            .collect())
    }

    async fn user_predictions(
        &self,
        user: Address,
    ) -> Result<(Vec<U256>, Vec<Prediction>), ChainError> {
        let state = self.check(FakeRead::UserPredictions)?;
        Ok(state
            .predictions
            .iter()
            .flat_map(|(id, predictions)| {
                predictions
                    .iter()
                    .filter(move |p| p.predictor == user)
                    .map(move |p| (*id, p.clone()))
            })
            .unzip())
    }

    async fn match_predictions(&self, id: U256) -> Result<Vec<Prediction>, ChainError> {
        let state = self.check(FakeRead::MatchPredictions(id.low_u64()))?;
        Ok(state.predictions.get(&id).cloned().unwrap_or_default())
    }

    async fn user_winnings(&self, user: Address) -> Result<U256, ChainError> {
        let state = self.check(FakeRead::Winnings)?;
        Ok(state.winnings.get(&user).copied().unwrap_or_default())
    }

    async fn owner(&self) -> Result<Address, ChainError> {
        let state = self.check(FakeRead::Owner)?;
        Ok(state.owner)
    }

    async fn balance_of(&self, holder: Address) -> Result<U256, ChainError> {
        let state = self.check(FakeRead::Balance)?;
        Ok(state.balances.get(&holder).copied().unwrap_or_default())
    }
}

#[derive(Default)]
struct FakeSenderState {
    submitted: Vec<TxRequest>,
    submit_error: Option<ChainError>,
    confirm_error: Option<ChainError>,
    confirmation_gate: Option<Arc<Notify>>,
    next_hash: u64,
}

#[derive(Clone)]
pub struct FakeSender {
    address: Address,
    kind: IdentityKind,
    state: Arc<Mutex<FakeSenderState>>,
}

impl FakeSender {
    pub fn platform(address: Address) -> Self {
        Self::new(address, IdentityKind::Platform)
    }

    pub fn interactive(address: Address) -> Self {
        Self::new(address, IdentityKind::Interactive)
    }

    fn new(address: Address, kind: IdentityKind) -> Self {
        Self {
            address,
            kind,
            state: Arc::default(),
        }
    }

    pub fn fail_submit(&self, err: ChainError) {
        lock(&self.state).submit_error = Some(err);
    }

    pub fn fail_confirmation(&self, err: ChainError) {
        lock(&self.state).confirm_error = Some(err);
    }

    /// Confirmation waits until the returned handle is notified.
    pub fn hold_confirmation(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        lock(&self.state).confirmation_gate = Some(gate.clone());
        gate
    }

    pub fn submitted(&self) -> Vec<TxRequest> {
        lock(&self.state).submitted.clone()
    }
}

impl TxSender for FakeSender {
    fn address(&self) -> Address {
        self.address
    }

    fn kind(&self) -> IdentityKind {
        self.kind
    }

    async fn submit(&self, request: &TxRequest) -> Result<TxHash, ChainError> {
        let mut state = lock(&self.state);
        if let Some(err) = state.submit_error.clone() {
            return Err(err);
        }
        state.submitted.push(request.clone());
        state.next_hash += 1;
        Ok(TxHash::from_low_u64_be(state.next_hash))
    }

    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> Result<TxReceipt, ChainError> {
        let gate = lock(&self.state).confirmation_gate.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(err) = lock(&self.state).confirm_error.clone() {
            return Err(err);
        }
        Ok(TxReceipt {
            tx_hash,
            block_number: Some(1),
            gas_used: None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalletRequest {
    RequestAccounts,
    SwitchChain(String),
    AddChain(AddChainParams),
}

#[derive(Default)]
struct FakeWalletState {
    requests: Vec<WalletRequest>,
    session_error: Option<WalletError>,
    switch_error: Option<WalletError>,
    add_chain_error: Option<WalletError>,
}

#[derive(Clone)]
pub struct FakeWallet {
    session: FakeSender,
    embedded: bool,
    state: Arc<Mutex<FakeWalletState>>,
}

impl Default for FakeWallet {
    fn default() -> Self {
        Self::with_session(FakeSender::interactive(address(2)))
    }
}

impl FakeWallet {
    pub fn with_session(session: FakeSender) -> Self {
        Self {
            session,
            embedded: false,
            state: Arc::default(),
        }
    }

    pub fn embedded() -> Self {
        Self {
            embedded: true,
            ..Self::default()
        }
    }

    pub fn session(&self) -> &FakeSender {
        &self.session
    }

    pub fn fail_session(&self, err: WalletError) {
        lock(&self.state).session_error = Some(err);
    }

    pub fn fail_switch(&self, err: WalletError) {
        lock(&self.state).switch_error = Some(err);
    }

    pub fn fail_add_chain(&self, err: WalletError) {
        lock(&self.state).add_chain_error = Some(err);
    }

    pub fn requests(&self) -> Vec<WalletRequest> {
        lock(&self.state).requests.clone()
    }
}

impl WalletBridge for FakeWallet {
    type Session = FakeSender;

    fn is_embedded(&self) -> bool {
        self.embedded
    }

    async fn request_session(&self) -> Result<FakeSender, WalletError> {
        let mut state = lock(&self.state);
        state.requests.push(WalletRequest::RequestAccounts);
        match state.session_error.clone() {
            Some(err) => Err(err),
            None => Ok(self.session.clone()),
        }
    }

    async fn switch_chain(&self, chain_id_hex: &str) -> Result<(), WalletError> {
        let mut state = lock(&self.state);
        state
            .requests
            .push(WalletRequest::SwitchChain(chain_id_hex.to_string()));
        state.switch_error.clone().map_or(Ok(()), Err)
    }

    async fn add_chain(&self, params: &AddChainParams) -> Result<(), WalletError> {
        let mut state = lock(&self.state);
        state.requests.push(WalletRequest::AddChain(params.clone()));
        state.add_chain_error.clone().map_or(Ok(()), Err)
    }
}
