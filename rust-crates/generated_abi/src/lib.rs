use std::sync::Arc;

use ethers::{
    contract::abigen,
    providers::Middleware,
    types::Address,
};

pub mod prediction_market_types {
    use super::*;

    abigen!(
        PredictionMarket,
        r#"[
            struct MatchInfo { uint256 id; string homeTeam; string awayTeam; uint256 kickoffTime; uint256 prizePool; bool resultsSubmitted; uint8 finalHomeScore; uint8 finalAwayScore; bool prizesDistributed; }
            struct PredictionInfo { address predictor; uint8 homeScore; uint8 awayScore; uint256 amount; uint256 timestamp; }
            function createMatch(string _homeTeam, string _awayTeam, uint256 _kickoffTime) external
            function predictMatch(uint256 _matchId, uint8 _homeScore, uint8 _awayScore) external payable
            function submitResult(uint256 _matchId, uint8 _homeScore, uint8 _awayScore) external
            function claimWinnings() external
            function withdrawPlatformFees() external
            function matchCounter() external view returns (uint256)
            function matches(uint256) external view returns (uint256 id, string homeTeam, string awayTeam, uint256 kickoffTime, uint256 prizePool, bool resultsSubmitted, uint8 finalHomeScore, uint8 finalAwayScore, bool prizesDistributed)
            function getActiveMatches() external view returns (MatchInfo[])
            function getUserPredictions(address _user) external view returns (uint256[], PredictionInfo[])
            function getMatch(uint256 _matchId) external view returns (MatchInfo)
            function getMatchPredictions(uint256 _matchId) external view returns (PredictionInfo[])
            function userWinnings(address) external view returns (uint256)
            function owner() external view returns (address)
            event MatchCreated(uint256 indexed matchId, string homeTeam, string awayTeam, uint256 kickoffTime)
            event PredictionPlaced(uint256 indexed matchId, address indexed predictor, uint8 homeScore, uint8 awayScore, uint256 amount)
            event ResultsSubmitted(uint256 indexed matchId, uint8 homeScore, uint8 awayScore)
            event WinningsClaimed(address indexed user, uint256 amount)
        ]"#
    );

    /// Binds the market contract at `address` to an RPC client.
    pub fn contract_instance<M: Middleware>(
        address: Address,
        client: Arc<M>,
    ) -> PredictionMarket<M> {
        PredictionMarket::new(address, client)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::prediction_market_types::*;
    use ethers::{
        contract::EthEvent,
        utils::keccak256,
    };

    #[test]
    fn events__signatures__match_the_deployed_contract() {
        let expected = [
            (
                MatchCreatedFilter::abi_signature(),
                "MatchCreated(uint256,string,string,uint256)",
            ),
            (
                PredictionPlacedFilter::abi_signature(),
                "PredictionPlaced(uint256,address,uint8,uint8,uint256)",
            ),
            (
                ResultsSubmittedFilter::abi_signature(),
                "ResultsSubmitted(uint256,uint8,uint8)",
            ),
            (
                WinningsClaimedFilter::abi_signature(),
                "WinningsClaimed(address,uint256)",
            ),
        ];

        for (actual, signature) in expected {
            assert_eq!(actual, signature);
        }
    }

    #[test]
    fn prediction_placed__topic0__is_keccak_of_full_signature() {
        assert_eq!(
            PredictionPlacedFilter::signature().0,
            keccak256("PredictionPlaced(uint256,address,uint8,uint8,uint256)")
        );
    }
}
