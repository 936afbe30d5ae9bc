use ethers::prelude::abigen;

abigen!(
    IdleGame,
    r#"[
        event StartGame(uint256 gameId, uint256 teamId, uint256 duration, uint256 craReward, uint256 tusReward)
        function getGameBasicInfo(uint256 gameId) external view returns (uint128 teamId, uint128 craReward, uint128 tusReward, uint32 startTime, uint32 duration, uint32 status)
        function getTeamInfo(uint256 teamId) external view returns (address owner, uint256 crabadaId1, uint256 crabadaId2, uint256 crabadaId3, uint16 battlePoint, uint16 timePoint, uint256 currentGameId, uint128 lockTo)
        function attack(uint256 gameId, uint256 attackTeamId) external
        function settleGame(uint256 gameId) external
    ]"#
);
