//! Contract interfaces for the lending protocol and the liquidator contracts.
//!
//! Only the subset of each ABI the bot calls is declared here. All
//! interfaces carry `#[sol(rpc)]` so they can be instantiated against a
//! provider for typed `eth_call`s.

use alloy::sol;

// ============================================================================
// Lending protocol
// ============================================================================

sol! {
    /// Lending pool (subset used for discovery)
    #[sol(rpc)]
    interface IPool {
        function getReservesList() external view returns (address[] memory);

        function getUserAccountData(address user) external view returns (
            uint256 totalCollateralBase,
            uint256 totalDebtBase,
            uint256 availableBorrowsBase,
            uint256 currentLiquidationThreshold,
            uint256 ltv,
            uint256 healthFactor
        );
    }
}

sol! {
    /// Price oracle; prices are quoted in the base currency (8 decimals)
    #[sol(rpc)]
    interface IAaveOracle {
        function getAssetPrice(address asset) external view returns (uint256);
        function BASE_CURRENCY_UNIT() external view returns (uint256);
    }
}

sol! {
    /// Protocol data provider
    #[sol(rpc)]
    interface IPoolDataProvider {
        function getReserveConfigurationData(address asset) external view returns (
            uint256 decimals,
            uint256 ltv,
            uint256 liquidationThreshold,
            uint256 liquidationBonus,
            uint256 reserveFactor,
            bool usageAsCollateralEnabled,
            bool borrowingEnabled,
            bool stableBorrowRateEnabled,
            bool isActive,
            bool isFrozen
        );

        function getReserveTokensAddresses(address asset) external view returns (
            address aTokenAddress,
            address stableDebtTokenAddress,
            address variableDebtTokenAddress
        );

        function getUserReserveData(address asset, address user) external view returns (
            uint256 currentATokenBalance,
            uint256 currentStableDebt,
            uint256 currentVariableDebt,
            uint256 principalStableDebt,
            uint256 scaledVariableDebt,
            uint256 stableBorrowRate,
            uint256 liquidityRate,
            uint40 stableRateLastUpdated,
            bool usageAsCollateralEnabled
        );
    }
}

sol! {
    /// Liquidation logic exposing the close-factor switch point (wad)
    #[sol(rpc)]
    interface ILiquidationLogic {
        function CLOSE_FACTOR_HF_THRESHOLD() external view returns (uint256);
    }
}

// ============================================================================
// Tokens
// ============================================================================

sol! {
    /// Standard ERC20 metadata
    #[sol(rpc)]
    interface IERC20 {
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
        function balanceOf(address account) external view returns (uint256);
    }
}

sol! {
    /// ERC-4626 vault, used to resolve unstake wrappers to their underlying
    #[sol(rpc)]
    interface IERC4626 {
        function asset() external view returns (address);
    }
}

sol! {
    /// Registry flagging principal tokens
    #[sol(rpc)]
    interface IPtRegistry {
        function isPT(address token) external view returns (bool);
    }
}

// ============================================================================
// Liquidator contracts
// ============================================================================

sol! {
    /// Swap legs executed by the liquidator after the flash step.
    /// A leg with a zero target is skipped on-chain.
    #[derive(Debug, PartialEq, Eq)]
    struct SwapPayload {
        address pendleTarget;
        bytes pendleData;
        address aggregatorTarget;
        bytes aggregatorData;
    }

    /// Shared entry point of the flash-mint and flash-loan liquidators
    #[sol(rpc)]
    interface ILiquidator {
        function liquidate(
            address collateralAToken,
            address debtAToken,
            address user,
            uint256 debtToCover,
            bool receiveAToken,
            bool unstake,
            bytes calldata swapData
        ) external;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, Bytes, U256};
    use alloy::sol_types::{SolCall, SolValue};

    #[test]
    fn test_liquidate_call_encodes() {
        let call = ILiquidator::liquidateCall {
            collateralAToken: Address::repeat_byte(1),
            debtAToken: Address::repeat_byte(2),
            user: Address::repeat_byte(3),
            debtToCover: U256::from(1000u64),
            receiveAToken: false,
            unstake: true,
            swapData: Bytes::from(vec![1, 2, 3]),
        };

        let encoded = call.abi_encode();
        assert_eq!(&encoded[..4], &ILiquidator::liquidateCall::SELECTOR);

        let decoded = ILiquidator::liquidateCall::abi_decode(&encoded, true).unwrap();
        assert_eq!(decoded.user, Address::repeat_byte(3));
        assert!(decoded.unstake);
        assert!(!decoded.receiveAToken);
    }

    #[test]
    fn test_selector_matches_signature() {
        // keccak256("liquidate(address,address,address,uint256,bool,bool,bytes)")[..4]
        let expected = &alloy::primitives::keccak256(
            "liquidate(address,address,address,uint256,bool,bool,bytes)",
        )[..4];
        assert_eq!(
            hex::encode(ILiquidator::liquidateCall::SELECTOR),
            hex::encode(expected),
            "Liquidate selector mismatch! Bot will send incorrect calldata."
        );
    }

    #[test]
    fn test_swap_payload_abi_decodes() {
        let payload = SwapPayload {
            pendleTarget: Address::ZERO,
            pendleData: Bytes::new(),
            aggregatorTarget: Address::repeat_byte(9),
            aggregatorData: Bytes::from(vec![0xde, 0xad]),
        };
        let encoded = payload.abi_encode();
        let decoded = SwapPayload::abi_decode(&encoded, true).unwrap();
        assert_eq!(decoded, payload);
    }
}
